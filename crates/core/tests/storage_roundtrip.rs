use pipeline_core::containers::{Container, ContainerFamily, ROOT_COMPONENT};
use pipeline_core::context::PipelineContext;
use pipeline_core::loader::{PipelineDescription, Registry};
use pipeline_core::model::cfg::INVALID_ADDRESS;
use pipeline_core::model::{ModelBlock, ModelFunction, ModelGlobal};
use pipeline_core::runner::{CancelToken, GoalTarget, Runner};
use pipeline_core::storage::PipelineStore;
use pipeline_core::target::{PathComponent, Target};
use tempfile::tempdir;

fn context() -> PipelineContext {
    PipelineContext::with_defaults().expect("context")
}

#[test]
fn string_container_round_trips_bare_and_tagged_entries() {
    let ctx = context();
    let kind = ctx.kinds().kind("StringKind").expect("kind");
    let mut container = Container::new(
        "strings",
        "StringContainer",
        ContainerFamily::Strings,
        vec![kind.clone()],
    )
    .expect("container");

    // Bare entry (content equals the path) and a tagged one.
    container
        .insert_string(Target::parse("a", kind.clone()).expect("target"), "a".to_string())
        .expect("insert");
    container
        .insert_string(
            Target::parse("summary", kind.clone()).expect("target"),
            "three\nlines\nhere".to_string(),
        )
        .expect("insert");

    let bytes = container.serialize().expect("serialize");
    let mut restored = Container::new(
        "strings",
        "StringContainer",
        ContainerFamily::Strings,
        vec![kind],
    )
    .expect("container");
    restored.deserialize(&bytes).expect("deserialize");
    assert_eq!(restored, container);
}

#[test]
fn bare_input_file_becomes_line_targets() {
    let ctx = context();
    let kind = ctx.kinds().kind("StringKind").expect("kind");
    let mut container =
        Container::new("strings", "StringContainer", ContainerFamily::Strings, vec![kind.clone()])
            .expect("container");
    container.deserialize(b"a\nb\nc").expect("deserialize");

    assert_eq!(container.enumerate().len(), 3);
    assert!(container.contains(&Target::parse("b", kind).expect("target")));
}

#[test]
fn byte_container_round_trips_raw_singleton() {
    let ctx = context();
    let kind = ctx.kinds().kind("BinaryKind").expect("kind");
    let mut container =
        Container::new("input", "Binary", ContainerFamily::Bytes, vec![kind.clone()])
            .expect("container");
    let payload = vec![0x7f, b'E', b'L', b'F', 0x00, 0xff];
    container.deserialize(&payload).expect("deserialize");

    let root = Target::new(kind.clone(), vec![PathComponent::exact(ROOT_COMPONENT)])
        .expect("target");
    assert!(container.contains(&root));

    // A raw blob serializes back to the raw bytes.
    assert_eq!(container.serialize().expect("serialize"), payload);
}

#[test]
fn byte_container_round_trips_multiple_entries() {
    let ctx = context();
    let kind = ctx.kinds().kind("ObjectKind").expect("kind");
    let mut container =
        Container::new("objects", "Object", ContainerFamily::Bytes, vec![kind.clone()])
            .expect("container");
    container
        .insert_bytes(Target::parse("root", kind.clone()).expect("target"), vec![1, 2, 3])
        .expect("insert");
    container
        .insert_bytes(Target::parse("extra", kind.clone()).expect("target"), vec![0xde, 0xad])
        .expect("insert");

    let bytes = container.serialize().expect("serialize");
    let mut restored =
        Container::new("objects", "Object", ContainerFamily::Bytes, vec![kind]).expect("container");
    restored.deserialize(&bytes).expect("deserialize");
    assert_eq!(restored, container);
}

#[test]
fn module_container_round_trips_units() {
    let ctx = context();
    let kind = ctx.kinds().kind("LiftedFunctionKind").expect("kind");
    let mut container = Container::new(
        "module.ll",
        "LLVMContainer",
        ContainerFamily::Module,
        vec![kind.clone()],
    )
    .expect("container");
    container
        .insert_unit(
            Target::parse("binary/f1", kind.clone()).expect("target"),
            "entry:\nret".to_string(),
        )
        .expect("insert");
    container
        .insert_unit(
            Target::parse("binary/f2", kind.clone()).expect("target"),
            "entry:\n; dbg\nret".to_string(),
        )
        .expect("insert");

    let bytes = container.serialize().expect("serialize");
    let mut restored = Container::new(
        "module.ll",
        "LLVMContainer",
        ContainerFamily::Module,
        vec![kind],
    )
    .expect("container");
    restored.deserialize(&bytes).expect("deserialize");
    assert_eq!(restored, container);
}

const COPY_PIPELINE: &str = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
  - { Name: Strings2, Type: StringContainer }
Steps:
  - Name: FirstStep
    Pipes:
      - { Type: CopyPipe, UsedContainers: [Strings1, Strings2] }
"#;

/// A saved working directory reloads into an equivalent store, and Globals
/// persist as sibling files named by their registered name.
#[test]
fn store_save_and_load_round_trips() {
    let mut ctx = context();
    {
        let global = ctx.global_mut::<ModelGlobal>(ModelGlobal::NAME).expect("model");
        let mut function = ModelFunction::new("main", 0x1000);
        function.blocks.push(ModelBlock { start: 0x1000, successors: vec![INVALID_ADDRESS] });
        global.model_mut().functions.push(function);
    }
    ctx.take_dirty_globals();

    let registry = Registry::with_defaults();
    let description = PipelineDescription::from_yaml(COPY_PIPELINE).expect("description");
    let pipeline = registry.resolve(&description, &ctx).expect("pipeline");

    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("FirstStep", "Strings1", b"a\nb").expect("bind");
    let kind = ctx.kinds().kind("StringKind").expect("kind");
    let goals = vec![GoalTarget::new(
        "FirstStep",
        "Strings2",
        Target::parse("*", kind.clone()).expect("target"),
    )];
    Runner::new(&pipeline, std::iter::empty())
        .run(&ctx, &mut store, &goals, &CancelToken::new())
        .expect("run");

    let dir = tempdir().expect("tempdir");
    store.save(dir.path(), &ctx).expect("save");
    assert!(dir.path().join("FirstStep").join("Strings2").is_file());
    assert!(dir.path().join(ModelGlobal::NAME).is_file());

    let mut fresh_ctx = context();
    let reloaded = PipelineStore::load(&pipeline, dir.path(), &mut fresh_ctx).expect("load");
    let strings2 = reloaded
        .containers("FirstStep")
        .expect("step")
        .get("Strings2")
        .expect("container");
    assert!(strings2.contains(&Target::parse("a", kind.clone()).expect("target")));
    assert!(strings2.contains(&Target::parse("b", kind).expect("target")));

    let model = fresh_ctx.global::<ModelGlobal>(ModelGlobal::NAME).expect("model");
    assert_eq!(model.model().functions.len(), 1);
    assert_eq!(model.model().functions[0].name, "main");
}
