use pipeline_core::containers::ContainerFamily;
use pipeline_core::context::PipelineContext;
use pipeline_core::error::PipelineError;
use pipeline_core::loader::{
    ContainerTypeDecl, PipeDecl, PipelineDescription, Registry,
};
use pipeline_core::pipes::{CopyPipe, Pipe};
use pipeline_core::kinds::KindRegistry;

fn context() -> PipelineContext {
    PipelineContext::with_defaults().expect("context")
}

#[test]
fn example_description_resolves() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: module.ll, Type: LLVMContainer }
  - { Name: input, Type: Binary }
  - { Name: summary, Type: StringContainer }
Steps:
  - Name: Lift
    Pipes:
      - { Type: RenderModel, UsedContainers: [summary] }
      - { Type: LLVMPipe, UsedContainers: [module.ll], Passes: [strip-debug, mark-optimized] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    let pipeline = registry.resolve(&description, &ctx).expect("pipeline");
    assert_eq!(pipeline.steps().len(), 1);
    assert_eq!(pipeline.schema().len(), 3);
}

#[test]
fn description_round_trips_as_yaml() {
    let text = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
Steps:
  - Name: OnlyStep
    Pipes: []
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    let rendered = description.to_yaml().expect("yaml");
    let reparsed = PipelineDescription::from_yaml(&rendered).expect("reparse");
    assert_eq!(reparsed.containers.len(), 1);
    assert_eq!(reparsed.steps.len(), 1);
}

#[test]
fn unknown_pipe_type_fails_at_load() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
Steps:
  - Name: OnlyStep
    Pipes:
      - { Type: NoSuchPipe, UsedContainers: [Strings1] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    let err = registry.resolve(&description, &ctx).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownPipe(_)));
}

/// A compound pipe naming a pass the registry does not know fails before
/// any execution.
#[test]
fn unknown_inner_pass_fails_at_load() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: module.ll, Type: LLVMContainer }
Steps:
  - Name: Optimize
    Pipes:
      - { Type: LLVMPipe, UsedContainers: [module.ll], Passes: [nonexistent-pass] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    let err = registry.resolve(&description, &ctx).unwrap_err();
    match err {
        PipelineError::InvalidPipe { reason, .. } => {
            assert!(reason.contains("nonexistent-pass"));
        }
        other => panic!("expected InvalidPipe, got {other}"),
    }
}

#[test]
fn unknown_container_type_fails_at_load() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: Strings1, Type: NoSuchContainerType }
Steps: []
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    assert!(matches!(
        registry.resolve(&description, &ctx).unwrap_err(),
        PipelineError::UnknownContainer(_)
    ));
}

#[test]
fn undeclared_used_container_fails_at_load() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
Steps:
  - Name: OnlyStep
    Pipes:
      - { Type: CopyPipe, UsedContainers: [Strings1, Missing] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    assert!(matches!(
        registry.resolve(&description, &ctx).unwrap_err(),
        PipelineError::UnknownContainer(_)
    ));
}

#[test]
fn wrong_container_count_is_an_invalid_pipe() {
    let ctx = context();
    let registry = Registry::with_defaults();
    let text = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
Steps:
  - Name: OnlyStep
    Pipes:
      - { Type: CopyPipe, UsedContainers: [Strings1] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    assert!(matches!(
        registry.resolve(&description, &ctx).unwrap_err(),
        PipelineError::InvalidPipe { .. }
    ));
}

fn tracing_bundle(registry: &mut Registry, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
    ctx.kinds_mut().register_kind("TraceKind", "root", None)?;
    registry.register_container_type(
        "TraceContainer",
        ContainerTypeDecl {
            family: ContainerFamily::Strings,
            accepted: vec!["TraceKind".to_string()],
        },
    );
    registry.register_pipe("CopyTraces", copy_traces_factory);
    Ok(())
}

fn copy_traces_factory(
    decl: &PipeDecl,
    _registry: &Registry,
    kinds: &KindRegistry,
) -> Result<Box<dyn Pipe>, PipelineError> {
    let kind = kinds.kind("TraceKind")?;
    let pipe = CopyPipe::new(&decl.used_containers[0], &decl.used_containers[1], kind)?;
    Ok(Box::new(pipe))
}

/// Extension bundles registered by name add kinds, container types, and
/// pipes at load time; an unknown bundle name is an error.
#[test]
fn extension_bundles_register_additional_types() {
    let mut ctx = context();
    let mut registry = Registry::with_defaults();
    registry.register_bundle("tracing", tracing_bundle);

    let err = registry
        .apply_bundles(&["no-such-library".to_string()], &mut ctx)
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownLibrary(_)));

    registry.apply_bundles(&["tracing".to_string()], &mut ctx).expect("bundle");
    assert!(ctx.kinds().kind("TraceKind").is_ok());

    let text = r#"
Containers:
  - { Name: traces1, Type: TraceContainer }
  - { Name: traces2, Type: TraceContainer }
Steps:
  - Name: OnlyStep
    Pipes:
      - { Type: CopyTraces, UsedContainers: [traces1, traces2] }
"#;
    let description = PipelineDescription::from_yaml(text).expect("description");
    registry.resolve(&description, &ctx).expect("pipeline with extension types");
}
