use pipeline_core::containers::{ContainerFamily, ContainerSet};
use pipeline_core::context::PipelineContext;
use pipeline_core::contract::{Contract, ContractRule};
use pipeline_core::error::Result;
use pipeline_core::invalidate::Invalidator;
use pipeline_core::kinds::Kind;
use pipeline_core::model::{ModelFunction, ModelGlobal};
use pipeline_core::pipes::{CopyPipe, Pipe, RenderModelPipe};
use pipeline_core::runner::{
    CancelToken, ContainerSchema, GoalTarget, Pipeline, PipeSlot, Runner, Step,
};
use pipeline_core::storage::PipelineStore;
use pipeline_core::target::Target;

struct SeedPipe {
    kind: Kind,
    contract: Contract,
}

impl SeedPipe {
    fn new(kind: Kind) -> Self {
        let rule = ContractRule::generator("c1", kind.clone(), vec!["root".to_string()])
            .expect("rule");
        Self { kind, contract: Contract::new(vec![rule]) }
    }
}

impl Pipe for SeedPipe {
    fn type_name(&self) -> &'static str {
        "SeedPipe"
    }

    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn execute(&self, _ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()> {
        let target = Target::parse("root", self.kind.clone())?;
        containers.get_mut("c1")?.insert_string(target, "seed".to_string())
    }
}

struct DeriveK2Pipe {
    to: Kind,
    contract: Contract,
}

impl DeriveK2Pipe {
    fn new(from: Kind, to: Kind) -> Self {
        let rule =
            ContractRule::identity("c1", from, "c2", to.clone(), true).expect("rule");
        Self { to, contract: Contract::new(vec![rule]) }
    }
}

impl Pipe for DeriveK2Pipe {
    fn type_name(&self) -> &'static str {
        "DeriveK2Pipe"
    }

    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn execute(&self, _ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()> {
        let entries: Vec<_> = containers
            .get("c1")?
            .string_entries()?
            .iter()
            .map(|(target, content)| (target.path().to_vec(), content.clone()))
            .collect();
        let dest = containers.get_mut("c2")?;
        for (path, content) in entries {
            let target = Target::new(self.to.clone(), path)?;
            dest.insert_string(target, content)?;
        }
        Ok(())
    }
}

fn two_step_setup() -> (PipelineContext, Pipeline) {
    let mut ctx = PipelineContext::with_defaults().expect("context");
    let k1 = ctx.kinds_mut().register_kind("K1", "root", None).expect("K1");
    let k2 = ctx.kinds_mut().register_kind("K2", "root", None).expect("K2");
    let string_kind = ctx.kinds().kind("StringKind").expect("StringKind");

    let schema = vec![
        ContainerSchema {
            name: "c1".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![k1.clone()],
        },
        ContainerSchema {
            name: "c2".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![k2.clone()],
        },
        // Unrelated branch: nothing derives from or feeds into it.
        ContainerSchema {
            name: "c3".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![string_kind],
        },
    ];
    let steps = vec![
        Step::new("A", vec![PipeSlot::new(Box::new(SeedPipe::new(k1.clone())), Vec::new())]),
        Step::new("B", vec![PipeSlot::new(Box::new(DeriveK2Pipe::new(k1, k2)), Vec::new())]),
    ];
    let pipeline = Pipeline::new(schema, steps).expect("pipeline");
    (ctx, pipeline)
}

/// Explicit invalidation of a produced artifact removes it and everything
/// transitively derived from it, and nothing else.
#[test]
fn explicit_invalidation_removes_the_derivation_chain() {
    let (ctx, pipeline) = two_step_setup();
    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("A", "c3", b"bystander").expect("bind");

    let k1 = ctx.kinds().kind("K1").expect("K1");
    let k2 = ctx.kinds().kind("K2").expect("K2");
    let goals = vec![GoalTarget::new("B", "c2", Target::parse("root", k2.clone()).expect("target"))];
    let runner = Runner::new(&pipeline, std::iter::empty());
    runner.run(&ctx, &mut store, &goals, &CancelToken::new()).expect("run");

    let seed = GoalTarget::new("A", "c1", Target::parse("root", k1.clone()).expect("target"));
    let invalidator = Invalidator::new(&pipeline, std::iter::empty());
    let report = invalidator.invalidate_targets(&mut store, &[seed]).expect("invalidate");
    assert!(!report.is_empty());

    let a = store.containers("A").expect("A");
    assert!(a.get("c1").expect("c1").enumerate().is_empty());

    let b = store.containers("B").expect("B");
    assert!(b.get("c1").expect("c1").enumerate().is_empty());
    assert!(b.get("c2").expect("c2").enumerate().is_empty());

    // The unrelated branch is untouched.
    assert_eq!(a.get("c3").expect("c3").enumerate().len(), 1);
}

fn model_pipeline(ctx: &PipelineContext) -> Pipeline {
    let string_kind = ctx.kinds().kind("StringKind").expect("kind");
    let schema = vec![
        ContainerSchema {
            name: "Strings1".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![string_kind.clone()],
        },
        ContainerSchema {
            name: "Strings2".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![string_kind.clone()],
        },
        ContainerSchema {
            name: "out".to_string(),
            type_name: "StringContainer".to_string(),
            family: ContainerFamily::Strings,
            accepted: vec![string_kind.clone()],
        },
    ];
    let steps = vec![Step::new(
        "OnlyStep",
        vec![
            PipeSlot::new(
                Box::new(CopyPipe::new("Strings1", "Strings2", string_kind.clone()).expect("copy")),
                Vec::new(),
            ),
            PipeSlot::new(
                Box::new(RenderModelPipe::new("out", string_kind).expect("render")),
                Vec::new(),
            ),
        ],
    )];
    Pipeline::new(schema, steps).expect("pipeline")
}

/// Mutating a Global removes every target produced by pipes reading it
/// (completeness) while targets with unrelated derivations stay
/// (minimality).
#[test]
fn global_mutation_invalidates_exactly_its_readers() {
    let mut ctx = PipelineContext::with_defaults().expect("context");
    let pipeline = model_pipeline(&ctx);
    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("OnlyStep", "Strings1", b"a\nb").expect("bind");

    let string_kind = ctx.kinds().kind("StringKind").expect("kind");
    let goals = vec![
        GoalTarget::new(
            "OnlyStep",
            "Strings2",
            Target::parse("*", string_kind.clone()).expect("target"),
        ),
        GoalTarget::new(
            "OnlyStep",
            "out",
            Target::parse("model", string_kind.clone()).expect("target"),
        ),
    ];
    let runner = Runner::new(&pipeline, std::iter::empty());
    runner.run(&ctx, &mut store, &goals, &CancelToken::new()).expect("run");

    let rendered = Target::parse("model", string_kind.clone()).expect("target");
    assert!(store
        .containers("OnlyStep")
        .expect("step")
        .get("out")
        .expect("out")
        .contains(&rendered));

    // Mutate the model; the context records the dirty Global.
    {
        let model = ctx.global_mut::<ModelGlobal>(ModelGlobal::NAME).expect("model");
        model.model_mut().functions.push(ModelFunction::new("main", 0x1000));
    }
    let dirty = ctx.take_dirty_globals();
    assert!(dirty.contains(ModelGlobal::NAME));

    let invalidator = Invalidator::new(&pipeline, std::iter::empty());
    for name in &dirty {
        invalidator.invalidate_global(&mut store, name).expect("invalidate");
    }

    let step = store.containers("OnlyStep").expect("step");
    // Completeness: the rendered summary is gone.
    assert!(!step.get("out").expect("out").contains(&rendered));
    // Minimality: copied strings did not derive from the model.
    assert_eq!(step.get("Strings2").expect("Strings2").enumerate().len(), 2);
    assert_eq!(step.get("Strings1").expect("Strings1").enumerate().len(), 2);
}

/// Wildcard seeds expand against current contents before closing.
#[test]
fn wildcard_invalidation_expands_before_closure() {
    let (ctx, pipeline) = two_step_setup();
    let mut store = PipelineStore::new(&pipeline).expect("store");

    let k2 = ctx.kinds().kind("K2").expect("K2");
    let goals = vec![GoalTarget::new("B", "c2", Target::parse("root", k2).expect("target"))];
    let runner = Runner::new(&pipeline, std::iter::empty());
    runner.run(&ctx, &mut store, &goals, &CancelToken::new()).expect("run");

    let k1 = ctx.kinds().kind("K1").expect("K1");
    let seed = GoalTarget::new("A", "c1", Target::parse("*", k1).expect("target"));
    let invalidator = Invalidator::new(&pipeline, std::iter::empty());
    let report = invalidator.invalidate_targets(&mut store, &[seed]).expect("invalidate");

    assert!(report.len() >= 3, "expected c1@A, c1@B and c2@B to be removed");
    assert!(store.containers("B").expect("B").get("c2").expect("c2").enumerate().is_empty());
}
