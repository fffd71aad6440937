use pipeline_core::context::PipelineContext;
use pipeline_core::error::PipelineError;
use pipeline_core::loader::{PipelineDescription, Registry};
use pipeline_core::runner::{CancelToken, GoalTarget, Pipeline, Runner};
use pipeline_core::storage::PipelineStore;
use pipeline_core::target::Target;

const GATED_PIPELINE: &str = r#"
Containers:
  - { Name: Strings1, Type: StringContainer }
  - { Name: Strings2, Type: StringContainer }
Steps:
  - Name: FirstStep
    Pipes:
      - { Type: CopyPipe, UsedContainers: [Strings1, Strings2], EnabledWhen: [DoCopy] }
"#;

fn setup() -> (PipelineContext, Pipeline) {
    let ctx = PipelineContext::with_defaults().expect("context");
    let registry = Registry::with_defaults();
    let description = PipelineDescription::from_yaml(GATED_PIPELINE).expect("description");
    let pipeline = registry.resolve(&description, &ctx).expect("pipeline");
    (ctx, pipeline)
}

fn wildcard_goal(ctx: &PipelineContext) -> GoalTarget {
    let kind = ctx.kinds().kind("StringKind").expect("kind");
    GoalTarget::new("FirstStep", "Strings2", Target::parse("*", kind).expect("target"))
}

/// With the gate flag absent, the planner treats the pipe as having an empty
/// contract: nothing can produce Strings2 and the goal fails naming it.
#[test]
fn gated_pipe_is_invisible_to_the_planner_without_the_flag() {
    let (ctx, pipeline) = setup();
    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("FirstStep", "Strings1", b"a\nb\nc").expect("bind");

    let runner = Runner::new(&pipeline, std::iter::empty());
    let err = runner.run(&ctx, &mut store, &[wildcard_goal(&ctx)], &CancelToken::new())
        .unwrap_err();
    match err {
        PipelineError::UnsatisfiableGoal { container, .. } => {
            assert_eq!(container, "Strings2");
        }
        other => panic!("expected UnsatisfiableGoal, got {other}"),
    }
}

/// With the flag set, the same pipeline behaves like the ungated copy.
#[test]
fn gated_pipe_runs_when_the_flag_is_active() {
    let (ctx, pipeline) = setup();
    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("FirstStep", "Strings1", b"a\nb\nc").expect("bind");

    let runner = Runner::new(&pipeline, ["DoCopy".to_string()]);
    let outcome = runner
        .run(&ctx, &mut store, &[wildcard_goal(&ctx)], &CancelToken::new())
        .expect("run");

    let strings2 = outcome.containers.get("Strings2").expect("container");
    assert_eq!(strings2.enumerate().len(), 3);
}

/// A disabled pipe is skipped by the executor even when its inputs are
/// present and some other goal drives the step.
#[test]
fn disabled_pipe_does_not_execute() {
    let (ctx, pipeline) = setup();
    let mut store = PipelineStore::new(&pipeline).expect("store");
    store.bind_input("FirstStep", "Strings1", b"a").expect("bind");

    let kind = ctx.kinds().kind("StringKind").expect("kind");
    let goal = GoalTarget::new(
        "FirstStep",
        "Strings1",
        Target::parse("*", kind).expect("target"),
    );
    let runner = Runner::new(&pipeline, std::iter::empty());
    runner.run(&ctx, &mut store, &[goal], &CancelToken::new()).expect("run");

    let stored = store.containers("FirstStep").expect("step");
    assert!(stored.get("Strings2").expect("container").enumerate().is_empty());
}
