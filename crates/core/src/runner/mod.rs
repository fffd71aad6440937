//! Planning and execution of pipelines.
//!
//! The runner receives a goal (targets the caller wants materialized), walks
//! the steps backward applying each pipe's contract to derive what the
//! previous step must supply, then executes forward. Execution is
//! single-threaded and cooperative: pipes run sequentially in declared
//! order, and a cancel token is checked between pipes.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::containers::{Container, ContainerFamily, ContainerSet};
use crate::context::PipelineContext;
use crate::contract::Contract;
use crate::error::{PipelineError, Result};
use crate::kinds::Kind;
use crate::pipes::Pipe;
use crate::storage::PipelineStore;
use crate::target::{Target, TargetsByContainer};

/// Cooperative cancellation handle, checked between pipes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Declared shape of one container in a pipeline.
#[derive(Debug, Clone)]
pub struct ContainerSchema {
    pub name: String,
    pub type_name: String,
    pub family: ContainerFamily,
    pub accepted: Vec<Kind>,
}

impl ContainerSchema {
    pub fn accepts(&self, kind: &Kind) -> bool {
        self.accepted.iter().any(|accepted| kind.matches(accepted))
    }

    fn instantiate(&self) -> Result<Container> {
        Container::new(&self.name, &self.type_name, self.family, self.accepted.clone())
    }
}

/// A pipe plus its gating flags inside a step.
pub struct PipeSlot {
    pipe: Box<dyn Pipe>,
    enabled_when: Vec<String>,
}

impl std::fmt::Debug for PipeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeSlot")
            .field("pipe", &self.pipe.type_name())
            .field("enabled_when", &self.enabled_when)
            .finish()
    }
}

impl PipeSlot {
    pub fn new(pipe: Box<dyn Pipe>, enabled_when: Vec<String>) -> Self {
        Self { pipe, enabled_when }
    }

    pub fn pipe(&self) -> &dyn Pipe {
        self.pipe.as_ref()
    }

    pub fn enabled_when(&self) -> &[String] {
        &self.enabled_when
    }

    /// A pipe runs only when every gating flag is active.
    pub fn enabled(&self, flags: &BTreeSet<String>) -> bool {
        self.enabled_when.iter().all(|flag| flags.contains(flag))
    }

    /// Contract as the planner sees it: a gated-out pipe has no contract.
    pub fn effective_contract(&self, flags: &BTreeSet<String>) -> Contract {
        if self.enabled(flags) {
            self.pipe.contract().clone()
        } else {
            Contract::empty()
        }
    }
}

/// Named, ordered group of pipes sharing one container snapshot.
#[derive(Debug)]
pub struct Step {
    name: String,
    pipes: Vec<PipeSlot>,
}

impl Step {
    pub fn new(name: impl Into<String>, pipes: Vec<PipeSlot>) -> Self {
        Self { name: name.into(), pipes }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipes(&self) -> &[PipeSlot] {
        &self.pipes
    }
}

/// A resolved pipeline: the container schema plus the ordered steps.
#[derive(Debug)]
pub struct Pipeline {
    schema: Vec<ContainerSchema>,
    steps: Vec<Step>,
}

impl Pipeline {
    /// Assemble and validate: every container a contract references must be
    /// declared, and every contract output kind must be accepted by its
    /// output container.
    pub fn new(schema: Vec<ContainerSchema>, steps: Vec<Step>) -> Result<Self> {
        let pipeline = Self { schema, steps };
        for step in &pipeline.steps {
            for slot in step.pipes() {
                let contract = slot.pipe().contract();
                for name in contract.read_containers() {
                    pipeline.container_schema(name)?;
                }
                for rule in contract.rules() {
                    let out = pipeline.container_schema(rule.output_container())?;
                    if !out.accepts(rule.output_kind()) {
                        return Err(PipelineError::ContainerTypeMismatch {
                            container: out.name.clone(),
                            container_type: out.type_name.clone(),
                            kind: rule.output_kind().name().to_string(),
                        });
                    }
                }
            }
        }
        Ok(pipeline)
    }

    pub fn schema(&self) -> &[ContainerSchema] {
        &self.schema
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_index(&self, name: &str) -> Result<usize> {
        self.steps
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))
    }

    pub fn container_schema(&self, name: &str) -> Result<&ContainerSchema> {
        self.schema
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PipelineError::UnknownContainer(name.to_string()))
    }

    /// One empty container per schema entry.
    pub fn empty_container_set(&self) -> Result<ContainerSet> {
        let mut set = ContainerSet::new();
        for schema in &self.schema {
            set.insert(schema.instantiate()?);
        }
        Ok(set)
    }
}

/// One requested target: where it should materialize and what it is.
#[derive(Debug, Clone)]
pub struct GoalTarget {
    pub step: String,
    pub container: String,
    pub target: Target,
}

impl GoalTarget {
    pub fn new(step: impl Into<String>, container: impl Into<String>, target: Target) -> Self {
        Self { step: step.into(), container: container.into(), target }
    }
}

/// Result of the backward pass: what each step must find at entry.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Entry requirements per step index, up to and including the goal step.
    pub needs: Vec<TargetsByContainer>,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct RunOutcome {
    /// The goal containers restricted to the requested targets.
    pub containers: ContainerSet,
    /// Non-fatal notes: concrete overwrites, release-mode contract drift.
    pub warnings: Vec<String>,
}

/// Plans and executes a pipeline against a store of per-step artifacts.
pub struct Runner<'p> {
    pipeline: &'p Pipeline,
    flags: BTreeSet<String>,
}

impl<'p> Runner<'p> {
    pub fn new(pipeline: &'p Pipeline, flags: impl IntoIterator<Item = String>) -> Self {
        Self { pipeline, flags: flags.into_iter().collect() }
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    fn validate_goals(&self, goals: &[GoalTarget]) -> Result<usize> {
        let mut goal_idx = 0;
        for goal in goals {
            let idx = self.pipeline.step_index(&goal.step)?;
            goal_idx = goal_idx.max(idx);
            let schema = self.pipeline.container_schema(&goal.container)?;
            if !schema.accepts(goal.target.kind()) {
                return Err(PipelineError::ContainerTypeMismatch {
                    container: schema.name.clone(),
                    container_type: schema.type_name.clone(),
                    kind: goal.target.kind().name().to_string(),
                });
            }
        }
        Ok(goal_idx)
    }

    /// Backward pass: derive per-step entry requirements for `goals`.
    ///
    /// Steps are walked last to first; within a step, pipes are applied in
    /// reverse declared order, each replacing the outputs it covers with the
    /// inputs its contract requires. Whatever a step cannot find locally
    /// (seeded inputs, artifacts persisted by an earlier run) is demanded
    /// from its predecessor; a residual at the first step is a planning
    /// failure naming the first missing target.
    pub fn plan(&self, goals: &[GoalTarget], store: &PipelineStore) -> Result<Plan> {
        if goals.is_empty() {
            return Ok(Plan { needs: Vec::new() });
        }
        let goal_idx = self.validate_goals(goals)?;
        let mut needs: Vec<TargetsByContainer> =
            vec![TargetsByContainer::new(); goal_idx + 1];
        for goal in goals {
            let idx = self.pipeline.step_index(&goal.step)?;
            needs[idx].insert(&goal.container, goal.target.clone());
        }

        for idx in (0..=goal_idx).rev() {
            let step = &self.pipeline.steps()[idx];
            let mut required = needs[idx].clone();
            for slot in step.pipes().iter().rev() {
                let contract = slot.effective_contract(&self.flags);
                let deduction = contract.deduce_backward(&required);
                if deduction.covered.is_empty() {
                    continue;
                }
                required.subtract(&deduction.covered);
                required.union(&deduction.required);
            }
            needs[idx] = required.clone();

            let residual = self.unsatisfied(step.name(), &required, store)?;
            if idx > 0 {
                needs[idx - 1].union(&residual);
            } else if let Some((container, target)) = residual.first() {
                return Err(PipelineError::UnsatisfiableGoal {
                    step: step.name().to_string(),
                    container: container.to_string(),
                    target: target.to_string(),
                });
            }
        }
        Ok(Plan { needs })
    }

    /// The subset of `required` not already present at `step` in the store.
    ///
    /// A concrete requirement is satisfied by a matching present target. A
    /// wildcard requirement is satisfied only against a container that was
    /// explicitly bound as an input or already holds a match; an empty,
    /// unbound container never satisfies it vacuously.
    fn unsatisfied(
        &self,
        step: &str,
        required: &TargetsByContainer,
        store: &PipelineStore,
    ) -> Result<TargetsByContainer> {
        let mut residual = TargetsByContainer::new();
        let containers = store.containers(step)?;
        for (name, targets) in required.iter() {
            let present = containers.get(name)?.enumerate();
            let bound = store.is_bound(step, name);
            for target in targets {
                let satisfied = if target.is_concrete() {
                    present.contains_matching(target)
                } else {
                    bound || present.contains_matching(target)
                };
                if !satisfied {
                    residual.insert(name, target.clone());
                }
            }
        }
        Ok(residual)
    }

    /// Forward pass: execute steps first to goal, committing each step's
    /// containers to the store as it finishes.
    ///
    /// On a pipe failure the step is aborted; everything earlier pipes
    /// produced stays in the store for inspection, and the error names the
    /// pipe with its cause passed through.
    pub fn run(
        &self,
        ctx: &PipelineContext,
        store: &mut PipelineStore,
        goals: &[GoalTarget],
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        if goals.is_empty() {
            return Ok(RunOutcome { containers: ContainerSet::new(), warnings: Vec::new() });
        }
        let goal_idx = self.validate_goals(goals)?;
        self.plan(goals, store)?;

        let mut warnings = Vec::new();
        let mut carried = self.pipeline.empty_container_set()?;
        for step in &self.pipeline.steps()[..=goal_idx] {
            let mut working = carried;
            working.merge_set(store.containers(step.name())?.clone())?;

            // Overlap detection: concrete targets produced earlier in this
            // same step (later-wins, with a warning).
            let mut produced_so_far = TargetsByContainer::new();
            for slot in step.pipes() {
                if cancel.is_cancelled() {
                    store.set_containers(step.name(), working);
                    return Err(PipelineError::Cancelled);
                }
                if !slot.enabled(&self.flags) {
                    continue;
                }

                let entry = working.enumerate_all();
                let predicted = slot.pipe().contract().deduce_postcondition(&entry);
                for (name, targets) in predicted.iter() {
                    for target in targets {
                        if !target.is_concrete() {
                            continue;
                        }
                        let overlap = produced_so_far
                            .get(name)
                            .map(|set| set.contains(target))
                            .unwrap_or(false);
                        if overlap {
                            warnings.push(format!(
                                "step '{}': pipe '{}' overwrites '{}' in container '{}'",
                                step.name(),
                                slot.pipe().type_name(),
                                target,
                                name
                            ));
                        }
                    }
                }
                produced_so_far.union(&predicted);

                if let Err(cause) = slot.pipe().execute(ctx, &mut working) {
                    store.set_containers(step.name(), working);
                    return Err(PipelineError::PipeFailed {
                        pipe: slot.pipe().type_name().to_string(),
                        cause: Box::new(cause),
                    });
                }

                if let Err(violation) =
                    check_contract(slot.pipe(), &entry, &predicted, &working)
                {
                    if cfg!(debug_assertions) {
                        store.set_containers(step.name(), working);
                        return Err(violation);
                    }
                    warnings.push(violation.to_string());
                }
            }

            store.set_containers(step.name(), working.clone());
            carried = working;
        }

        let mut out = ContainerSet::new();
        for goal in goals {
            let mut wanted = TargetsByContainer::new();
            wanted.insert(&goal.container, goal.target.clone());
            let extracted = store.containers(&goal.step)?.extract(&wanted);
            out.merge_set(extracted)?;
        }
        Ok(RunOutcome { containers: out, warnings })
    }
}

/// Verify a pipe against its own contract after execution: every predicted
/// concrete target must be present, every consumed input must be gone.
fn check_contract(
    pipe: &dyn Pipe,
    entry: &TargetsByContainer,
    predicted: &TargetsByContainer,
    after: &ContainerSet,
) -> Result<()> {
    for (name, targets) in predicted.iter() {
        for target in targets {
            if !target.is_concrete() {
                continue;
            }
            if !after.get(name)?.contains(target) {
                return Err(PipelineError::PipeContractViolation {
                    pipe: pipe.type_name().to_string(),
                    reason: format!("predicted target '{target}' missing from container '{name}'"),
                });
            }
        }
    }
    let consumed = pipe.contract().deduce_consumed(entry);
    for (name, targets) in consumed.iter() {
        for target in targets {
            if target.is_concrete() && after.get(name)?.contains(target) {
                return Err(PipelineError::PipeContractViolation {
                    pipe: pipe.type_name().to_string(),
                    reason: format!("consumed target '{target}' still present in container '{name}'"),
                });
            }
        }
    }
    Ok(())
}
