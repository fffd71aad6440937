//! Transitive invalidation of derived targets.
//!
//! Two triggers: a Global was mutated, or a caller explicitly invalidates a
//! target set. Either way the stale seed is closed forward, pipe by pipe in
//! declared order and step by step through the carried containers, and the
//! closure is then removed from the store. After a run completes, no
//! container holds a target whose derivation chain touched the seed.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::runner::{GoalTarget, Pipeline};
use crate::storage::PipelineStore;
use crate::target::{Target, TargetsByContainer};

/// What an invalidation actually removed, for reporting and tests.
#[derive(Debug, Default)]
pub struct InvalidationReport {
    /// `(step, container, target)` triples, in application order.
    pub removed: Vec<(String, String, Target)>,
}

impl InvalidationReport {
    pub fn len(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Computes and applies transitive invalidation over a pipeline's store.
pub struct Invalidator<'p> {
    pipeline: &'p Pipeline,
    flags: BTreeSet<String>,
}

impl<'p> Invalidator<'p> {
    pub fn new(pipeline: &'p Pipeline, flags: impl IntoIterator<Item = String>) -> Self {
        Self { pipeline, flags: flags.into_iter().collect() }
    }

    /// Explicit invalidation of a target set (wildcards expand against the
    /// store's current contents).
    pub fn invalidate_targets(
        &self,
        store: &mut PipelineStore,
        seeds: &[GoalTarget],
    ) -> Result<InvalidationReport> {
        let mut stale = self.empty_stale();
        for seed in seeds {
            let idx = self.pipeline.step_index(&seed.step)?;
            let container = store.containers(&seed.step)?.get(&seed.container)?;
            let expanded = container.expand(&seed.target);
            stale[idx].union_set(&seed.container, &expanded);
            if seed.target.is_concrete() {
                stale[idx].insert(&seed.container, seed.target.clone());
            }
        }
        self.close_and_apply(store, stale)
    }

    /// Invalidation after mutating the Global named `global`: the seed is
    /// every output of every enabled pipe reading it, in every step.
    pub fn invalidate_global(
        &self,
        store: &mut PipelineStore,
        global: &str,
    ) -> Result<InvalidationReport> {
        let mut stale = self.empty_stale();
        for (idx, step) in self.pipeline.steps().iter().enumerate() {
            for slot in step.pipes() {
                if !slot.enabled(&self.flags) {
                    continue;
                }
                if !slot.pipe().globals_read().iter().any(|name| name == global) {
                    continue;
                }
                let entry = store.containers(step.name())?.enumerate_all();
                let produced = slot.pipe().contract().deduce_postcondition(&entry);
                stale[idx].union(&produced);
            }
        }
        self.close_and_apply(store, stale)
    }

    fn empty_stale(&self) -> Vec<TargetsByContainer> {
        vec![TargetsByContainer::new(); self.pipeline.steps().len()]
    }

    /// Forward closure: within each step, pipes propagate staleness from
    /// their reads to their outputs in declared order; across steps, stale
    /// targets carry forward by container name. Then remove everything.
    fn close_and_apply(
        &self,
        store: &mut PipelineStore,
        mut stale: Vec<TargetsByContainer>,
    ) -> Result<InvalidationReport> {
        for idx in 0..self.pipeline.steps().len() {
            if idx > 0 {
                let carried = stale[idx - 1].clone();
                stale[idx].union(&carried);
            }
            let step = &self.pipeline.steps()[idx];
            for slot in step.pipes() {
                if !slot.enabled(&self.flags) {
                    continue;
                }
                let contract = slot.pipe().contract();
                let mut stale_inputs = TargetsByContainer::new();
                for name in contract.read_containers() {
                    if let Some(targets) = stale[idx].get(name) {
                        stale_inputs.union_set(name, targets);
                    }
                }
                if stale_inputs.is_empty() {
                    continue;
                }
                let produced = contract.deduce_derived(&stale_inputs);
                stale[idx].union(&produced);
            }
        }

        let mut report = InvalidationReport::default();
        for (idx, step_stale) in stale.iter().enumerate() {
            let step = self.pipeline.steps()[idx].name().to_string();
            for (container, targets) in step_stale.iter() {
                let removed = store.remove_targets(&step, container, targets)?;
                for target in removed {
                    report.removed.push((step.clone(), container.clone(), target));
                }
            }
        }
        Ok(report)
    }
}
