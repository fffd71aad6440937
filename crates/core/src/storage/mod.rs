//! Per-step artifact store and its on-disk persistence.
//!
//! The store owns one [`ContainerSet`] per step. A persistent working
//! directory maps each step to a subdirectory with one file per container;
//! Globals persist as sibling files named by their registered name
//! (`model.yml`). Each container and Global type owns its serializer; the
//! store only requires that deserialize inverts serialize up to target
//! equivalence.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::containers::ContainerSet;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::runner::Pipeline;
use crate::target::{Target, TargetSet};

/// In-memory artifacts of every step, plus which containers were explicitly
/// bound as inputs.
pub struct PipelineStore {
    steps: BTreeMap<String, ContainerSet>,
    bound: BTreeSet<(String, String)>,
}

impl PipelineStore {
    /// Empty store: one empty container set per step of `pipeline`.
    pub fn new(pipeline: &Pipeline) -> Result<Self> {
        let mut steps = BTreeMap::new();
        for step in pipeline.steps() {
            steps.insert(step.name().to_string(), pipeline.empty_container_set()?);
        }
        Ok(Self { steps, bound: BTreeSet::new() })
    }

    pub fn containers(&self, step: &str) -> Result<&ContainerSet> {
        self.steps.get(step).ok_or_else(|| PipelineError::UnknownStep(step.to_string()))
    }

    pub fn containers_mut(&mut self, step: &str) -> Result<&mut ContainerSet> {
        self.steps.get_mut(step).ok_or_else(|| PipelineError::UnknownStep(step.to_string()))
    }

    /// Replace a step's containers (the runner commits step outputs here).
    pub fn set_containers(&mut self, step: &str, containers: ContainerSet) {
        self.steps.insert(step.to_string(), containers);
    }

    /// Deserialize `bytes` into a container and mark it as caller-bound.
    pub fn bind_input(&mut self, step: &str, container: &str, bytes: &[u8]) -> Result<()> {
        let set = self.containers_mut(step)?;
        set.get_mut(container)?.deserialize(bytes)?;
        self.bound.insert((step.to_string(), container.to_string()));
        Ok(())
    }

    /// Whether the caller bound this container as an input.
    pub fn is_bound(&self, step: &str, container: &str) -> bool {
        self.bound.contains(&(step.to_string(), container.to_string()))
    }

    /// Remove every target matching `doomed` from one container, returning
    /// the concrete targets actually removed.
    pub fn remove_targets(
        &mut self,
        step: &str,
        container: &str,
        doomed: &TargetSet,
    ) -> Result<Vec<Target>> {
        let set = self.containers_mut(step)?;
        let holder = set.get_mut(container)?;
        let removed: Vec<Target> =
            doomed.iter().flat_map(|pattern| holder.expand(pattern)).collect();
        let removed_set: TargetSet = removed.iter().cloned().collect();
        holder.remove(&removed_set);
        Ok(removed)
    }

    /// Persist every step's containers and every Global under `dir`.
    pub fn save(&self, dir: &Path, ctx: &PipelineContext) -> Result<()> {
        for (step, containers) in &self.steps {
            let step_dir = dir.join(step);
            fs::create_dir_all(&step_dir).map_err(|e| io_save(step, &e))?;
            for (name, container) in containers.iter() {
                let bytes = container.serialize()?;
                fs::write(step_dir.join(name), bytes).map_err(|e| io_save(name, &e))?;
            }
        }
        for (name, global) in ctx.globals() {
            let bytes = global.serialize()?;
            fs::write(dir.join(name), bytes).map_err(|e| io_save(name, &e))?;
        }
        Ok(())
    }

    /// Load previously persisted artifacts and Globals from `dir`.
    ///
    /// Missing files are fine (a fresh directory is an empty store); present
    /// files must deserialize.
    pub fn load(pipeline: &Pipeline, dir: &Path, ctx: &mut PipelineContext) -> Result<Self> {
        let mut store = Self::new(pipeline)?;
        for step in pipeline.steps() {
            let step_dir = dir.join(step.name());
            if !step_dir.is_dir() {
                continue;
            }
            let set = store.containers_mut(step.name())?;
            let names: Vec<String> = set.names().map(|n| n.to_string()).collect();
            for name in names {
                let path = step_dir.join(&name);
                if !path.is_file() {
                    continue;
                }
                let bytes = fs::read(&path).map_err(|e| io_load(&name, &e))?;
                set.get_mut(&name)?.deserialize(&bytes)?;
            }
        }
        let global_names: Vec<String> =
            ctx.globals().map(|(name, _)| name.to_string()).collect();
        for name in global_names {
            let path = dir.join(&name);
            if !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| io_load(&name, &e))?;
            ctx.restore_global(&name, &bytes)?;
        }
        Ok(store)
    }
}

fn io_save(subject: &str, err: &std::io::Error) -> PipelineError {
    PipelineError::SerializationFailed { subject: subject.to_string(), reason: err.to_string() }
}

fn io_load(subject: &str, err: &std::io::Error) -> PipelineError {
    PipelineError::DeserializationFailed { subject: subject.to_string(), reason: err.to_string() }
}
