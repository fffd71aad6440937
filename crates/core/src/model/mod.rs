//! The recovered program model and its pipeline Global wrapper.
//!
//! The model is the principal piece of shared mutable state: pipes read it
//! while lifting and recovering functions, and any edit to it must
//! invalidate everything derived from it. It lives in the
//! [`crate::context::PipelineContext`] as the Global named `model.yml` and
//! serializes as YAML.

pub mod cfg;

use serde::{Deserialize, Serialize};

use crate::context::Global;
use crate::error::{PipelineError, Result};
use crate::model::cfg::FunctionCfg;

/// One basic block of a recovered function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBlock {
    /// Start address of the block.
    pub start: u64,
    /// Successor block start addresses; [`cfg::INVALID_ADDRESS`] marks a
    /// function exit.
    pub successors: Vec<u64>,
}

/// A function recovered into the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFunction {
    pub name: String,
    pub entry: u64,
    /// Control-flow metadata; empty until some analysis fills it in.
    #[serde(default)]
    pub blocks: Vec<ModelBlock>,
}

impl ModelFunction {
    pub fn new(name: impl Into<String>, entry: u64) -> Self {
        Self { name: name.into(), entry, blocks: Vec::new() }
    }

    /// Build the verification CFG from this function's block metadata.
    pub fn cfg(&self) -> FunctionCfg {
        let mut graph = FunctionCfg::new(self.entry);
        for block in &self.blocks {
            graph.get_or_insert(block.start);
            for &successor in &block.successors {
                graph.add_edge(block.start, successor);
            }
        }
        graph
    }

    /// Check the block metadata: the entry block must exist, every block
    /// must be reachable from it, and only the synthetic exit node may lack
    /// successors. Functions without metadata verify trivially.
    pub fn verify_cfg(&self) -> bool {
        if self.blocks.is_empty() {
            return true;
        }
        if !self.blocks.iter().any(|b| b.start == self.entry) {
            return false;
        }
        let graph = self.cfg();
        graph.all_reachable() && graph.only_invalid_exits()
    }
}

/// The recovered program model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub functions: Vec<ModelFunction>,
}

impl Model {
    /// Verify every function's CFG metadata; returns the first offender.
    pub fn verify(&self) -> std::result::Result<(), String> {
        for function in &self.functions {
            if !function.verify_cfg() {
                return Err(format!(
                    "function '{}' at {:#x} has inconsistent control-flow metadata",
                    function.name, function.entry
                ));
            }
        }
        Ok(())
    }
}

/// The model wrapped as a registered pipeline Global.
#[derive(Debug, Clone, Default)]
pub struct ModelGlobal {
    model: Model,
}

impl ModelGlobal {
    /// Registered Global name; doubles as the persisted file name.
    pub const NAME: &'static str = "model.yml";

    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }
}

impl Global for ModelGlobal {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn clear(&mut self) {
        self.model = Model::default();
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let text = serde_yaml::to_string(&self.model).map_err(|e| {
            PipelineError::SerializationFailed {
                subject: Self::NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(text.into_bytes())
    }

    fn deserialize(&mut self, bytes: &[u8]) -> Result<()> {
        let model: Model = serde_yaml::from_slice(bytes).map_err(|e| {
            PipelineError::DeserializationFailed {
                subject: Self::NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        model.verify().map_err(|reason| PipelineError::DeserializationFailed {
            subject: Self::NAME.to_string(),
            reason,
        })?;
        self.model = model;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
