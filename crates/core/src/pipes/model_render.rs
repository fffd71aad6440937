//! Renders a summary of the model Global into a string container.
//!
//! The canonical example of a Global-reading pipe: everything it produces is
//! derived from `model.yml`, so a model edit invalidates its output.

use crate::containers::ContainerSet;
use crate::context::PipelineContext;
use crate::contract::{Contract, ContractRule};
use crate::error::Result;
use crate::kinds::Kind;
use crate::model::ModelGlobal;
use crate::pipes::Pipe;
use crate::target::{PathComponent, Target};

/// Path component of the produced summary target.
pub const SUMMARY_PATH: &str = "model";

/// Writes a one-target textual summary of the recovered model.
pub struct RenderModelPipe {
    output: String,
    kind: Kind,
    contract: Contract,
    globals: Vec<String>,
}

impl RenderModelPipe {
    pub const TYPE_NAME: &'static str = "RenderModel";

    pub fn new(output: impl Into<String>, kind: Kind) -> Result<Self> {
        let output = output.into();
        let rule =
            ContractRule::generator(&output, kind.clone(), vec![SUMMARY_PATH.to_string()])?;
        Ok(Self {
            output,
            kind,
            contract: Contract::new(vec![rule]),
            globals: vec![ModelGlobal::NAME.to_string()],
        })
    }
}

impl Pipe for RenderModelPipe {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn globals_read(&self) -> &[String] {
        &self.globals
    }

    fn execute(&self, ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()> {
        let model = ctx.global::<ModelGlobal>(ModelGlobal::NAME)?.model();
        let mut lines = vec![format!("functions: {}", model.functions.len())];
        for function in &model.functions {
            lines.push(format!(
                "function {} entry={:#x} blocks={}",
                function.name,
                function.entry,
                function.blocks.len()
            ));
        }
        let target =
            Target::new(self.kind.clone(), vec![PathComponent::exact(SUMMARY_PATH)])?;
        containers.get_mut(&self.output)?.insert_string(target, lines.join("\n"))?;
        Ok(())
    }
}
