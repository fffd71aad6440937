//! Identity copy of string artifacts between two containers.

use crate::containers::ContainerSet;
use crate::context::PipelineContext;
use crate::contract::{Contract, ContractRule};
use crate::error::Result;
use crate::kinds::Kind;
use crate::pipes::Pipe;

/// Copies every artifact of `kind` from the source container to the
/// destination, keeping paths and leaving the source untouched.
pub struct CopyPipe {
    source: String,
    dest: String,
    contract: Contract,
}

impl CopyPipe {
    pub const TYPE_NAME: &'static str = "CopyPipe";

    pub fn new(source: impl Into<String>, dest: impl Into<String>, kind: Kind) -> Result<Self> {
        let source = source.into();
        let dest = dest.into();
        let rule = ContractRule::identity(&source, kind.clone(), &dest, kind, true)?;
        Ok(Self { source, dest, contract: Contract::new(vec![rule]) })
    }
}

impl Pipe for CopyPipe {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn execute(&self, _ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()> {
        let entries: Vec<_> = containers
            .get(&self.source)?
            .string_entries()?
            .iter()
            .map(|(target, content)| (target.clone(), content.clone()))
            .collect();
        let dest = containers.get_mut(&self.dest)?;
        for (target, content) in entries {
            dest.insert_string(target, content)?;
        }
        Ok(())
    }
}
