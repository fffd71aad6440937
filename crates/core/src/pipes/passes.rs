//! Compound pipe running named inner passes over a module container.
//!
//! This is the adapter between legacy pass-manager style analyses and the
//! container/pipe abstraction: one contract at pipe granularity, opaque
//! passes inside. Pass names are resolved against the registry when the
//! pipeline loads, so a misspelled pass fails before anything executes.

use std::collections::BTreeMap;

use crate::containers::ContainerSet;
use crate::context::PipelineContext;
use crate::contract::{Contract, ContractRule};
use crate::error::{PipelineError, Result};
use crate::kinds::Kind;
use crate::pipes::Pipe;
use crate::target::Target;

/// An inner pass: transforms the module's units in place.
///
/// Passes must not add or remove units; the pipe's identity contract
/// promises the same target set after execution.
pub type ModulePass = fn(&mut BTreeMap<Target, String>) -> std::result::Result<(), String>;

/// The built-in pass catalog.
pub fn builtin_passes() -> Vec<(&'static str, ModulePass)> {
    vec![("strip-debug", strip_debug), ("mark-optimized", mark_optimized)]
}

/// Drops `;`-prefixed annotation lines from every unit body.
fn strip_debug(units: &mut BTreeMap<Target, String>) -> std::result::Result<(), String> {
    for body in units.values_mut() {
        let kept: Vec<&str> =
            body.lines().filter(|line| !line.trim_start().starts_with(';')).collect();
        *body = kept.join("\n");
    }
    Ok(())
}

/// Appends an `; optimized` marker to units that do not carry one yet.
fn mark_optimized(units: &mut BTreeMap<Target, String>) -> std::result::Result<(), String> {
    for body in units.values_mut() {
        if !body.lines().any(|line| line.trim() == "; optimized") {
            if !body.is_empty() && !body.ends_with('\n') {
                body.push('\n');
            }
            body.push_str("; optimized");
        }
    }
    Ok(())
}

/// Runs an ordered list of named passes over one module container.
pub struct ModulePassPipe {
    container: String,
    passes: Vec<(String, ModulePass)>,
    contract: Contract,
}

impl ModulePassPipe {
    pub const TYPE_NAME: &'static str = "LLVMPipe";

    /// `passes` must already be resolved; the loader maps unknown names to
    /// an [`PipelineError::InvalidPipe`] before construction.
    pub fn new(
        container: impl Into<String>,
        unit_kind: Kind,
        passes: Vec<(String, ModulePass)>,
    ) -> Result<Self> {
        let container = container.into();
        let rule =
            ContractRule::identity(&container, unit_kind.clone(), &container, unit_kind, true)?;
        Ok(Self { container, passes, contract: Contract::new(vec![rule]) })
    }
}

impl Pipe for ModulePassPipe {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn contract(&self) -> &Contract {
        &self.contract
    }

    fn execute(&self, _ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()> {
        let units = containers.get_mut(&self.container)?.module_units_mut()?;
        for (name, pass) in &self.passes {
            pass(units).map_err(|reason| PipelineError::PassFailed {
                pass: name.clone(),
                reason,
            })?;
        }
        Ok(())
    }
}
