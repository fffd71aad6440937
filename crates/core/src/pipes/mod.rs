//! Pipes: opaque units of work bound to container names.
//!
//! A pipe carries a [`Contract`] describing, at target granularity, what it
//! reads and produces; `execute` must honor it. Pipes are registered by type
//! name in the [`crate::loader::Registry`] and constructed from their
//! pipeline-description declaration, which binds the container names.

pub mod copy;
pub mod model_render;
pub mod passes;

pub use copy::CopyPipe;
pub use model_render::RenderModelPipe;
pub use passes::{builtin_passes, ModulePass, ModulePassPipe};

use crate::containers::ContainerSet;
use crate::context::PipelineContext;
use crate::contract::Contract;
use crate::error::Result;

/// An execution unit with a declarative contract.
///
/// Pipes are pure with respect to everything except their bound containers
/// and the context's Globals.
pub trait Pipe {
    /// Registered type name.
    fn type_name(&self) -> &'static str;

    fn contract(&self) -> &Contract;

    /// Names of the Globals this pipe reads. Mutating any of them
    /// invalidates every target this pipe produces.
    fn globals_read(&self) -> &[String] {
        &[]
    }

    /// Run against the step's container snapshot, mutating it in place.
    fn execute(&self, ctx: &PipelineContext, containers: &mut ContainerSet) -> Result<()>;
}
