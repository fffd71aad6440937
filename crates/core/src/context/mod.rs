//! The pipeline context: registries plus named, savable Globals.
//!
//! There is exactly one context per run and it outlives every runner built
//! on top of it. Globals are type-erased savable objects addressed by unique
//! name; fetching one back requires naming its static type. Mutable access
//! records the Global as dirty so the caller can drive invalidation before
//! the next run.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PipelineError, Result};
use crate::kinds::KindRegistry;
use crate::model::ModelGlobal;

/// A named, serializable process-wide value kept in the context.
pub trait Global {
    /// Unique registered name; doubles as the persisted file name.
    fn name(&self) -> &str;

    /// Reset to the default value.
    fn clear(&mut self);

    fn serialize(&self) -> Result<Vec<u8>>;

    fn deserialize(&mut self, bytes: &[u8]) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared state for a pipeline run: kind/rank registries and Globals.
#[derive(Default)]
pub struct PipelineContext {
    kinds: KindRegistry,
    globals: BTreeMap<String, Box<dyn Global>>,
    dirty_globals: BTreeSet<String>,
}

impl PipelineContext {
    /// An empty context with no registrations at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context with the built-in ranks, kinds, and the model Global.
    pub fn with_defaults() -> Result<Self> {
        let mut ctx = Self::new();
        ctx.kinds.register_rank("root", None)?;
        ctx.kinds.register_rank("function", Some("root"))?;
        ctx.kinds.register_kind("BinaryKind", "root", None)?;
        ctx.kinds.register_kind("StringKind", "root", None)?;
        ctx.kinds.register_kind("ObjectKind", "root", None)?;
        ctx.kinds.register_kind("TranslatedKind", "root", None)?;
        ctx.kinds.register_kind("LiftedFunctionKind", "function", None)?;
        ctx.register_global(Box::new(ModelGlobal::default()));
        Ok(ctx)
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn kinds_mut(&mut self) -> &mut KindRegistry {
        &mut self.kinds
    }

    /// Register a Global under its own name. Re-registering replaces the
    /// previous value.
    pub fn register_global(&mut self, global: Box<dyn Global>) {
        self.globals.insert(global.name().to_string(), global);
    }

    /// Fetch a Global by name and static type.
    pub fn global<T: Global + 'static>(&self, name: &str) -> Result<&T> {
        self.globals
            .get(name)
            .and_then(|g| g.as_any().downcast_ref::<T>())
            .ok_or_else(|| PipelineError::GlobalNotFound(name.to_string()))
    }

    /// Fetch a Global mutably; marks it dirty.
    ///
    /// Dirty Globals must be passed through the invalidator before the next
    /// runner invocation.
    pub fn global_mut<T: Global + 'static>(&mut self, name: &str) -> Result<&mut T> {
        let resolvable = self
            .globals
            .get_mut(name)
            .map(|g| g.as_any_mut().downcast_mut::<T>().is_some())
            .unwrap_or(false);
        if !resolvable {
            return Err(PipelineError::GlobalNotFound(name.to_string()));
        }
        self.dirty_globals.insert(name.to_string());
        self.globals
            .get_mut(name)
            .and_then(|g| g.as_any_mut().downcast_mut::<T>())
            .ok_or_else(|| PipelineError::GlobalNotFound(name.to_string()))
    }

    /// Names of Globals mutated since the last [`Self::take_dirty_globals`].
    pub fn dirty_globals(&self) -> impl Iterator<Item = &str> {
        self.dirty_globals.iter().map(|s| s.as_str())
    }

    /// Drain the dirty set; the caller is expected to invalidate each name.
    pub fn take_dirty_globals(&mut self) -> BTreeSet<String> {
        std::mem::take(&mut self.dirty_globals)
    }

    /// Iterate registered Globals in name order (for persistence).
    pub fn globals(&self) -> impl Iterator<Item = (&str, &dyn Global)> {
        self.globals.iter().map(|(name, global)| (name.as_str(), global.as_ref()))
    }

    /// Restore a Global's contents from persisted bytes without marking it
    /// dirty (loading is not a mutation).
    pub fn restore_global(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let global = self
            .globals
            .get_mut(name)
            .ok_or_else(|| PipelineError::GlobalNotFound(name.to_string()))?;
        global.deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, ModelFunction};

    #[test]
    fn globals_are_fetched_by_name_and_type() {
        let ctx = PipelineContext::with_defaults().expect("context");
        let model = ctx.global::<ModelGlobal>(ModelGlobal::NAME).expect("model global");
        assert!(model.model().functions.is_empty());
    }

    #[test]
    fn unknown_global_name_is_reported() {
        let ctx = PipelineContext::with_defaults().expect("context");
        let err = ctx.global::<ModelGlobal>("nope.yml").unwrap_err();
        assert!(matches!(err, PipelineError::GlobalNotFound(_)));
    }

    #[test]
    fn mutable_access_marks_the_global_dirty() {
        let mut ctx = PipelineContext::with_defaults().expect("context");
        assert!(ctx.take_dirty_globals().is_empty());

        {
            let model = ctx.global_mut::<ModelGlobal>(ModelGlobal::NAME).expect("model global");
            model.model_mut().functions.push(ModelFunction::new("main", 0x1000));
        }
        let dirty = ctx.take_dirty_globals();
        assert!(dirty.contains(ModelGlobal::NAME));
        assert!(ctx.take_dirty_globals().is_empty());
    }

    #[test]
    fn restore_does_not_mark_dirty() {
        let mut ctx = PipelineContext::with_defaults().expect("context");
        let bytes = {
            let global = ModelGlobal::new(Model::default());
            Global::serialize(&global).expect("serialize")
        };
        ctx.restore_global(ModelGlobal::NAME, &bytes).expect("restore");
        assert!(ctx.take_dirty_globals().is_empty());
    }
}
