//! Pipeline descriptions and the load-time registry.
//!
//! A pipeline description is a human-authored YAML document listing
//! containers and steps. Loading resolves every name in it against the
//! registry: container types, pipe types, inner pass names, and kinds. All
//! resolution errors surface before anything executes.
//!
//! The registry is also the seam for extensions: named bundles registered
//! here run at load time and may add container types, pipes, passes, and
//! kinds. The CLI's `-l` flag selects bundles by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::containers::ContainerFamily;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::kinds::KindRegistry;
use crate::pipes::{
    builtin_passes, CopyPipe, ModulePass, ModulePassPipe, Pipe, RenderModelPipe,
};
use crate::runner::{ContainerSchema, Pipeline, PipeSlot, Step};

/// One container declaration in a pipeline description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDecl {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Type")]
    pub type_name: String,
}

/// One pipe declaration inside a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeDecl {
    #[serde(rename = "Type")]
    pub type_name: String,
    #[serde(rename = "UsedContainers")]
    pub used_containers: Vec<String>,
    /// Inner pass names for compound pipes.
    #[serde(rename = "Passes", default)]
    pub passes: Vec<String>,
    /// Flags that must all be active for the pipe to run.
    #[serde(rename = "EnabledWhen", default)]
    pub enabled_when: Vec<String>,
}

/// One step declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDecl {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Pipes")]
    pub pipes: Vec<PipeDecl>,
}

/// The persisted, human-authored pipeline document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDescription {
    #[serde(rename = "Containers")]
    pub containers: Vec<ContainerDecl>,
    #[serde(rename = "Steps")]
    pub steps: Vec<StepDecl>,
}

impl PipelineDescription {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::DeserializationFailed {
            subject: "pipeline description".to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::SerializationFailed {
            subject: "pipeline description".to_string(),
            reason: e.to_string(),
        })
    }
}

/// A registered container type: storage family plus accepted kind names.
#[derive(Debug, Clone)]
pub struct ContainerTypeDecl {
    pub family: ContainerFamily,
    pub accepted: Vec<String>,
}

/// Builds a pipe from its declaration. Factories validate the declaration
/// (container count, pass names) and bind container names.
pub type PipeFactory = fn(&PipeDecl, &Registry, &KindRegistry) -> Result<Box<dyn Pipe>>;

/// A named extension: registers additional types at load time.
pub type ExtensionBundle = fn(&mut Registry, &mut PipelineContext) -> Result<()>;

/// Central registry of container types, pipe types, passes, and extension
/// bundles, keyed by string name on load.
pub struct Registry {
    container_types: BTreeMap<String, ContainerTypeDecl>,
    pipes: BTreeMap<String, PipeFactory>,
    passes: BTreeMap<String, ModulePass>,
    bundles: BTreeMap<String, ExtensionBundle>,
}

impl Registry {
    /// An empty registry with nothing registered.
    pub fn new() -> Self {
        Self {
            container_types: BTreeMap::new(),
            pipes: BTreeMap::new(),
            passes: BTreeMap::new(),
            bundles: BTreeMap::new(),
        }
    }

    /// The registry every frontend starts from: built-in container types,
    /// pipes, and passes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_container_type(
            "StringContainer",
            ContainerTypeDecl {
                family: ContainerFamily::Strings,
                accepted: vec!["StringKind".to_string()],
            },
        );
        registry.register_container_type(
            "Binary",
            ContainerTypeDecl {
                family: ContainerFamily::Bytes,
                accepted: vec!["BinaryKind".to_string()],
            },
        );
        registry.register_container_type(
            "Object",
            ContainerTypeDecl {
                family: ContainerFamily::Bytes,
                accepted: vec!["ObjectKind".to_string()],
            },
        );
        registry.register_container_type(
            "Translated",
            ContainerTypeDecl {
                family: ContainerFamily::Bytes,
                accepted: vec!["TranslatedKind".to_string()],
            },
        );
        registry.register_container_type(
            "LLVMContainer",
            ContainerTypeDecl {
                family: ContainerFamily::Module,
                accepted: vec!["LiftedFunctionKind".to_string()],
            },
        );
        registry.register_pipe(CopyPipe::TYPE_NAME, copy_pipe_factory);
        registry.register_pipe(ModulePassPipe::TYPE_NAME, module_pass_pipe_factory);
        registry.register_pipe(RenderModelPipe::TYPE_NAME, render_model_pipe_factory);
        for (name, pass) in builtin_passes() {
            registry.register_pass(name, pass);
        }
        registry
    }

    pub fn register_container_type(&mut self, name: &str, decl: ContainerTypeDecl) {
        self.container_types.insert(name.to_string(), decl);
    }

    pub fn register_pipe(&mut self, name: &str, factory: PipeFactory) {
        self.pipes.insert(name.to_string(), factory);
    }

    pub fn register_pass(&mut self, name: &str, pass: ModulePass) {
        self.passes.insert(name.to_string(), pass);
    }

    pub fn register_bundle(&mut self, name: &str, bundle: ExtensionBundle) {
        self.bundles.insert(name.to_string(), bundle);
    }

    pub fn pass(&self, name: &str) -> Option<ModulePass> {
        self.passes.get(name).copied()
    }

    pub fn container_type(&self, name: &str) -> Option<&ContainerTypeDecl> {
        self.container_types.get(name)
    }

    /// Run the named extension bundles, in order.
    pub fn apply_bundles(&mut self, names: &[String], ctx: &mut PipelineContext) -> Result<()> {
        for name in names {
            let bundle = *self
                .bundles
                .get(name)
                .ok_or_else(|| PipelineError::UnknownLibrary(name.clone()))?;
            bundle(self, ctx)?;
        }
        Ok(())
    }

    /// Resolve a description into an executable [`Pipeline`].
    pub fn resolve(
        &self,
        description: &PipelineDescription,
        ctx: &PipelineContext,
    ) -> Result<Pipeline> {
        let mut schema: Vec<ContainerSchema> = Vec::new();
        for decl in &description.containers {
            if schema.iter().any(|c| c.name == decl.name) {
                return Err(PipelineError::InvalidContract(format!(
                    "duplicate container name '{}' in pipeline description",
                    decl.name
                )));
            }
            let type_decl = self
                .container_type(&decl.type_name)
                .ok_or_else(|| PipelineError::UnknownContainer(decl.type_name.clone()))?;
            let mut accepted = Vec::new();
            for kind_name in &type_decl.accepted {
                accepted.push(ctx.kinds().kind(kind_name)?);
            }
            schema.push(ContainerSchema {
                name: decl.name.clone(),
                type_name: decl.type_name.clone(),
                family: type_decl.family,
                accepted,
            });
        }

        let mut steps = Vec::new();
        for step_decl in &description.steps {
            let mut slots = Vec::new();
            for pipe_decl in &step_decl.pipes {
                for used in &pipe_decl.used_containers {
                    if !schema.iter().any(|c| &c.name == used) {
                        return Err(PipelineError::UnknownContainer(used.clone()));
                    }
                }
                let factory = self
                    .pipes
                    .get(&pipe_decl.type_name)
                    .ok_or_else(|| PipelineError::UnknownPipe(pipe_decl.type_name.clone()))?;
                let pipe = factory(pipe_decl, self, ctx.kinds())?;
                slots.push(PipeSlot::new(pipe, pipe_decl.enabled_when.clone()));
            }
            steps.push(Step::new(&step_decl.name, slots));
        }

        Pipeline::new(schema, steps)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn expect_containers(decl: &PipeDecl, expected: usize) -> Result<()> {
    if decl.used_containers.len() != expected {
        return Err(PipelineError::InvalidPipe {
            pipe: decl.type_name.clone(),
            reason: format!(
                "expected {} used container(s), found {}",
                expected,
                decl.used_containers.len()
            ),
        });
    }
    Ok(())
}

fn copy_pipe_factory(
    decl: &PipeDecl,
    _registry: &Registry,
    kinds: &KindRegistry,
) -> Result<Box<dyn Pipe>> {
    expect_containers(decl, 2)?;
    let kind = kinds.kind("StringKind")?;
    let pipe = CopyPipe::new(&decl.used_containers[0], &decl.used_containers[1], kind)?;
    Ok(Box::new(pipe))
}

fn module_pass_pipe_factory(
    decl: &PipeDecl,
    registry: &Registry,
    kinds: &KindRegistry,
) -> Result<Box<dyn Pipe>> {
    expect_containers(decl, 1)?;
    let mut passes = Vec::new();
    for name in &decl.passes {
        let pass = registry.pass(name).ok_or_else(|| PipelineError::InvalidPipe {
            pipe: decl.type_name.clone(),
            reason: format!("unknown pass '{name}'"),
        })?;
        passes.push((name.clone(), pass));
    }
    let kind = kinds.kind("LiftedFunctionKind")?;
    let pipe = ModulePassPipe::new(&decl.used_containers[0], kind, passes)?;
    Ok(Box::new(pipe))
}

fn render_model_pipe_factory(
    decl: &PipeDecl,
    _registry: &Registry,
    kinds: &KindRegistry,
) -> Result<Box<dyn Pipe>> {
    expect_containers(decl, 1)?;
    let kind = kinds.kind("StringKind")?;
    let pipe = RenderModelPipe::new(&decl.used_containers[0], kind)?;
    Ok(Box::new(pipe))
}
