use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pipeline_core::context::PipelineContext;
use pipeline_core::loader::{PipelineDescription, Registry};
use pipeline_core::runner::{GoalTarget, Pipeline};
use pipeline_core::target::Target;

use crate::sha256_bytes;

/// A parsed `-i`/`-o` binding: `step:container:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBinding {
    pub step: String,
    pub container: String,
    pub path: PathBuf,
}

/// Parse a file binding. The path part may itself contain `:` (it is the
/// trailing remainder).
pub fn parse_binding(spec: &str) -> Result<FileBinding> {
    let mut fields = spec.splitn(3, ':');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(step), Some(container), Some(path))
            if !step.is_empty() && !container.is_empty() && !path.is_empty() =>
        {
            Ok(FileBinding {
                step: step.to_string(),
                container: container.to_string(),
                path: PathBuf::from(path),
            })
        }
        _ => Err(anyhow!("Invalid binding '{spec}': expected step:container:path")),
    }
}

/// Parse a goal target: `step:container:path:Kind`, where `path` uses `/`
/// between components and `*` as the wildcard.
pub fn parse_goal(spec: &str, ctx: &PipelineContext) -> Result<GoalTarget> {
    let fields: Vec<&str> = spec.split(':').collect();
    let [step, container, path, kind_name] = fields.as_slice() else {
        return Err(anyhow!("Invalid target '{spec}': expected step:container:path:Kind"));
    };
    if step.is_empty() || container.is_empty() || path.is_empty() || kind_name.is_empty() {
        return Err(anyhow!("Invalid target '{spec}': expected step:container:path:Kind"));
    }
    let kind = ctx
        .kinds()
        .kind(kind_name)
        .with_context(|| format!("Failed to resolve kind in target '{spec}'"))?;
    let target = Target::parse(path, kind)
        .with_context(|| format!("Failed to parse target path in '{spec}'"))?;
    Ok(GoalTarget::new(*step, *container, target))
}

/// Read, hash, and resolve a pipeline description file.
///
/// Returns the resolved pipeline together with the description and the
/// SHA-256 of the file (recorded in the run ledger).
pub fn load_pipeline(
    path: &str,
    registry: &Registry,
    ctx: &PipelineContext,
) -> Result<(PipelineDescription, Pipeline, String)> {
    let bytes = fs::read(Path::new(path))
        .with_context(|| format!("Failed to read pipeline description at {path}"))?;
    let hash = sha256_bytes(&bytes);
    let text = String::from_utf8(bytes)
        .with_context(|| format!("Pipeline description at {path} is not valid UTF-8"))?;
    let description = PipelineDescription::from_yaml(&text)
        .with_context(|| format!("Failed to parse pipeline description at {path}"))?;
    let pipeline = registry
        .resolve(&description, ctx)
        .with_context(|| format!("Failed to resolve pipeline description at {path}"))?;
    Ok((description, pipeline, hash))
}
