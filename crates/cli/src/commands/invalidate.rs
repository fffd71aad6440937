use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use pipeline_core::context::PipelineContext;
use pipeline_core::invalidate::Invalidator;
use pipeline_core::loader::Registry;
use pipeline_core::runner::GoalTarget;
use pipeline_core::storage::PipelineStore;

use crate::commands::{load_pipeline, parse_goal};

/// Remove stored targets (and everything transitively derived from them).
///
/// With `--global NAME`, the seed is every output of every pipe reading that
/// Global; otherwise the positional targets are the seed.
pub fn invalidate_command(
    pipeline_path: &str,
    workdir: &str,
    global: Option<&str>,
    target_specs: &[String],
    libraries: &[String],
    flags: &[String],
) -> Result<()> {
    let mut ctx = PipelineContext::with_defaults()?;
    let mut registry = Registry::with_defaults();
    registry
        .apply_bundles(libraries, &mut ctx)
        .context("Failed to load extension libraries")?;

    let (_description, pipeline, _hash) = load_pipeline(pipeline_path, &registry, &ctx)?;

    let dir = Path::new(workdir);
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create working directory {}", dir.display()))?;
    let mut store = PipelineStore::load(&pipeline, dir, &mut ctx)
        .context("Failed to load persisted artifacts")?;

    let invalidator = Invalidator::new(&pipeline, flags.iter().cloned());
    let report = match global {
        Some(name) => invalidator
            .invalidate_global(&mut store, name)
            .with_context(|| format!("Failed to invalidate global '{name}'"))?,
        None => {
            if target_specs.is_empty() {
                return Err(anyhow!(
                    "Nothing to invalidate: pass targets or --global NAME"
                ));
            }
            let mut seeds: Vec<GoalTarget> = Vec::new();
            for spec in target_specs {
                seeds.push(parse_goal(spec, &ctx)?);
            }
            invalidator
                .invalidate_targets(&mut store, &seeds)
                .context("Failed to invalidate targets")?
        }
    };

    store.save(dir, &ctx).context("Failed to persist artifacts")?;

    println!("Invalidated {} target(s)", report.len());
    for (step, container, target) in &report.removed {
        println!("  - {step}:{container}:{target}");
    }
    Ok(())
}
