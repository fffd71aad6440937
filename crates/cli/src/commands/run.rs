use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use pipeline_core::context::PipelineContext;
use pipeline_core::db::{RunLedger, RunRecord, RunStatus};
use pipeline_core::error::PipelineError;
use pipeline_core::loader::Registry;
use pipeline_core::runner::{CancelToken, GoalTarget, Runner};
use pipeline_core::storage::PipelineStore;

use crate::commands::{load_pipeline, parse_binding, parse_goal};

/// Name of the run ledger file inside the working directory.
const LEDGER_FILE: &str = "runs.db";

/// Plan and execute a pipeline, materializing the requested targets.
#[allow(clippy::too_many_arguments)]
pub fn run_command(
    pipeline_path: &str,
    inputs: &[String],
    outputs: &[String],
    step: &str,
    target_specs: &[String],
    libraries: &[String],
    flags: &[String],
    workdir: Option<&str>,
) -> Result<()> {
    let mut ctx = PipelineContext::with_defaults()?;
    let mut registry = Registry::with_defaults();
    registry
        .apply_bundles(libraries, &mut ctx)
        .context("Failed to load extension libraries")?;

    let (_description, pipeline, pipeline_hash) =
        load_pipeline(pipeline_path, &registry, &ctx)?;
    pipeline.step_index(step).context("Goal step not found")?;

    if target_specs.is_empty() {
        return Err(anyhow!("No goal targets requested (expected step:container:path:Kind)"));
    }
    let mut goals: Vec<GoalTarget> = Vec::new();
    for spec in target_specs {
        goals.push(parse_goal(spec, &ctx)?);
    }

    let workdir = workdir.map(PathBuf::from);
    let mut store = match &workdir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create working directory {}", dir.display()))?;
            PipelineStore::load(&pipeline, dir, &mut ctx)
                .context("Failed to load persisted artifacts")?
        }
        None => PipelineStore::new(&pipeline)?,
    };

    for spec in inputs {
        let binding = parse_binding(spec)?;
        let bytes = fs::read(&binding.path)
            .with_context(|| format!("Failed to read input file {}", binding.path.display()))?;
        store
            .bind_input(&binding.step, &binding.container, &bytes)
            .with_context(|| format!("Failed to bind input '{spec}'"))?;
    }

    // Record the run before executing so failed runs are visible too.
    let ledger = match &workdir {
        Some(dir) => {
            Some(RunLedger::open(&dir.join(LEDGER_FILE)).context("Failed to open run ledger")?)
        }
        None => None,
    };
    let run_id = match &ledger {
        Some(ledger) => {
            let record = RunRecord {
                pipeline_hash,
                goal_step: step.to_string(),
                goals: target_specs.join(" "),
                status: RunStatus::Running,
                started_at: Utc::now().to_rfc3339(),
                finished_at: None,
            };
            Some(ledger.insert_run(&record).context("Failed to record run")?)
        }
        None => None,
    };

    let runner = Runner::new(&pipeline, flags.iter().cloned());
    let cancel = CancelToken::new();
    let result = runner.run(&ctx, &mut store, &goals, &cancel);

    // Persist whatever materialized, success or not; partial state stays
    // inspectable.
    if let Some(dir) = &workdir {
        store.save(dir, &ctx).context("Failed to persist artifacts")?;
    }
    if let (Some(ledger), Some(id)) = (&ledger, run_id) {
        let status = match &result {
            Ok(_) => RunStatus::Succeeded,
            Err(PipelineError::Cancelled) => RunStatus::Cancelled,
            Err(_) => RunStatus::Failed,
        };
        ledger
            .finish_run(id, status, &Utc::now().to_rfc3339())
            .context("Failed to finish run record")?;
    }

    let outcome = result?;
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    for spec in outputs {
        let binding = parse_binding(spec)?;
        write_output(&store, &binding.step, &binding.container, &binding.path)?;
    }

    println!("Run succeeded: goal step '{step}'");
    for (name, container) in outcome.containers.iter() {
        let targets = container.enumerate();
        println!("  {name}: {} target(s)", targets.len());
        for target in &targets {
            println!("    - {target}");
        }
    }

    Ok(())
}

fn write_output(store: &PipelineStore, step: &str, container: &str, path: &Path) -> Result<()> {
    let bytes = store
        .containers(step)
        .and_then(|set| set.get(container))
        .and_then(|c| c.serialize())
        .with_context(|| format!("Failed to serialize container '{container}' at step '{step}'"))?;
    fs::write(path, bytes)
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    println!("Wrote {step}:{container} to {}", path.display());
    Ok(())
}
