use anyhow::{Context, Result};
use pipeline_core::context::PipelineContext;
use pipeline_core::loader::Registry;

use crate::commands::load_pipeline;

/// Show a pipeline's containers, steps, and pipes (human or JSON).
pub fn describe_command(pipeline_path: &str, json: bool, libraries: &[String]) -> Result<()> {
    let mut ctx = PipelineContext::with_defaults()?;
    let mut registry = Registry::with_defaults();
    registry
        .apply_bundles(libraries, &mut ctx)
        .context("Failed to load extension libraries")?;

    let (description, pipeline, hash) = load_pipeline(pipeline_path, &registry, &ctx)?;

    if json {
        let payload = serde_json::json!({
            "pipeline_hash": hash,
            "containers": description
                .containers
                .iter()
                .map(|c| serde_json::json!({ "name": c.name, "type": c.type_name }))
                .collect::<Vec<_>>(),
            "steps": description
                .steps
                .iter()
                .map(|s| serde_json::json!({
                    "name": s.name,
                    "pipes": s.pipes.iter().map(|p| serde_json::json!({
                        "type": p.type_name,
                        "used_containers": p.used_containers,
                        "passes": p.passes,
                        "enabled_when": p.enabled_when,
                    })).collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("Pipeline {pipeline_path} (sha256 {hash})");
    println!("Containers:");
    for container in &description.containers {
        println!("  - {} ({})", container.name, container.type_name);
    }
    println!("Steps:");
    for step in pipeline.steps() {
        println!("  - {}", step.name());
        for slot in step.pipes() {
            let gates = if slot.enabled_when().is_empty() {
                String::new()
            } else {
                format!(" [enabled when: {}]", slot.enabled_when().join(", "))
            };
            println!("      {}{}", slot.pipe().type_name(), gates);
        }
    }
    Ok(())
}
