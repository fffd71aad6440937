use anyhow::Result;
use binary_pipeline::commands;
use clap::{Parser, Subcommand};

/// Pipeline runtime driver for staged binary analysis.
///
/// The binary is intentionally thin: it parses args, dispatches to command
/// helpers, and lets `pipeline-core` + `commands` own the real work for
/// testability and reuse.
#[derive(Parser, Debug)]
#[command(
    name = "pipeline-cli",
    version,
    about = "Plan, run, and invalidate staged binary-analysis pipelines",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan and execute a pipeline to materialize the requested targets.
    Run {
        /// Pipeline description file (YAML).
        #[arg(short = 'P', long = "pipeline")]
        pipeline: String,

        /// Input binding `step:container:path`; reads the file into the
        /// named container before planning.
        #[arg(short = 'i', long = "input")]
        input: Vec<String>,

        /// Output binding `step:container:path`; writes the container after
        /// the run.
        #[arg(short = 'o', long = "output")]
        output: Vec<String>,

        /// Goal step name.
        #[arg(long)]
        step: String,

        /// Set a flag for `EnabledWhen` pipe gating.
        #[arg(short = 'f', long = "flag")]
        flag: Vec<String>,

        /// Load a named extension library before resolving the pipeline.
        #[arg(short = 'l', long = "library")]
        library: Vec<String>,

        /// Persistent working directory for artifacts and the run ledger.
        #[arg(short = 'p', long = "workdir")]
        workdir: Option<String>,

        /// Goal targets, `step:container:path:Kind` (path components use `/`,
        /// `*` is the wildcard).
        targets: Vec<String>,
    },

    /// Remove stored targets and everything transitively derived from them.
    Invalidate {
        /// Pipeline description file (YAML).
        #[arg(short = 'P', long = "pipeline")]
        pipeline: String,

        /// Persistent working directory holding the artifacts.
        #[arg(short = 'p', long = "workdir")]
        workdir: String,

        /// Invalidate everything produced by pipes reading this Global.
        #[arg(long)]
        global: Option<String>,

        /// Set a flag for `EnabledWhen` pipe gating.
        #[arg(short = 'f', long = "flag")]
        flag: Vec<String>,

        /// Load a named extension library before resolving the pipeline.
        #[arg(short = 'l', long = "library")]
        library: Vec<String>,

        /// Seed targets, `step:container:path:Kind`.
        targets: Vec<String>,
    },

    /// Show a pipeline's containers, steps, and pipes.
    Describe {
        /// Pipeline description file (YAML).
        #[arg(short = 'P', long = "pipeline")]
        pipeline: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Load a named extension library before resolving the pipeline.
        #[arg(short = 'l', long = "library")]
        library: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { pipeline, input, output, step, flag, library, workdir, targets } => {
            commands::run_command(
                &pipeline,
                &input,
                &output,
                &step,
                &targets,
                &library,
                &flag,
                workdir.as_deref(),
            )?
        }
        Command::Invalidate { pipeline, workdir, global, flag, library, targets } => {
            commands::invalidate_command(
                &pipeline,
                &workdir,
                global.as_deref(),
                &targets,
                &library,
                &flag,
            )?
        }
        Command::Describe { pipeline, json, library } => {
            commands::describe_command(&pipeline, json, &library)?
        }
    }

    Ok(())
}
