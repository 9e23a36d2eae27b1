//! Command-line interface for the `tierflow` binary.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::capabilities::{CapabilityRegistry, TierSelector};
use crate::cluster::{compile_and_submit, orchestrator_for};
use crate::config::PipelineConfig;
use crate::core::StepId;
use crate::pipeline::PipelineGraph;

/// Capability-aware four-step ML pipeline.
#[derive(Parser, Debug)]
#[command(name = "tierflow")]
#[command(about = "Run, compile or inspect the music-therapy ML pipeline")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute generate, preprocess, train and evaluate locally.
    Run(RunArgs),

    /// Compile the graph to a workflow document and optionally submit it.
    Compile(CompileArgs),

    /// Print the capability snapshot and the resulting tier per step.
    Capabilities,
}

/// Arguments for `run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Overrides PIPELINE_OUTPUT_DIR.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// Arguments for `compile`.
#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Where to write the workflow document; defaults to the configured package path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Submit the compiled workflow to the orchestrator.
    #[arg(long)]
    pub submit: bool,
}

/// Parses process arguments.
#[must_use]
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Installs the global tracing subscriber.
///
/// Priority: `RUST_LOG` > `--log-level` > `info`.
pub fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (text, json) = match cli.log_format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Runs the parsed command.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a pipeline step fails.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let registry = CapabilityRegistry::detect(&config.disabled_capabilities);

    match cli.command {
        Commands::Run(args) => {
            let config = match args.output_dir {
                Some(dir) => config.with_output_dir(dir),
                None => config,
            };
            info!(output_dir = %config.output_dir.display(), "Starting pipeline run");
            let summary = PipelineGraph::new(config, registry)?
                .execute()
                .await
                .context("pipeline run failed")?;

            println!("Run {} reached {}", summary.metadata.run_id, summary.state);
            if let Some(training) = &summary.training {
                println!("Training accuracy: {:.4}", training.accuracy);
            }
            if let Some(evaluation) = &summary.evaluation {
                println!(
                    "Test accuracy: {:.4}, precision: {:.4}",
                    evaluation.accuracy, evaluation.precision
                );
            }
            if summary.degraded() {
                println!("Some steps ran in the degraded tier; see manifest.json");
            }
        }
        Commands::Compile(args) => {
            let output = args.output.unwrap_or_else(|| config.cluster.package_path.clone());
            let orchestrator = orchestrator_for(&config, registry);
            match compile_and_submit(orchestrator.as_deref(), &config, &output, args.submit).await {
                Ok(outcome) => println!("{outcome}"),
                Err(err) => println!("Pipeline compilation failed: {err}"),
            }
        }
        Commands::Capabilities => {
            print!("{registry}");
            let plan = TierSelector::new(registry).plan();
            for step in StepId::ALL {
                if let Some(tier) = plan.get(&step) {
                    println!("{:<17} {tier}", step.as_str());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile() {
        let cli = Cli::try_parse_from(["tierflow", "compile", "--output", "p.yaml", "--submit"]).unwrap();
        match cli.command {
            Commands::Compile(args) => {
                assert_eq!(args.output, Some(PathBuf::from("p.yaml")));
                assert!(args.submit);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["tierflow", "run", "--log-format", "json", "-l", "debug"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Run(RunArgs { output_dir: None })));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["tierflow", "deploy"]).is_err());
    }
}
