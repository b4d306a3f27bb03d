mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scribeconf::ScribeConfig;
use trackscribe::AnalysisContext;

/// trackscribe - tempo, timbre hints and descriptions for audio tracks
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file, replacing ./trackscribe.toml
    #[arg(long, env = "TRACKSCRIBE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze tracks and print one JSON record per file
    Analyze {
        /// Audio files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Skip the description step
        #[arg(long)]
        no_creative: bool,

        /// Skip the classification probes
        #[arg(long)]
        no_probes: bool,

        /// Pretty-print records
        #[arg(long)]
        pretty: bool,
    },

    /// Show the effective configuration and where it came from
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ScribeConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Config => {
            println!("# Config files loaded:");
            for file in &sources.files {
                println!("#   {}", file.display());
            }
            if sources.files.is_empty() {
                println!("#   (none, using defaults)");
            }
            for var in &sources.env_overrides {
                println!("# Env override: {}", var);
            }
            println!();
            print!("{}", config.to_toml());
            Ok(())
        }
        Commands::Analyze {
            files,
            no_creative,
            no_probes,
            pretty,
        } => {
            let telemetry = telemetry::init(&config.services.telemetry)
                .context("Failed to initialize telemetry")?;
            let result = run_analyze(config, &files, no_creative, no_probes, pretty).await;
            telemetry.shutdown();
            result
        }
    }
}

async fn run_analyze(
    config: ScribeConfig,
    files: &[PathBuf],
    no_creative: bool,
    no_probes: bool,
    pretty: bool,
) -> Result<()> {
    let mut context = AnalysisContext::from_config(config)?;
    if no_creative {
        context = context.without_creative();
    }
    if no_probes {
        context = context.without_probes();
    }

    let shutdown = context.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT, cancelling analysis");
            shutdown.cancel();
        }
    });

    let mut failures = 0usize;
    for file in files {
        if context.shutdown_token().is_cancelled() {
            break;
        }
        match context.analyze(file).await {
            Ok(record) => {
                let line = if pretty {
                    serde_json::to_string_pretty(&record)?
                } else {
                    serde_json::to_string(&record)?
                };
                println!("{}", line);
            }
            Err(e) => {
                failures += 1;
                tracing::error!(path = %file.display(), error = ?e, "analysis failed");
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} tracks could not be analyzed", failures, files.len());
    }
    Ok(())
}
