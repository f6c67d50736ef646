use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use model_bench::{summarize, BenchmarkApp};

/// Benchmark orchestration for on-device detection models
#[derive(Debug, Parser)]
#[command(name = "model-bench", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reported device memory in GB, overrides detection
    #[arg(long, global = true)]
    memory_gb: Option<f64>,

    /// Platform string, overrides detection
    #[arg(long, global = true)]
    platform: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the capability profile of this host
    Profile,
    /// Print the artifacts and inputs a run would test
    Plan,
    /// Print the summary record of an exported run
    Summarize {
        /// Export document written by a run
        export: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut app = BenchmarkApp::load(cli.config.as_deref())?;
    if cli.memory_gb.is_some() || cli.platform.is_some() {
        let mut config = app.config().clone();
        config.device.memory_gb = cli.memory_gb.or(config.device.memory_gb);
        config.device.platform = cli.platform.or(config.device.platform);
        app = BenchmarkApp::from_config(config);
    }

    let _guard = app.init_logging()?;

    match cli.command {
        Command::Profile => {
            let profile = app.profile();
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Plan => {
            let profile = app.profile();
            let plan = app.plan(&profile);

            println!("{}", serde_json::to_string_pretty(&plan)?);
            println!(
                "{} artifacts x {} inputs = {} planned",
                plan.tested.len(),
                plan.corpus.len(),
                plan.total_planned()
            );
        }
        Command::Summarize { export } => {
            let summary = summarize(&export).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
