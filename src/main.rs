use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spring3d::{AppConfig, Phase, SimulationController, server, sources};

/// Force-directed 3D graph layout server.
#[derive(Parser)]
#[command(name = "spring3d")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the graph, run the simulation and serve the layout over HTTP
    Serve {
        /// Port to run the server on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory with the viewer's static files
        #[arg(long)]
        static_dir: Option<PathBuf>,

        /// Wait for an explicit start request
        #[arg(long)]
        no_autostart: bool,
    },
    /// Run the simulation headless and write the final layout as JSON
    Layout {
        /// Output file for the layout JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Give up waiting for stabilization after this many seconds
        #[arg(long, default_value = "60")]
        timeout_secs: u64,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

/// Build the initial graph from the configured source
fn ingest(config: &AppConfig) -> anyhow::Result<SimulationController> {
    let source = sources::from_config(&config.source);
    tracing::info!(kind = source.kind(), "loading graph");
    let data = source.load(config.simulation.max_position)?;
    let controller = SimulationController::with_graph(config.simulation.clone(), data)?;
    Ok(controller)
}

fn layout(config: &AppConfig, output: &Path, timeout: Duration) -> anyhow::Result<()> {
    let controller = ingest(config)?;
    controller.start()?;

    let phase = match controller.wait(timeout) {
        Phase::Running => {
            tracing::warn!(?timeout, "layout did not stabilize in time, stopping");
            controller.stop(config.server.stop_timeout());
            controller.phase()
        }
        phase => phase,
    };
    if phase == Phase::Failed {
        anyhow::bail!(
            "simulation failed: {}",
            controller.failure().unwrap_or_default()
        );
    }

    let json = serde_json::to_string_pretty(&controller.layout())?;
    std::fs::write(output, json)?;
    println!(
        "Wrote layout of {} nodes after {} steps to {}",
        controller.status().nodes,
        controller.steps(),
        output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            static_dir,
            no_autostart,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            if no_autostart {
                config.server.autostart = false;
            }

            let controller = Arc::new(ingest(&config)?);
            if config.server.autostart {
                controller.start()?;
            }
            server::serve(controller, &config.server).await?;
        }
        Commands::Layout {
            output,
            timeout_secs,
        } => {
            let timeout = Duration::from_secs(timeout_secs);
            tokio::task::spawn_blocking(move || layout(&config, &output, timeout)).await??;
        }
    }

    Ok(())
}
