//! Scene summary task runner.
//!
//! Processes one site's imagery order per invocation:
//! - Checks order status and fetches result artifacts idempotently
//! - Summarizes each 4-band clip raster into a per-site CSV table
//! - Publishes artifacts and the table to object storage
//! - Writes the cross-site rollup once every site has finished
//!
//! Runs either as a one-shot CLI (task input JSON on a file or stdin) or as
//! an HTTP server accepting the same input on `POST /invoke`.

mod server;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fulfillment::{Pipeline, PipelineConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use scene_common::TaskInput;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use server::AppState;

#[derive(Parser, Debug)]
#[command(name = "scene-processor")]
#[command(about = "Satellite scene summary pipeline")]
struct Args {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// YAML configuration file (default: read from environment)
    #[arg(long, global = true, env = "SCENE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one site's order
    Run {
        /// Task input JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,
    },

    /// Write and publish the cross-site rollup
    Rollup {
        /// Task input JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        input: String,
    },

    /// Accept invocations over HTTP
    Serve {
        #[arg(long, env = "PORT", default_value = "8080")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the task output; logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::from_env()?,
    };
    info!(
        bucket = %config.storage.bucket,
        provider = %config.provider,
        scratch_dir = %config.scratch_dir.display(),
        "Starting scene processor"
    );

    match args.command {
        Command::Run { input } => {
            let input = read_task_input(&input)?;
            let pipeline = Pipeline::connect(config).await?;
            let output = pipeline.invoke(&input).await?;
            println!("{}", serde_json::to_string(&output)?);
        }
        Command::Rollup { input } => {
            let input = read_task_input(&input)?;
            let pipeline = Pipeline::connect(config).await?;
            let report = pipeline.rollup(&input).await?;
            println!("{}", serde_json::to_string(&report)?);
        }
        Command::Serve { port } => {
            let prometheus = PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?;
            let pipeline = Pipeline::connect(config).await?;
            let state = Arc::new(AppState {
                pipeline,
                prometheus,
            });
            server::run_server(state, port).await?;
        }
    }

    Ok(())
}

fn read_task_input(source: &str) -> Result<TaskInput> {
    let text = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read task input from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read task input {}", source))?
    };

    serde_json::from_str(&text).context("Task input is not valid JSON")
}
