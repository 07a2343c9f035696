use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shapeworker_core::metrics::LoggingMetricsBackend;
use shapeworker_core::{OperationRegistry, ProxyMetrics, ReservedOperation};
use shapeworker_kernel::ShapeKernel;
use shapeworker_proxy::{LogFormat, ProxyService, ShapeworkerConfig, Worker, transport};
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "shapeworker",
    about = "Shapeworker kernel proxy: memoized geometry operations behind content-hash handles"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve newline-delimited JSON requests on stdin, responses on stdout
    Serve {
        /// Path to shapeworker.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run every request in FILE through a fresh worker, responses on stdout
    Replay {
        file: PathBuf,
        /// Path to shapeworker.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// List the operations this worker serves
    Operations,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(config.as_deref())?;
            tracing::info!("Serving on stdio");
            run_worker(&config, BufReader::new(tokio::io::stdin())).await
        }
        Commands::Replay { file, config } => {
            let config = load_config(config.as_deref())?;
            let input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("cannot open {}", file.display()))?;
            tracing::info!(file = %file.display(), "Replaying requests");
            run_worker(&config, BufReader::new(input)).await
        }
        Commands::Operations => {
            let registry = OperationRegistry::<ShapeKernel>::for_kernel()?;
            for name in registry.names() {
                println!("{name}");
            }
            for op in ReservedOperation::ALL {
                println!("{op} (uncached)");
            }
            Ok(())
        }
    }
}

/// Load config and install the subscriber it asks for.
/// Logs go to stderr; stdout carries the protocol.
fn load_config(path: Option<&Path>) -> Result<ShapeworkerConfig> {
    let config = ShapeworkerConfig::load(path)?;
    let subscriber = fmt()
        .with_env_filter(EnvFilter::from_env("SHAPEWORKER_LOG"))
        .with_writer(std::io::stderr);
    match config.log.format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
    Ok(config)
}

async fn run_worker<R>(config: &ShapeworkerConfig, reader: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let metrics = Arc::new(ProxyMetrics::with_backend(Arc::new(LoggingMetricsBackend)));
    let kernel = ShapeKernel::new(config.mesh.default_precision);
    let service = ProxyService::with_metrics(kernel, config.service_options(), Arc::clone(&metrics))?;
    let (worker, outbound, thread) = Worker::spawn(service)?;

    let received = transport::serve(worker, outbound, reader, tokio::io::stdout()).await?;
    tokio::task::spawn_blocking(move || thread.join()).await??;

    let snapshot = metrics.snapshot();
    tracing::info!(
        received,
        requests = snapshot.requests,
        errors = snapshot.errors,
        cache_hits = snapshot.cache_hits,
        cache_misses = snapshot.cache_misses,
        evictions = snapshot.evictions,
        "Worker stopped"
    );
    Ok(())
}
