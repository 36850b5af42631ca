use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crpt_gate::api::{Document, DocumentClient};
use crpt_gate::config::GateConfig;
use crpt_gate::ratelimit::RateLimiter;

/// Submit documents to the registration API without exceeding its rate limit.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML configuration file; built-in defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file holding the document to submit
    #[arg(short, long)]
    document: PathBuf,

    /// Signature sent along with the document
    #[arg(short, long)]
    signature: String,

    /// Number of concurrent submissions of the document
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => GateConfig::from_file(path)?,
        None => GateConfig::default(),
    };
    let window = config.rate_limit.window()?;
    info!(
        limit = window.limit(),
        period = ?window.period(),
        endpoint = %config.api.endpoint,
        "Configuration loaded"
    );

    let contents = std::fs::read_to_string(&cli.document)
        .with_context(|| format!("reading {}", cli.document.display()))?;
    let document: Document = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", cli.document.display()))?;

    let shutdown = CancellationToken::new();
    let limiter = Arc::new(RateLimiter::new(window));
    let client = DocumentClient::new(&config.api, limiter)?.with_cancellation(shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let submissions = (0..cli.count).map(|_| client.create_document(&document, &cli.signature));
    let results = join_all(submissions).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let cancelled = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_cancelled()))
        .count();
    let failed = results.len() - succeeded - cancelled;

    info!(succeeded, failed, cancelled, "Submissions finished");

    if failed > 0 || cancelled > 0 {
        anyhow::bail!("{} of {} submissions did not complete", failed + cancelled, results.len());
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, cancelling pending submissions");
        }
        _ = terminate => {
            warn!("Received SIGTERM, cancelling pending submissions");
        }
    }
}
