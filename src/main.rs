use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crpt_api::client::CrptApi;
use crpt_api::config::CrptConfig;
use crpt_api::document::Document;

/// Submit a signed document to the CRPT registration API.
#[derive(Debug, Parser)]
#[command(name = "crpt-api", version, about)]
struct Args {
    /// Path to a YAML client configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the document to submit (JSON, or YAML by extension)
    #[arg(short, long)]
    document: PathBuf,

    /// Detached signature of the document
    #[arg(short, long)]
    signature: String,

    /// Number of times to submit the document
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Log filter directive (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting CRPT API client");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => CrptConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => CrptConfig::default(),
    };
    info!(
        endpoint = %config.api.endpoint,
        time_unit = ?config.rate_limit.time_unit,
        request_limit = config.rate_limit.request_limit,
        "Configuration loaded"
    );

    let document = Document::from_file(&args.document)
        .with_context(|| format!("Failed to load document from {}", args.document.display()))?;

    let api = Arc::new(CrptApi::new(&config)?);

    // Cancel pending submissions on Ctrl+C
    {
        let api = api.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            api.shutdown();
        });
    }

    let submissions: Vec<_> = (0..args.repeat)
        .map(|_| {
            let api = api.clone();
            let document = document.clone();
            let signature = args.signature.clone();
            tokio::spawn(async move { api.create_document(&document, &signature).await })
        })
        .collect();

    let mut failures = 0;
    for submission in submissions {
        match submission.await? {
            Ok(response) => {
                println!("Response status code: {}", response.status);
                println!("Response body: {}", response.body);
                if !response.is_success() {
                    failures += 1;
                }
            }
            Err(e) if e.is_cancelled() => {
                warn!("Submission cancelled before it was sent");
                failures += 1;
            }
            Err(e) => {
                warn!(error = %e, "Submission failed");
                failures += 1;
            }
        }
    }

    info!(failures = failures, "CRPT API client finished");
    if failures > 0 {
        anyhow::bail!("{} of {} submissions failed", failures, args.repeat);
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling pending submissions");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling pending submissions");
        }
    }
}
