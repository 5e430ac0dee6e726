mod cli;
mod collector;
mod error;
mod kubernetes;
mod persister;
mod snapshot;
mod types;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use cli::{Cli, Command, CreateArgs};
use kubernetes::KubeClusterClient;
use snapshot::{PersistPolicy, SnapshotManager, SnapshotOptions};
use utils::resolve_output_path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Create(args) => run_create(args).await,
    }
}

async fn run_create(args: CreateArgs) -> anyhow::Result<()> {
    let span = info_span!("snapshot");
    let output = resolve_output_path(args.output.as_deref(), &args.output_dir);

    let client = KubeClusterClient::connect(
        args.kubeconfig.as_deref(),
        args.context.as_deref(),
        info_span!(parent: &span, "cluster"),
    )
    .await
    .context("Failed to initialize Kubernetes client")?;

    let options = SnapshotOptions {
        format: args.format,
        include_logs: args.include_logs,
        policy: if args.keep_going {
            PersistPolicy::Report
        } else {
            PersistPolicy::FailFast
        },
    };
    let manager = SnapshotManager::with_defaults(Arc::new(client), &options, span.clone())?;

    // Ctrl-C takes effect at the next cluster call.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling snapshot");
            on_signal.cancel();
        }
    });

    info!(parent: &span, "Creating snapshot...");
    let report = match manager.create_snapshot(&output, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            error!(parent: &span, "Failed to create snapshot ({:?} error): {}", e.category(), e);
            return Err(e.into());
        }
    };

    for failure in &report.failures {
        warn!(
            parent: &span,
            "Not captured: {}/{} ({})",
            failure.kind,
            failure.name,
            failure.error
        );
    }
    for (collector, n) in &report.by_collector {
        info!(parent: &span, "Collector {} captured {} resources", collector, n);
    }
    let counts = report
        .by_kind
        .iter()
        .map(|(kind, n)| format!("{}={}", kind, n))
        .collect::<Vec<_>>()
        .join(",");
    info!(
        parent: &span,
        "Snapshot created: {} ({} resources: {})",
        report.output.display(),
        report.persisted,
        counts
    );
    Ok(())
}
