use std::sync::Arc;

use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use doc_relay::channels::{CliChannel, PlainTextExtractor};
use doc_relay::config::{ConfigHandle, RelayConfig, RoutingConfig};
use doc_relay::pipeline::Relay;
use doc_relay::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = RelayConfig::from_env()?;

    // Stdout carries the CLI transport, so logs go to stderr (and optionally a daily file).
    let (file_layer, _guard) = match &settings.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "doc-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(env_filter()),
        )
        .with(file_layer)
        .init();

    eprintln!("📄 Doc Relay v{}", env!("CARGO_PKG_VERSION"));

    // ── Routing directory ────────────────────────────────────────────────
    let routing = if settings.routing_path.exists() {
        RoutingConfig::load(&settings.routing_path)?
    } else {
        tracing::warn!(
            path = %settings.routing_path.display(),
            "Routing file not found, starting with an empty directory"
        );
        RoutingConfig::default()
    };
    eprintln!(
        "   Routing: {} destinations, {} pre-customers, {} customers",
        routing.destinations.len(),
        routing.pre_customers.len(),
        routing.customers.len()
    );

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&settings.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    settings.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", settings.db_path.display());
    eprintln!("   Text extraction: plain text only (documents must carry a text layer as bytes)");
    eprintln!("   Reading JSON-lines events from stdin.\n");

    // ── Relay ────────────────────────────────────────────────────────────
    let cli = Arc::new(CliChannel::new());
    let relay = Relay::new(
        settings,
        db,
        cli.clone(),
        Arc::new(PlainTextExtractor),
        Arc::new(ConfigHandle::new(routing)),
    );

    let mut events = cli.start();
    while let Some(event) = events.next().await {
        match relay.handle_event(event).await {
            Ok(outcome) => tracing::debug!(outcome = ?outcome, "Event handled"),
            Err(e) => tracing::error!(error = %e, "Event failed"),
        }
    }

    // Let queued sends finish before exiting.
    relay.queue().wait_idle().await;
    let stats = relay.queue().stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "Input closed, shutting down"
    );
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
