//! Order address-issue reconciliation service.
//!
//! Periodically scans a commerce platform for orders whose shipping
//! address failed validation and tags them in the fulfillment service,
//! keeping a persistent ledger so each order is handled at most once.

mod config;
mod http;
mod logging;

use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use config::Config;
use ordersync_connector::{
    CommerceClient, CommerceConfig, FulfillmentClient, FulfillmentConfig, FulfillmentOps,
};
use ordersync_engine::{
    LedgerStore, Reconciler, ReconcilerConfig, Scheduler, SyncError,
};

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging("info");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting ordersync"
    );

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Fatal error");
        std::process::exit(1);
    }

    info!("Shutdown complete");
}

async fn run(config: Config) -> Result<(), SyncError> {
    let ledger = LedgerStore::connect(&config.database_url).await?;

    let source = CommerceClient::new(CommerceConfig::new(
        &config.source_base_url,
        &config.source_token,
    ))
    .map_err(|e| SyncError::configuration(format!("Commerce client: {e}")))?;

    let fulfillment = FulfillmentClient::new(FulfillmentConfig::new(
        &config.fulfillment_base_url,
        &config.fulfillment_api_key,
        &config.fulfillment_api_secret,
    ))
    .map_err(|e| SyncError::configuration(format!("Fulfillment client: {e}")))?;

    // Resolve the issue tag up front; a missing tag is an operator
    // mistake and the service refuses to start without it.
    let tag = fulfillment
        .resolve_tag_id(&config.issue_tag_name)
        .await
        .map_err(|e| SyncError::configuration(format!("Tag lookup failed: {e}")))?
        .ok_or_else(|| SyncError::TagNotResolved {
            name: config.issue_tag_name.clone(),
        })?;

    info!(tag_name = %config.issue_tag_name, tag_id = %tag, "Resolved issue tag");

    let reconciler = Arc::new(Reconciler::new(
        source,
        fulfillment,
        ledger.clone(),
        ReconcilerConfig {
            tag,
            status_filters: config.status_filters.clone(),
            page_size: config.page_size,
            tag_pacing: config.tag_pacing,
            first_run_lookback: config.first_run_lookback,
            retry_policy: config.retry_policy,
        },
    ));

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(reconciler, config.poll_interval);
    let scheduler_cancel = cancel.clone();
    let scheduler_handle =
        tokio::spawn(async move { scheduler.run(scheduler_cancel).await });

    let app = http::router(http::AppState {
        ledger,
        poll_interval_secs: config.poll_interval.as_secs(),
        issue_tag_name: config.issue_tag_name.clone(),
    });
    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            return Err(SyncError::configuration(format!(
                "Failed to bind to {addr}: {e}"
            )));
        }
    };

    info!(addr = %addr, "HTTP server listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop the scheduler; an in-flight pass finishes its current order
    // and returns without advancing the watermark.
    info!("Stopping scheduler");
    cancel.cancel();
    let scheduler_result = scheduler_handle.await;

    if let Err(e) = serve_result {
        return Err(SyncError::configuration(format!("Server error: {e}")));
    }

    match scheduler_result {
        Ok(result) => result,
        Err(e) => Err(SyncError::configuration(format!(
            "Scheduler task panicked: {e}"
        ))),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
