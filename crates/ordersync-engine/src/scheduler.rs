//! Pass scheduler.
//!
//! Drives the reconciler on a fixed interval. Passes run inline on the
//! scheduler task, so two passes can never overlap; a pass that outlasts
//! the interval simply delays the next tick. The first pass starts
//! immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ordersync_connector::{FulfillmentOps, SourceOrders};

use crate::error::SyncResult;
use crate::reconciler::Reconciler;

/// Periodic driver for reconciliation passes.
pub struct Scheduler<S, F> {
    reconciler: Arc<Reconciler<S, F>>,
    interval: Duration,
    in_progress: AtomicBool,
}

impl<S: SourceOrders, F: FulfillmentOps> Scheduler<S, F> {
    pub fn new(reconciler: Arc<Reconciler<S, F>>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Run until the token is cancelled.
    ///
    /// Per-pass failures are logged and the schedule continues; a fatal
    /// error (bad configuration, unresolvable tag) stops the scheduler
    /// and is returned to the caller.
    pub async fn run(&self, cancel: CancellationToken) -> SyncResult<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // First tick fires immediately; late ticks are skipped instead of
        // bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.run_one(&cancel).await?;
                }
            }
        }
    }

    async fn run_one(&self, cancel: &CancellationToken) -> SyncResult<()> {
        // Passes run inline, so this guard only trips if run() is driven
        // from more than one task.
        if self.in_progress.swap(true, Ordering::SeqCst) {
            warn!("Previous pass still running, skipping tick");
            return Ok(());
        }

        let result = self.reconciler.run_pass(cancel).await;
        self.in_progress.store(false, Ordering::SeqCst);

        match result {
            Ok(stats) => {
                info!(
                    inspected = stats.inspected,
                    newly_tagged = stats.newly_tagged,
                    errors = stats.errors,
                    "Pass finished"
                );
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Fatal error, stopping scheduler");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Pass failed, will retry on next tick");
                Ok(())
            }
        }
    }
}
