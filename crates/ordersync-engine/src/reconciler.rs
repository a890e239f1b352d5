//! Reconciliation pass.
//!
//! One pass scans the commerce platform for orders modified since the
//! watermark, classifies their address validation status, and tags the
//! problematic ones in the fulfillment service, recording every outcome
//! in the ledger. Failures handling a single order never abort the pass;
//! only a source scan failure does, and that leaves the watermark alone
//! so the next pass covers the same window again.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ordersync_connector::{FulfillmentOps, SourceOrder, SourceOrders, TagId};

use crate::classifier::has_address_issue;
use crate::error::SyncResult;
use crate::ledger::{LedgerStore, OutcomeStatus};
use crate::scanner::OrderScan;

/// When to revisit an order that already has a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Retry orders whose last outcome was `not_found` or `error`;
    /// never retag orders already tagged.
    #[default]
    UnresolvedOnly,
    /// Handle every order exactly once, whatever the outcome.
    Never,
}

impl RetryPolicy {
    /// Whether an order with the given prior outcome should be
    /// handled again.
    #[must_use]
    pub fn should_retry(self, prior: OutcomeStatus) -> bool {
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::UnresolvedOnly => prior != OutcomeStatus::Tagged,
        }
    }
}

/// Reconciler tuning knobs.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Numeric id of the issue tag on the fulfillment side.
    pub tag: TagId,

    /// Order status filters for the source scan; empty scans everything.
    pub status_filters: Vec<String>,

    /// Page size for source scans.
    pub page_size: u32,

    /// Minimum delay between consecutive tag applications within a pass.
    pub tag_pacing: Duration,

    /// Scan window for the very first pass, when no watermark exists yet.
    pub first_run_lookback: chrono::Duration,

    /// Revisit policy for orders already in the ledger.
    pub retry_policy: RetryPolicy,
}

/// Counters for a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Orders seen in the scan.
    pub inspected: u64,
    /// Orders classified as having an address issue.
    pub issues: u64,
    /// Issue orders tagged during this pass.
    pub newly_tagged: u64,
    /// Issue orders absent from the fulfillment service.
    pub not_found: u64,
    /// Issue orders skipped because of a prior ledger entry.
    pub already_seen: u64,
    /// Issue orders whose lookup or tagging failed.
    pub errors: u64,
}

/// Runs reconciliation passes against injected source and destination
/// clients.
pub struct Reconciler<S, F> {
    source: S,
    fulfillment: F,
    ledger: LedgerStore,
    config: ReconcilerConfig,
}

impl<S: SourceOrders, F: FulfillmentOps> Reconciler<S, F> {
    pub fn new(source: S, fulfillment: F, ledger: LedgerStore, config: ReconcilerConfig) -> Self {
        Self {
            source,
            fulfillment,
            ledger,
            config,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// The watermark advances to the pass start time only when the scan
    /// ran to completion without cancellation; an aborted or failed pass
    /// leaves it untouched so no modification window is ever skipped.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> SyncResult<PassStats> {
        let pass_start = Utc::now();
        let since = match self.ledger.watermark().await? {
            Some(mark) => mark,
            None => pass_start - self.config.first_run_lookback,
        };

        info!(since = %since, "Starting reconciliation pass");

        let mut stats = PassStats::default();
        let mut scan = OrderScan::new(
            &self.source,
            since,
            &self.config.status_filters,
            self.config.page_size,
        );
        let mut tagged_any = false;

        loop {
            if cancel.is_cancelled() {
                info!(
                    inspected = stats.inspected,
                    newly_tagged = stats.newly_tagged,
                    "Pass cancelled; watermark not advanced"
                );
                return Ok(stats);
            }

            let Some(order) = scan.next().await? else {
                break;
            };

            stats.inspected += 1;
            self.handle_order(&order, &mut stats, &mut tagged_any).await?;
        }

        self.ledger.set_watermark(pass_start).await?;

        info!(
            inspected = stats.inspected,
            issues = stats.issues,
            newly_tagged = stats.newly_tagged,
            not_found = stats.not_found,
            already_seen = stats.already_seen,
            errors = stats.errors,
            "Reconciliation pass complete"
        );

        Ok(stats)
    }

    async fn handle_order(
        &self,
        order: &SourceOrder,
        stats: &mut PassStats,
        tagged_any: &mut bool,
    ) -> SyncResult<()> {
        if !has_address_issue(order) {
            return Ok(());
        }
        stats.issues += 1;

        if let Some(entry) = self.ledger.find(&order.id).await? {
            if !self.config.retry_policy.should_retry(entry.status) {
                debug!(
                    source_id = %order.id,
                    prior_status = %entry.status,
                    "Skipping order with prior ledger entry"
                );
                stats.already_seen += 1;
                return Ok(());
            }
            debug!(
                source_id = %order.id,
                prior_status = %entry.status,
                "Revisiting unresolved order"
            );
        }

        match self.fulfillment.find_by_order_number(&order.order_number).await {
            Ok(Some(destination)) => {
                // Pace tag applications so bursts of issues don't trip the
                // destination's rate limits.
                if *tagged_any && !self.config.tag_pacing.is_zero() {
                    tokio::time::sleep(self.config.tag_pacing).await;
                }

                match self.fulfillment.apply_tag(&destination.id, self.config.tag).await {
                    Ok(()) => {
                        *tagged_any = true;
                        stats.newly_tagged += 1;
                        info!(
                            source_id = %order.id,
                            order_number = %order.order_number,
                            destination_id = %destination.id,
                            "Tagged order with address issue"
                        );
                        self.ledger
                            .record_outcome(
                                &order.id,
                                &order.order_number,
                                Some(destination.id.as_str()),
                                OutcomeStatus::Tagged,
                                None,
                            )
                            .await?;
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!(
                            source_id = %order.id,
                            order_number = %order.order_number,
                            error = %e,
                            "Failed to apply tag"
                        );
                        let note = format!("{}: {e}", e.error_code());
                        self.ledger
                            .record_outcome(
                                &order.id,
                                &order.order_number,
                                Some(destination.id.as_str()),
                                OutcomeStatus::Error,
                                Some(note.as_str()),
                            )
                            .await?;
                    }
                }
            }
            Ok(None) => {
                stats.not_found += 1;
                debug!(
                    source_id = %order.id,
                    order_number = %order.order_number,
                    "Order not found in fulfillment service"
                );
                self.ledger
                    .record_outcome(
                        &order.id,
                        &order.order_number,
                        None,
                        OutcomeStatus::NotFound,
                        None,
                    )
                    .await?;
            }
            Err(e) => {
                stats.errors += 1;
                warn!(
                    source_id = %order.id,
                    order_number = %order.order_number,
                    error = %e,
                    "Fulfillment lookup failed"
                );
                let note = format!("{}: {e}", e.error_code());
                self.ledger
                    .record_outcome(
                        &order.id,
                        &order.order_number,
                        None,
                        OutcomeStatus::Error,
                        Some(note.as_str()),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// The ledger backing this reconciler.
    #[must_use]
    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }
}
