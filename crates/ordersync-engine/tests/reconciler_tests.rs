//! End-to-end reconciler tests with fake clients and an in-memory ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use ordersync_connector::{
    ConnectorError, ConnectorResult, DestinationOrder, FulfillmentOps, OrderPage, SourceOrder,
    SourceOrders, TagId,
};
use ordersync_engine::{
    LedgerStore, OutcomeStatus, PassStats, Reconciler, ReconcilerConfig, RetryPolicy,
};

const ISSUE_TAG: TagId = TagId(42);

/// Fake commerce platform serving a mutable order list in one page.
#[derive(Default)]
struct FakeCommerce {
    orders: Mutex<Vec<SourceOrder>>,
    fail: Mutex<bool>,
}

impl FakeCommerce {
    fn set_orders(&self, orders: Vec<SourceOrder>) {
        *self.orders.lock().unwrap() = orders;
    }

    fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl SourceOrders for FakeCommerce {
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        _status_filter: Option<&str>,
        page: u32,
        _page_size: u32,
    ) -> ConnectorResult<OrderPage> {
        if *self.fail.lock().unwrap() {
            return Err(ConnectorError::connection_failed("refused"));
        }

        let orders: Vec<SourceOrder> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.modified_at >= since)
            .cloned()
            .collect();

        Ok(OrderPage {
            orders,
            current_page: page,
            total_pages: 1,
        })
    }
}

/// Fake fulfillment service with a fixed order book and a tag counter.
#[derive(Default)]
struct FakeFulfillment {
    /// order_number -> destination id
    orders: Mutex<HashMap<String, String>>,
    /// destination id -> number of apply_tag calls
    tag_calls: Mutex<HashMap<String, u32>>,
    lookup_failures: AtomicU32,
    tag_failures: AtomicU32,
}

impl FakeFulfillment {
    fn add_order(&self, order_number: &str, destination_id: &str) {
        self.orders
            .lock()
            .unwrap()
            .insert(order_number.to_string(), destination_id.to_string());
    }

    fn tag_count(&self, destination_id: &str) -> u32 {
        self.tag_calls
            .lock()
            .unwrap()
            .get(destination_id)
            .copied()
            .unwrap_or(0)
    }

    /// Make the next `n` lookups fail.
    fn fail_lookups(&self, n: u32) {
        self.lookup_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` tag applications fail.
    fn fail_tags(&self, n: u32) {
        self.tag_failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl FulfillmentOps for FakeFulfillment {
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> ConnectorResult<Option<DestinationOrder>> {
        if self
            .lookup_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConnectorError::connection_failed("lookup refused"));
        }

        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(order_number)
            .map(|id| DestinationOrder {
                id: id.clone(),
                order_number: order_number.to_string(),
            }))
    }

    async fn apply_tag(&self, destination_id: &str, tag: TagId) -> ConnectorResult<()> {
        assert_eq!(tag, ISSUE_TAG);

        if self
            .tag_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConnectorError::operation_failed("tag rejected"));
        }

        *self
            .tag_calls
            .lock()
            .unwrap()
            .entry(destination_id.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn resolve_tag_id(&self, _name: &str) -> ConnectorResult<Option<TagId>> {
        Ok(Some(ISSUE_TAG))
    }
}

fn order(id: &str, number: &str, address_status: Option<&str>) -> SourceOrder {
    SourceOrder {
        id: id.to_string(),
        order_number: number.to_string(),
        modified_at: Utc::now(),
        address_status: address_status.map(str::to_string),
    }
}

fn config(retry_policy: RetryPolicy) -> ReconcilerConfig {
    ReconcilerConfig {
        tag: ISSUE_TAG,
        status_filters: Vec::new(),
        page_size: 50,
        tag_pacing: Duration::ZERO,
        first_run_lookback: chrono::Duration::hours(24),
        retry_policy,
    }
}

async fn reconciler(
    retry_policy: RetryPolicy,
) -> (
    Arc<FakeCommerce>,
    Arc<FakeFulfillment>,
    Reconciler<Arc<FakeCommerce>, Arc<FakeFulfillment>>,
) {
    let commerce = Arc::new(FakeCommerce::default());
    let fulfillment = Arc::new(FakeFulfillment::default());
    let ledger = LedgerStore::connect("sqlite::memory:").await.unwrap();
    let rec = Reconciler::new(
        Arc::clone(&commerce),
        Arc::clone(&fulfillment),
        ledger,
        config(retry_policy),
    );
    (commerce, fulfillment, rec)
}

async fn run(rec: &Reconciler<Arc<FakeCommerce>, Arc<FakeFulfillment>>) -> PassStats {
    rec.run_pass(&CancellationToken::new()).await.unwrap()
}

#[tokio::test]
async fn test_clean_orders_are_ignored() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![
        order("1", "1001", Some("validation_successful")),
        order("2", "1002", None),
    ]);
    fulfillment.add_order("1001", "900001");

    let stats = run(&rec).await;
    assert_eq!(stats.inspected, 2);
    assert_eq!(stats.issues, 0);
    assert_eq!(stats.newly_tagged, 0);
    assert_eq!(fulfillment.tag_count("900001"), 0);
    assert!(rec.ledger().find("1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_issue_order_gets_tagged_once() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);
    fulfillment.add_order("1001", "900001");

    // First pass tags the order.
    let stats = run(&rec).await;
    assert_eq!(stats.issues, 1);
    assert_eq!(stats.newly_tagged, 1);
    assert_eq!(fulfillment.tag_count("900001"), 1);

    let entry = rec.ledger().find("1").await.unwrap().unwrap();
    assert_eq!(entry.status, OutcomeStatus::Tagged);
    assert_eq!(entry.destination_id.as_deref(), Some("900001"));

    // The order shows up modified again; it must not be retagged.
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);
    let stats = run(&rec).await;
    assert_eq!(stats.issues, 1);
    assert_eq!(stats.newly_tagged, 0);
    assert_eq!(stats.already_seen, 1);
    assert_eq!(fulfillment.tag_count("900001"), 1);
}

#[tokio::test]
async fn test_missing_order_recorded_not_found() {
    let (commerce, _fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_warning"))]);

    let stats = run(&rec).await;
    assert_eq!(stats.issues, 1);
    assert_eq!(stats.not_found, 1);
    assert_eq!(stats.newly_tagged, 0);
    // An absent order is an expected condition, not an error.
    assert_eq!(stats.errors, 0);

    let entry = rec.ledger().find("1").await.unwrap().unwrap();
    assert_eq!(entry.status, OutcomeStatus::NotFound);
    assert_eq!(entry.destination_id, None);
}

#[tokio::test]
async fn test_not_found_then_appears_later() {
    // Order #1001 fails address validation but has not yet propagated to
    // the fulfillment service. It must be picked up and tagged in a later
    // pass once it appears.
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::UnresolvedOnly).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);

    let stats = run(&rec).await;
    assert_eq!(stats.not_found, 1);

    // The order propagates and is modified again on the source side.
    fulfillment.add_order("1001", "900001");
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);

    let stats = run(&rec).await;
    assert_eq!(stats.newly_tagged, 1);
    assert_eq!(stats.already_seen, 0);
    assert_eq!(fulfillment.tag_count("900001"), 1);

    let entry = rec.ledger().find("1").await.unwrap().unwrap();
    assert_eq!(entry.status, OutcomeStatus::Tagged);
}

#[tokio::test]
async fn test_never_policy_skips_not_found_entries() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::Never).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);

    let stats = run(&rec).await;
    assert_eq!(stats.not_found, 1);

    fulfillment.add_order("1001", "900001");
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);

    let stats = run(&rec).await;
    assert_eq!(stats.newly_tagged, 0);
    assert_eq!(stats.already_seen, 1);
    assert_eq!(fulfillment.tag_count("900001"), 0);

    let entry = rec.ledger().find("1").await.unwrap().unwrap();
    assert_eq!(entry.status, OutcomeStatus::NotFound);
}

#[tokio::test]
async fn test_lookup_failure_isolated_per_order() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![
        order("1", "1001", Some("validation_failed")),
        order("2", "1002", Some("validation_failed")),
    ]);
    fulfillment.add_order("1001", "900001");
    fulfillment.add_order("1002", "900002");
    fulfillment.fail_lookups(1);

    let stats = run(&rec).await;
    assert_eq!(stats.issues, 2);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.newly_tagged, 1);

    let failed = rec.ledger().find("1").await.unwrap().unwrap();
    assert_eq!(failed.status, OutcomeStatus::Error);
    assert!(failed.note.unwrap().contains("CONNECTION_FAILED"));
}

#[tokio::test]
async fn test_tag_failure_recorded_and_retried_next_pass() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::UnresolvedOnly).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);
    fulfillment.add_order("1001", "900001");
    fulfillment.fail_tags(1);

    let stats = run(&rec).await;
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.newly_tagged, 0);
    assert_eq!(
        rec.ledger().find("1").await.unwrap().unwrap().status,
        OutcomeStatus::Error
    );

    // The order resurfaces; under UnresolvedOnly the error entry is
    // revisited and the tag lands this time.
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);
    let stats = run(&rec).await;
    assert_eq!(stats.newly_tagged, 1);
    assert_eq!(fulfillment.tag_count("900001"), 1);
}

#[tokio::test]
async fn test_scan_failure_aborts_without_advancing_watermark() {
    let (commerce, _fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_failing(true);

    let err = rec.run_pass(&CancellationToken::new()).await.unwrap_err();
    assert!(!err.is_fatal());
    assert_eq!(rec.ledger().watermark().await.unwrap(), None);

    // Once the source recovers, the pass succeeds and the watermark is set.
    commerce.set_failing(false);
    run(&rec).await;
    assert!(rec.ledger().watermark().await.unwrap().is_some());
}

#[tokio::test]
async fn test_watermark_advances_to_pass_start() {
    let (commerce, _fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![]);

    let before = Utc::now();
    run(&rec).await;
    let after = Utc::now();

    let mark = rec.ledger().watermark().await.unwrap().unwrap();
    assert!(mark >= before && mark <= after);
}

#[tokio::test]
async fn test_cancelled_pass_leaves_watermark() {
    let (commerce, _fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![order("1", "1001", Some("validation_failed"))]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = rec.run_pass(&cancel).await.unwrap();
    assert_eq!(stats.inspected, 0);
    assert_eq!(rec.ledger().watermark().await.unwrap(), None);
}

#[tokio::test]
async fn test_mixed_pass_counts() {
    let (commerce, fulfillment, rec) = reconciler(RetryPolicy::default()).await;
    commerce.set_orders(vec![
        order("1", "1001", Some("validation_failed")),
        order("2", "1002", Some("validation_warning")),
        order("3", "1003", Some("validation_successful")),
        order("4", "1004", Some("validation_failed")),
        order("5", "1005", None),
    ]);
    // 1001 and 1002 exist downstream; 1004 does not.
    fulfillment.add_order("1001", "900001");
    fulfillment.add_order("1002", "900002");

    let stats = run(&rec).await;
    assert_eq!(
        stats,
        PassStats {
            inspected: 5,
            issues: 3,
            newly_tagged: 2,
            not_found: 1,
            already_seen: 0,
            errors: 0,
        }
    );
}
