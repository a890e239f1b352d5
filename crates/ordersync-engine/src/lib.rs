//! Reconciliation engine for order address-issue tagging.
//!
//! Periodically scans the commerce platform for recently modified orders,
//! classifies their address validation status, and tags the affected
//! orders in the fulfillment service. A persistent ledger keeps the
//! process idempotent across passes and restarts, and a watermark bounds
//! each incremental scan.

pub mod classifier;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod scanner;
pub mod scheduler;

pub use classifier::{has_address_issue, AddressStatus};
pub use error::{SyncError, SyncResult};
pub use ledger::{LedgerEntry, LedgerStore, OutcomeStatus};
pub use reconciler::{PassStats, Reconciler, ReconcilerConfig, RetryPolicy};
pub use scanner::OrderScan;
pub use scheduler::Scheduler;
