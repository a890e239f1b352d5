//! # Ordersync Connector
//!
//! HTTP clients for the two order-management systems the reconciliation
//! job bridges:
//!
//! - the **commerce platform** (source): paginated order listing filtered
//!   by modification time, carrying the address-validation field;
//! - the **fulfillment system** (destination): order lookup by business
//!   number, tag directory, and tag application.
//!
//! The engine consumes both systems through the [`traits::SourceOrders`]
//! and [`traits::FulfillmentOps`] traits so it can be tested against
//! in-memory fakes; the concrete clients here add timeouts, retry with
//! exponential backoff, and structured request logging.

pub mod commerce;
pub mod error;
pub mod fulfillment;
pub mod retry;
pub mod traits;
pub mod types;

pub use commerce::{CommerceClient, CommerceConfig};
pub use error::{ConnectorError, ConnectorResult};
pub use fulfillment::{FulfillmentClient, FulfillmentConfig};
pub use retry::{parse_retry_after, RetryConfig};
pub use traits::{FulfillmentOps, SourceOrders};
pub use types::{DestinationOrder, OrderPage, SourceOrder, TagId};
