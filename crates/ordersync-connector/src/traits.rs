//! Connector traits.
//!
//! The sync engine depends on these traits rather than on the concrete
//! HTTP clients, so tests can substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ConnectorResult;
use crate::types::{DestinationOrder, OrderPage, TagId};

/// Read access to orders on the commerce platform.
#[async_trait]
pub trait SourceOrders: Send + Sync {
    /// Fetch one page of orders modified at or after `since`.
    ///
    /// `status_filter` restricts results to a single order status when
    /// given. Pages are 1-based.
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        status_filter: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> ConnectorResult<OrderPage>;
}

/// Lookup and tagging operations on the fulfillment service.
#[async_trait]
pub trait FulfillmentOps: Send + Sync {
    /// Find an order by its exact order number.
    ///
    /// Returns `Ok(None)` when no order with that number exists.
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> ConnectorResult<Option<DestinationOrder>>;

    /// Apply a tag to an order. Applying a tag the order already carries
    /// is a no-op on the fulfillment side.
    async fn apply_tag(&self, destination_id: &str, tag: TagId) -> ConnectorResult<()>;

    /// Resolve a tag name to its numeric identifier, case-insensitively.
    ///
    /// Returns `Ok(None)` when no tag with that name exists.
    async fn resolve_tag_id(&self, name: &str) -> ConnectorResult<Option<TagId>>;
}

// Blanket impls so Arc-wrapped clients satisfy the traits.

#[async_trait]
impl<T: SourceOrders + ?Sized> SourceOrders for std::sync::Arc<T> {
    async fn fetch_page(
        &self,
        since: DateTime<Utc>,
        status_filter: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> ConnectorResult<OrderPage> {
        (**self).fetch_page(since, status_filter, page, page_size).await
    }
}

#[async_trait]
impl<T: FulfillmentOps + ?Sized> FulfillmentOps for std::sync::Arc<T> {
    async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> ConnectorResult<Option<DestinationOrder>> {
        (**self).find_by_order_number(order_number).await
    }

    async fn apply_tag(&self, destination_id: &str, tag: TagId) -> ConnectorResult<()> {
        (**self).apply_tag(destination_id, tag).await
    }

    async fn resolve_tag_id(&self, name: &str) -> ConnectorResult<Option<TagId>> {
        (**self).resolve_tag_id(name).await
    }
}
