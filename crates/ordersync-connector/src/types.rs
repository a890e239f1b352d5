//! Shared data types for the commerce and fulfillment connectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An order as reported by the commerce platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOrder {
    /// Stable identifier assigned by the commerce platform.
    pub id: String,

    /// Human-facing order number, used to locate the order downstream.
    pub order_number: String,

    /// Last modification timestamp on the source side.
    pub modified_at: DateTime<Utc>,

    /// Raw address validation status string, if the platform reported one.
    pub address_status: Option<String>,
}

/// One page of orders from the commerce platform.
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<SourceOrder>,
    pub current_page: u32,
    pub total_pages: u32,
}

impl OrderPage {
    /// Whether more pages follow this one.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.current_page < self.total_pages
    }
}

/// An order as known to the fulfillment service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationOrder {
    /// Internal identifier assigned by the fulfillment service.
    pub id: String,

    /// Order number, matching the commerce platform's `order_number`.
    pub order_number: String,
}

/// Numeric tag identifier on the fulfillment side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub i64);

impl std::fmt::Display for TagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
