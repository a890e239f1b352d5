//! Incremental order scan.
//!
//! Lazily pulls orders from the commerce platform one page at a time,
//! walking each configured status filter in turn. The caller drives the
//! scan with [`OrderScan::next`] so it can stop early on cancellation
//! without fetching pages it will never look at.

use chrono::{DateTime, Utc};
use tracing::debug;

use ordersync_connector::{SourceOrder, SourceOrders};

use crate::error::{SyncError, SyncResult};

/// Pull-based scan over orders modified since a watermark.
pub struct OrderScan<'a, S: SourceOrders> {
    source: &'a S,
    since: DateTime<Utc>,
    page_size: u32,

    /// Status filters still to walk. Empty means a single unfiltered scan.
    filters: Vec<Option<String>>,
    filter_index: usize,

    /// Buffered orders from the current page, consumed front to back.
    buffer: std::collections::VecDeque<SourceOrder>,

    /// Next page to request within the current filter; `None` when the
    /// current filter is exhausted.
    next_page: Option<u32>,
}

impl<'a, S: SourceOrders> OrderScan<'a, S> {
    /// Start a scan over orders modified at or after `since`.
    ///
    /// When `status_filters` is empty the scan runs once without a
    /// status restriction; otherwise the filters are walked sequentially.
    pub fn new(
        source: &'a S,
        since: DateTime<Utc>,
        status_filters: &[String],
        page_size: u32,
    ) -> Self {
        let filters: Vec<Option<String>> = if status_filters.is_empty() {
            vec![None]
        } else {
            status_filters.iter().cloned().map(Some).collect()
        };

        Self {
            source,
            since,
            page_size,
            filters,
            filter_index: 0,
            buffer: std::collections::VecDeque::new(),
            next_page: Some(1),
        }
    }

    /// Yield the next order, fetching a page when the buffer runs dry.
    ///
    /// Returns `Ok(None)` when every filter is exhausted. A fetch failure
    /// surfaces as [`SyncError::SourceUnavailable`] and poisons nothing;
    /// the caller is expected to abort the pass.
    pub async fn next(&mut self) -> SyncResult<Option<SourceOrder>> {
        loop {
            if let Some(order) = self.buffer.pop_front() {
                return Ok(Some(order));
            }

            let Some(page) = self.next_page else {
                // Current filter exhausted; move to the next one.
                self.filter_index += 1;
                if self.filter_index >= self.filters.len() {
                    return Ok(None);
                }
                self.next_page = Some(1);
                continue;
            };

            let filter = self.filters[self.filter_index].as_deref();
            let fetched = self
                .source
                .fetch_page(self.since, filter, page, self.page_size)
                .await
                .map_err(SyncError::SourceUnavailable)?;

            debug!(
                filter = filter.unwrap_or("<none>"),
                page = fetched.current_page,
                total_pages = fetched.total_pages,
                count = fetched.orders.len(),
                "Scanned order page"
            );

            self.next_page = if fetched.has_more() {
                Some(fetched.current_page + 1)
            } else {
                None
            };
            self.buffer.extend(fetched.orders);

            // An empty final page loops back around to the next filter.
        }
    }
}
