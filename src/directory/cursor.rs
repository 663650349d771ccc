//! Lazy, cancellable traversal over `@odata.nextLink` pagination.

use serde_json::Value;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::DirectoryClient;
use crate::error::DirectoryError;

/// Turns a raw page item into a surfaced item, or `None` to skip it.
pub type Decoder<T> = fn(Value) -> Result<Option<T>, DirectoryError>;

/// Cursor over a paginated collection.
///
/// A page is only requested when the buffered items of the previous one are
/// exhausted and [`next`](Self::next) is called again, so a consumer that stops
/// calling `next` never causes another request. Each next link is fetched at
/// most once.
pub struct PageCursor<'a, T> {
    client: &'a DirectoryClient,
    resource: String,
    next_url: Option<String>,
    eventual_consistency: bool,
    buffer: VecDeque<Value>,
    decode: Decoder<T>,
    pages_fetched: usize,
    total_count: Option<u64>,
}

impl<'a, T> PageCursor<'a, T> {
    pub(crate) fn new(
        client: &'a DirectoryClient,
        resource: String,
        first_url: String,
        eventual_consistency: bool,
        decode: Decoder<T>,
    ) -> Self {
        Self {
            client,
            resource,
            next_url: Some(first_url),
            eventual_consistency,
            buffer: VecDeque::new(),
            decode,
            pages_fetched: 0,
            total_count: None,
        }
    }

    /// Yield the next item, fetching the next page if the buffer is empty.
    ///
    /// Returns `Ok(None)` once the last page is drained. Cancellation aborts an
    /// in-flight request with [`DirectoryError::Cancelled`].
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<T>, DirectoryError> {
        loop {
            if cancel.is_cancelled() {
                return Err(DirectoryError::Cancelled);
            }

            while let Some(raw) = self.buffer.pop_front() {
                if let Some(item) = (self.decode)(raw)? {
                    return Ok(Some(item));
                }
            }

            let Some(url) = self.next_url.take() else {
                return Ok(None);
            };

            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DirectoryError::Cancelled),
                page = self.client.fetch_page(&url, self.eventual_consistency, &self.resource) => page?,
            };

            self.pages_fetched += 1;
            if self.total_count.is_none() {
                self.total_count = page.count;
            }
            debug!(
                resource = %self.resource,
                page = self.pages_fetched,
                items = page.value.len(),
                more = page.next_link.is_some(),
                "Fetched directory page"
            );

            self.next_url = page.next_link;
            self.buffer.extend(page.value);
        }
    }

    /// Number of pages requested so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// `@odata.count` of the first page, when the server returned one.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }
}
