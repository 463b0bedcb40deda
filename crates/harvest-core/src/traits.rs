use std::future::Future;

use crate::error::AppError;
use crate::models::{CollectionTarget, FetchOutcome, FetchRequest, FetchResponse, Payload};

/// Issues GET requests with query parameters under a fixed timeout.
pub trait Fetcher: Send + Sync + Clone + 'static {
    /// Returns the status and body, or a transport-level error.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, AppError>> + Send;

    /// Fetch and treat any non-2xx status as a transport failure.
    fn fetch_body(&self, request: &FetchRequest) -> impl Future<Output = FetchOutcome> + Send {
        async move { self.fetch(request).await?.into_outcome(request) }
    }
}

/// Append-only persistence addressed by `(store, collection)`.
pub trait RecordSink: Send + Sync + Clone {
    /// Insert a payload. Returns the number of documents written.
    fn insert(
        &self,
        target: &CollectionTarget,
        payload: Payload,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// A no-op RecordSink for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullSink;

impl RecordSink for NullSink {
    async fn insert(&self, _target: &CollectionTarget, payload: Payload) -> Result<u64, AppError> {
        Ok(payload.len() as u64)
    }
}
