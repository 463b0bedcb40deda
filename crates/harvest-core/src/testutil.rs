//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::harvester::{HarvestEvent, HarvestReporter};
use crate::models::{CollectionTarget, FetchRequest, FetchResponse, Payload};
use crate::traits::{Fetcher, RecordSink};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Route {
    Respond(FetchResponse),
    Fail(String),
    Panic,
}

/// Mock fetcher with a response table keyed by the full request string
/// (`url?k=v&...`). Unknown requests fail with an HTTP error.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<FetchRequest>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `key` with status 200 and `body`.
    pub fn on(self, key: &str, body: &str) -> Self {
        self.route(key, Route::Respond(FetchResponse::ok(body)))
    }

    pub fn on_status(self, key: &str, status: u16, body: &str) -> Self {
        self.route(
            key,
            Route::Respond(FetchResponse {
                status,
                body: body.to_string(),
            }),
        )
    }

    /// Fail `key` with a network error.
    pub fn fail(self, key: &str, message: &str) -> Self {
        self.route(key, Route::Fail(message.to_string()))
    }

    /// Panic while serving `key`.
    pub fn panic_on(self, key: &str) -> Self {
        self.route(key, Route::Panic)
    }

    /// Hold every request for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn route(self, key: &str, route: Route) -> Self {
        self.routes.lock().unwrap().insert(key.to_string(), route);
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently outstanding requests observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, AppError> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = request.to_string();
        let route = self.routes.lock().unwrap().get(&key).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(message)) => Err(AppError::NetworkError(message)),
            Some(Route::Panic) => panic!("mock fetcher panicked on {key}"),
            None => Err(AppError::HttpError(format!("No mock response for {key}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Recorded insert: (target, payload).
pub type InsertRecord = (CollectionTarget, Payload);

/// Mock sink that records inserts and can be told to fail.
#[derive(Clone, Default)]
pub struct MockSink {
    pub inserts: Arc<Mutex<Vec<InsertRecord>>>,
    /// Error returned by the next insert (then cleared).
    insert_error: Arc<Mutex<Option<AppError>>>,
    /// Collections whose inserts always fail.
    failing: Arc<Mutex<Vec<String>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose first insert fails with `error`.
    pub fn with_insert_error(error: AppError) -> Self {
        let sink = Self::default();
        *sink.insert_error.lock().unwrap() = Some(error);
        sink
    }

    /// Sink that always rejects inserts into `collection`.
    pub fn failing_for(collection: &str) -> Self {
        let sink = Self::default();
        sink.failing.lock().unwrap().push(collection.to_string());
        sink
    }

    pub fn inserts(&self) -> Vec<InsertRecord> {
        self.inserts.lock().unwrap().clone()
    }
}

impl RecordSink for MockSink {
    async fn insert(&self, target: &CollectionTarget, payload: Payload) -> Result<u64, AppError> {
        if let Some(e) = self.insert_error.lock().unwrap().take() {
            return Err(e);
        }
        if self.failing.lock().unwrap().contains(&target.collection) {
            return Err(AppError::PersistenceError(format!(
                "collection {target} unavailable"
            )));
        }
        let count = payload.len() as u64;
        self.inserts.lock().unwrap().push((target.clone(), payload));
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock harvest reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HarvestReporter for MockReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        let label = match &event {
            HarvestEvent::Started { .. } => "Started",
            HarvestEvent::PageDispatched { .. } => "PageDispatched",
            HarvestEvent::PageCompleted { .. } => "PageCompleted",
            HarvestEvent::PageFailed { .. } => "PageFailed",
            HarvestEvent::WorkerLost { .. } => "WorkerLost",
            HarvestEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
