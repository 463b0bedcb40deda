use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_WORKER_CAP: usize = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = "Harvest/0.1 (record harvester)";

/// Tunables for fetching and the page worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Maximum page tasks in flight at once.
    pub worker_cap: usize,
    /// `per_page` query value for paginated listings.
    pub page_size: u32,
    pub fetch_timeout: Duration,
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            worker_cap: DEFAULT_WORKER_CAP,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HarvestConfig {
    /// Read configuration from environment variables.
    ///
    /// - `HARVEST_WORKERS` (optional, defaults to 5)
    /// - `HARVEST_PAGE_SIZE` (optional, defaults to 25)
    /// - `HARVEST_TIMEOUT_SECS` (optional, defaults to 10)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let worker_cap = positive(&lookup, "HARVEST_WORKERS")?.unwrap_or(defaults.worker_cap as u64);
        let page_size = positive(&lookup, "HARVEST_PAGE_SIZE")?.unwrap_or(defaults.page_size as u64);
        let timeout_secs = positive(&lookup, "HARVEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.fetch_timeout.as_secs());

        Ok(Self {
            worker_cap: usize::try_from(worker_cap)
                .map_err(|_| AppError::ConfigError("HARVEST_WORKERS is too large".into()))?,
            page_size: u32::try_from(page_size)
                .map_err(|_| AppError::ConfigError("HARVEST_PAGE_SIZE is too large".into()))?,
            fetch_timeout: Duration::from_secs(timeout_secs),
            user_agent: defaults.user_agent,
        })
    }

    pub fn with_worker_cap(mut self, worker_cap: usize) -> Self {
        self.worker_cap = worker_cap.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>, AppError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(AppError::ConfigError(format!("{key} must be at least 1"))),
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a positive integer"
        ))),
    }
}
