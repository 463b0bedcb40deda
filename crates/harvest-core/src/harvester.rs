use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::config::HarvestConfig;
use crate::error::AppError;
use crate::extract::CompiledSchema;
use crate::models::{FetchRequest, HarvestResult, PageTask, Record};
use crate::traits::Fetcher;

/// Events emitted by the harvester for monitoring/logging.
#[derive(Debug, Clone)]
pub enum HarvestEvent<'a> {
    Started {
        url: &'a str,
        pages: u32,
        worker_cap: usize,
    },
    PageDispatched {
        page: u32,
    },
    PageCompleted {
        page: u32,
        records: usize,
    },
    PageFailed {
        page: u32,
        error: &'a AppError,
    },
    /// A worker died without reporting its page.
    WorkerLost {
        error: &'a str,
    },
    Finished {
        records: usize,
        succeeded: u32,
        failed: u32,
    },
}

/// Trait for receiving harvest events (decoupled logging).
pub trait HarvestReporter: Send + Sync {
    fn report(&self, event: HarvestEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHarvestReporter;

impl HarvestReporter for TracingHarvestReporter {
    fn report(&self, event: HarvestEvent<'_>) {
        match event {
            HarvestEvent::Started {
                url,
                pages,
                worker_cap,
            } => {
                tracing::info!(%url, %pages, %worker_cap, "Harvest started");
            }
            HarvestEvent::PageDispatched { page } => {
                tracing::debug!(%page, "Page dispatched");
            }
            HarvestEvent::PageCompleted { page, records } => {
                tracing::debug!(%page, %records, "Page completed");
            }
            HarvestEvent::PageFailed { page, error } => {
                tracing::error!(%page, kind = %error.kind(), %error, "Page failed");
            }
            HarvestEvent::WorkerLost { error } => {
                tracing::error!(%error, "Error in parallel scraping");
            }
            HarvestEvent::Finished {
                records,
                succeeded,
                failed,
            } => {
                tracing::info!(%records, %succeeded, %failed, "Harvest finished");
            }
        }
    }
}

struct PageOutcome {
    page: u32,
    outcome: Result<Vec<Record>, AppError>,
}

/// Fans page fetch+extract tasks out over a bounded worker pool.
///
/// Failures are isolated per page: a failed page contributes no records and
/// never cancels its siblings. Records are aggregated in completion order by
/// a single collector; rows within one page keep document order.
pub struct Harvester<F, R = TracingHarvestReporter>
where
    F: Fetcher,
    R: HarvestReporter,
{
    fetcher: F,
    reporter: R,
    config: HarvestConfig,
}

impl<F: Fetcher> Harvester<F> {
    pub fn new(fetcher: F, config: HarvestConfig) -> Self {
        Self::with_reporter(fetcher, config, TracingHarvestReporter)
    }
}

impl<F, R> Harvester<F, R>
where
    F: Fetcher,
    R: HarvestReporter,
{
    pub fn with_reporter(fetcher: F, config: HarvestConfig, reporter: R) -> Self {
        Self {
            fetcher,
            reporter,
            config,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Harvest pages `1..=page_count` of `base_url` with `page_num`/`per_page`
    /// query parameters.
    pub async fn harvest(
        &self,
        base_url: &str,
        page_count: u32,
        schema: Arc<CompiledSchema>,
    ) -> HarvestResult {
        let tasks = PageTask::for_pages(base_url, page_count, self.config.page_size);
        self.harvest_tasks(base_url, tasks, schema).await
    }

    /// Run prepared page tasks. Returns once every task has settled.
    pub async fn harvest_tasks(
        &self,
        label: &str,
        tasks: Vec<PageTask>,
        schema: Arc<CompiledSchema>,
    ) -> HarvestResult {
        let worker_cap = self.config.worker_cap.max(1);
        let mut result = HarvestResult {
            pages_total: tasks.len() as u32,
            ..Default::default()
        };

        self.reporter.report(HarvestEvent::Started {
            url: label,
            pages: result.pages_total,
            worker_cap,
        });

        let semaphore = Arc::new(Semaphore::new(worker_cap));
        let (tx, mut rx) = mpsc::unbounded_channel::<PageOutcome>();
        let mut workers = JoinSet::new();

        for task in tasks {
            // Dispatch blocks here while `worker_cap` tasks are in flight.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            self.reporter
                .report(HarvestEvent::PageDispatched { page: task.page });

            let fetcher = self.fetcher.clone();
            let schema = Arc::clone(&schema);
            let tx = tx.clone();
            workers.spawn(async move {
                let _permit = permit;
                let outcome = fetch_and_extract(&fetcher, &task.request, &schema).await;
                let _ = tx.send(PageOutcome {
                    page: task.page,
                    outcome,
                });
            });
        }
        drop(tx);

        // Single writer: only this loop touches the aggregate.
        while let Some(PageOutcome { page, outcome }) = rx.recv().await {
            match outcome {
                Ok(records) => {
                    self.reporter.report(HarvestEvent::PageCompleted {
                        page,
                        records: records.len(),
                    });
                    result.pages_succeeded += 1;
                    result.records.extend(records);
                }
                Err(error) => {
                    self.reporter
                        .report(HarvestEvent::PageFailed { page, error: &error });
                    result.pages_failed += 1;
                }
            }
        }

        // Tasks that panicked outside extraction dropped their sender
        // without reporting; they surface here.
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                let error = e.to_string();
                self.reporter
                    .report(HarvestEvent::WorkerLost { error: &error });
                result.pages_failed += 1;
            }
        }

        self.reporter.report(HarvestEvent::Finished {
            records: result.records.len(),
            succeeded: result.pages_succeeded,
            failed: result.pages_failed,
        });

        result
    }
}

/// Fetch one page and extract its rows. The parsed document never lives
/// across an await point.
async fn fetch_and_extract<F: Fetcher>(
    fetcher: &F,
    request: &FetchRequest,
    schema: &CompiledSchema,
) -> Result<Vec<Record>, AppError> {
    let body = fetcher.fetch_body(request).await?;
    panic::catch_unwind(AssertUnwindSafe(|| schema.extract_body(&body))).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        AppError::ParseError(format!("Extraction aborted for {request}: {reason}"))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::coerce::Coercer;
    use crate::extract::{RecordSchema, SelectorSet};
    use crate::models::FieldValue;
    use crate::testutil::*;

    const BASE: &str = "https://example.com/pages/forms/";

    fn schema() -> Arc<CompiledSchema> {
        Arc::new(
            RecordSchema::new("items", SelectorSet::one("li.item"))
                .field("id", "span.id", Coercer::Integer)
                .compile()
                .unwrap(),
        )
    }

    fn page_url(page: u32) -> String {
        format!("{BASE}?page_num={page}&per_page=25")
    }

    /// Page `p` lists ids `p*100+1 ..= p*100+rows`.
    fn page_body(page: u32, rows: u32) -> String {
        let items: String = (1..=rows)
            .map(|i| format!("<li class=\"item\"><span class=\"id\">{}</span></li>", page * 100 + i))
            .collect();
        format!("<html><body><ul>{items}</ul></body></html>")
    }

    fn ids(result: &HarvestResult) -> Vec<i64> {
        result
            .records
            .iter()
            .filter_map(|r| r.get("id").and_then(FieldValue::as_i64))
            .collect()
    }

    #[tokio::test]
    async fn all_pages_succeed() {
        let mut fetcher = MockFetcher::new();
        for page in 1..=3 {
            fetcher = fetcher.on(&page_url(page), &page_body(page, 2));
        }
        let harvester = Harvester::new(fetcher.clone(), HarvestConfig::default());

        let result = harvester.harvest(BASE, 3, schema()).await;

        assert_eq!(result.pages_total, 3);
        assert_eq!(result.pages_succeeded, 3);
        assert!(!result.is_partial());
        let mut got = ids(&result);
        got.sort();
        assert_eq!(got, vec![101, 102, 201, 202, 301, 302]);
        assert_eq!(fetcher.requests().len(), 3);
    }

    #[tokio::test]
    async fn failed_page_is_isolated() {
        let mut fetcher = MockFetcher::new();
        for page in 1..=6 {
            fetcher = if page == 4 {
                fetcher.fail(&page_url(page), "connection reset")
            } else {
                fetcher.on(&page_url(page), &page_body(page, 3))
            };
        }
        let reporter = MockReporter::new();
        let events = Arc::clone(&reporter.events);
        let harvester =
            Harvester::with_reporter(fetcher, HarvestConfig::default(), reporter);

        let result = harvester.harvest(BASE, 6, schema()).await;

        assert_eq!(result.pages_succeeded, 5);
        assert_eq!(result.pages_failed, 1);
        assert!(result.is_partial());

        let got = ids(&result);
        let unique: HashSet<_> = got.iter().copied().collect();
        assert_eq!(got.len(), 15);
        assert_eq!(unique.len(), 15, "no duplicates");
        assert!(got.iter().all(|id| id / 100 != 4));

        let events = events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| *e == "PageFailed").count(), 1);
        assert_eq!(events.first().map(String::as_str), Some("Started"));
        assert_eq!(events.last().map(String::as_str), Some("Finished"));
    }

    #[tokio::test]
    async fn rows_within_a_page_keep_document_order() {
        let fetcher = MockFetcher::new()
            .on(&page_url(1), &page_body(1, 5))
            .on(&page_url(2), &page_body(2, 5));
        let harvester = Harvester::new(fetcher, HarvestConfig::default());

        let result = harvester.harvest(BASE, 2, schema()).await;
        let got = ids(&result);

        for page in [1, 2] {
            let page_ids: Vec<_> = got.iter().copied().filter(|id| id / 100 == page).collect();
            assert_eq!(page_ids, (1..=5).map(|i| page * 100 + i).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn bounded_concurrency_and_full_settlement() {
        let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(20));
        for page in 1..=12 {
            fetcher = fetcher.on(&page_url(page), &page_body(page, 1));
        }
        let reporter = MockReporter::new();
        let events = Arc::clone(&reporter.events);
        let harvester = Harvester::with_reporter(
            fetcher.clone(),
            HarvestConfig::default().with_worker_cap(5),
            reporter,
        );

        let result = harvester.harvest(BASE, 12, schema()).await;

        assert_eq!(fetcher.requests().len(), 12);
        assert_eq!(fetcher.in_flight(), 0, "all tasks settled before return");
        assert!(fetcher.max_in_flight() <= 5);
        assert!(fetcher.max_in_flight() >= 2, "pages actually ran in parallel");
        assert_eq!(result.pages_succeeded, 12);
        assert_eq!(result.records.len(), 12);

        let events = events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| *e == "PageDispatched").count(), 12);
        assert_eq!(events.iter().filter(|e| *e == "PageCompleted").count(), 12);
    }

    #[tokio::test]
    async fn worker_cap_of_one_is_sequential() {
        let mut fetcher = MockFetcher::new().with_delay(Duration::from_millis(5));
        for page in 1..=4 {
            fetcher = fetcher.on(&page_url(page), &page_body(page, 1));
        }
        let harvester =
            Harvester::new(fetcher.clone(), HarvestConfig::default().with_worker_cap(1));

        let result = harvester.harvest(BASE, 4, schema()).await;

        assert_eq!(fetcher.max_in_flight(), 1);
        assert_eq!(ids(&result), vec![101, 201, 301, 401]);
    }

    #[tokio::test]
    async fn panicking_worker_does_not_take_down_siblings() {
        let fetcher = MockFetcher::new()
            .on(&page_url(1), &page_body(1, 2))
            .panic_on(&page_url(2))
            .on(&page_url(3), &page_body(3, 2));
        let reporter = MockReporter::new();
        let events = Arc::clone(&reporter.events);
        let harvester =
            Harvester::with_reporter(fetcher, HarvestConfig::default(), reporter);

        let result = harvester.harvest(BASE, 3, schema()).await;

        let mut got = ids(&result);
        got.sort();
        assert_eq!(got, vec![101, 102, 301, 302]);
        assert_eq!(result.pages_succeeded, 2);
        assert_eq!(result.pages_failed, 1);
        assert!(events.lock().unwrap().iter().any(|e| e == "WorkerLost"));
    }

    #[tokio::test]
    async fn non_success_status_counts_as_failure() {
        let fetcher = MockFetcher::new()
            .on(&page_url(1), &page_body(1, 1))
            .on_status(&page_url(2), 503, "unavailable");
        let harvester = Harvester::new(fetcher, HarvestConfig::default());

        let result = harvester.harvest(BASE, 2, schema()).await;

        assert_eq!(ids(&result), vec![101]);
        assert_eq!(result.pages_failed, 1);
    }

    #[tokio::test]
    async fn zero_pages_is_empty() {
        let harvester = Harvester::new(MockFetcher::new(), HarvestConfig::default());
        let result = harvester.harvest(BASE, 0, schema()).await;
        assert_eq!(result, HarvestResult::default());
    }
}
