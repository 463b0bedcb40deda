use std::time::Instant;

use crate::models::{CollectionTarget, RunSummary};
use crate::sources::{AjaxYearSource, Source, discover_years};
use crate::traits::{Fetcher, RecordSink};

/// Binds a source's output to a persistence target: collect → insert.
///
/// Holds nothing but the injected sink handle; runs are independent, and a
/// failed insert is logged without affecting later runs.
pub struct Pipeline<S>
where
    S: RecordSink,
{
    sink: S,
}

impl<S> Pipeline<S>
where
    S: RecordSink,
{
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run one source into one collection.
    ///
    /// 1. Collect the payload (the source recovers its own failures)
    /// 2. Hand it to the sink once, after collection has settled
    /// 3. Log and swallow a sink failure
    pub async fn run<Src: Source>(&self, source: &Src, target: &CollectionTarget) -> RunSummary {
        let started = Instant::now();
        tracing::info!(source = %source.describe(), %target, "Running pipeline");

        let payload = source.collect().await;
        let documents = payload.len();

        let inserted = match self.sink.insert(target, payload).await {
            Ok(count) => {
                tracing::info!(%target, %count, "Data saved");
                Some(count)
            }
            Err(e) => {
                tracing::error!(%target, kind = %e.kind(), error = %e, "Error saving data");
                None
            }
        };

        RunSummary {
            target: target.clone(),
            documents,
            inserted,
            elapsed: started.elapsed(),
        }
    }

    /// Discover the year links on an AJAX listing and run one pipeline per
    /// year, each into collection `<year>` of `store`.
    pub async fn run_yearly<F: Fetcher>(
        &self,
        fetcher: &F,
        url: &str,
        store: &str,
    ) -> Vec<RunSummary> {
        let years = discover_years(fetcher, url).await;
        tracing::info!(%url, years = years.len(), "Discovered year collections");

        let mut summaries = Vec::with_capacity(years.len());
        for year in years {
            let target = CollectionTarget::new(store, year.as_str());
            let source = AjaxYearSource::new(fetcher.clone(), url, year);
            summaries.push(self.run(&source, &target).await);
        }
        summaries
    }
}
