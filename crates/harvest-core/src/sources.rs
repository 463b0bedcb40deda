//! Source adapters: each turns its arguments into a [`Payload`].
//!
//! Every adapter is best-effort. Failures are logged at the point they are
//! recovered and surface as an empty or null payload, never as an error.

use std::future::Future;
use std::sync::Arc;

use scraper::{Html, Selector};
use url::Url;

use crate::coerce::Coercer;
use crate::error::AppError;
use crate::extract::{CompiledSchema, Locator, RecordSchema, SelectorSet};
use crate::harvester::{HarvestReporter, Harvester};
use crate::models::{FetchRequest, Payload};
use crate::pagination::fetch_page_count;
use crate::traits::Fetcher;

/// Produces the payload for one pipeline run.
pub trait Source: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    fn collect(&self) -> impl Future<Output = Payload> + Send;
}

// ---------------------------------------------------------------------------
// AJAX, one structured fetch per year
// ---------------------------------------------------------------------------

const YEAR_LINK_SELECTOR: &str = "a.year-link";

/// Scan a listing page for year links and return their labels.
///
/// A fetch failure yields no years.
pub async fn discover_years<F: Fetcher>(fetcher: &F, url: &str) -> Vec<String> {
    match fetch_years(fetcher, url).await {
        Ok(years) => years,
        Err(e) => {
            tracing::error!(%url, error = %e, "Error fetching collections");
            Vec::new()
        }
    }
}

async fn fetch_years<F: Fetcher>(fetcher: &F, url: &str) -> Result<Vec<String>, AppError> {
    let body = fetcher.fetch_body(&FetchRequest::new(url)).await?;
    year_links(&body)
}

fn year_links(body: &str) -> Result<Vec<String>, AppError> {
    let selector = Selector::parse(YEAR_LINK_SELECTOR)
        .map_err(|e| AppError::ParseError(format!("Invalid selector: {e}")))?;
    let document = Html::parse_document(body);
    Ok(document
        .select(&selector)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|label| !label.is_empty())
        .collect())
}

/// Fetch the structured listing for one year (`ajax=true&year=<Y>`).
pub async fn fetch_year<F: Fetcher>(
    fetcher: &F,
    url: &str,
    year: &str,
) -> Result<serde_json::Value, AppError> {
    let request = FetchRequest::new(url)
        .with_param("ajax", "true")
        .with_param("year", year);
    let body = fetcher.fetch_body(&request).await?;
    Ok(serde_json::from_str(&body)?)
}

/// One year of an AJAX-backed listing; the response is kept as returned.
#[derive(Debug, Clone)]
pub struct AjaxYearSource<F: Fetcher> {
    fetcher: F,
    url: String,
    year: String,
}

impl<F: Fetcher> AjaxYearSource<F> {
    pub fn new(fetcher: F, url: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: url.into(),
            year: year.into(),
        }
    }
}

impl<F: Fetcher> Source for AjaxYearSource<F> {
    fn describe(&self) -> String {
        format!("ajax {} year={}", self.url, self.year)
    }

    async fn collect(&self) -> Payload {
        match fetch_year(&self.fetcher, &self.url, &self.year).await {
            Ok(value) => Payload::from_json(value),
            Err(e) => {
                tracing::error!(
                    url = %self.url,
                    year = %self.year,
                    kind = %e.kind(),
                    error = %e,
                    "Error fetching ajax data"
                );
                Payload::Null
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Paginated table
// ---------------------------------------------------------------------------

/// Schema for one `tr.team` row of the hockey standings table.
pub fn team_schema() -> RecordSchema {
    RecordSchema::new("team", SelectorSet::one("tr.team"))
        .field("name", "td.name", Coercer::Text)
        .field("year", "td.year", Coercer::Integer)
        .field("wins", "td.wins", Coercer::Integer)
        .field("losses", "td.losses", Coercer::Integer)
        .field("ot_losses", "td.ot-losses", Coercer::Integer)
        .field("win_percentage", "td.pct", Coercer::Float)
        .field("goals_for", "td.gf", Coercer::Integer)
        .field("goals_against", "td.ga", Coercer::Integer)
        .field_at(
            "plus_minus",
            Locator::Within(SelectorSet::any_of([
                "td.diff.text-success",
                "td.diff.text-danger",
            ])),
            Coercer::Integer,
        )
}

/// A paginated HTML table: page count first, then every page in parallel.
pub struct PaginatedTableSource<F, R>
where
    F: Fetcher,
    R: HarvestReporter,
{
    harvester: Harvester<F, R>,
    base_url: String,
    schema: Arc<CompiledSchema>,
}

impl<F, R> PaginatedTableSource<F, R>
where
    F: Fetcher,
    R: HarvestReporter,
{
    pub fn new(
        harvester: Harvester<F, R>,
        base_url: impl Into<String>,
        schema: &RecordSchema,
    ) -> Result<Self, AppError> {
        Ok(Self {
            harvester,
            base_url: base_url.into(),
            schema: Arc::new(schema.compile()?),
        })
    }

    /// The hockey teams table.
    pub fn teams(harvester: Harvester<F, R>, base_url: impl Into<String>) -> Result<Self, AppError> {
        Self::new(harvester, base_url, &team_schema())
    }
}

impl<F, R> Source for PaginatedTableSource<F, R>
where
    F: Fetcher,
    R: HarvestReporter,
{
    fn describe(&self) -> String {
        format!("table {} ({})", self.base_url, self.schema.name())
    }

    async fn collect(&self) -> Payload {
        let pages = fetch_page_count(self.harvester.fetcher(), &self.base_url).await;
        let result = self
            .harvester
            .harvest(&self.base_url, pages, Arc::clone(&self.schema))
            .await;
        if result.is_partial() {
            tracing::warn!(
                url = %self.base_url,
                failed = result.pages_failed,
                total = result.pages_total,
                "Harvest is partial"
            );
        }
        Payload::from_records(&result.records)
    }
}

// ---------------------------------------------------------------------------
// Heading + paragraph list
// ---------------------------------------------------------------------------

pub const SITE_ORIGIN: &str = "https://www.scrapethissite.com";

/// Schema for `h4` topic headings: the nested link gives the label and
/// target, the following paragraph gives the description.
pub fn topic_schema(origin: Url) -> RecordSchema {
    RecordSchema::new("topic", SelectorSet::one("h4"))
        .field("topic", "a", Coercer::Text)
        .field("link", "a", Coercer::Link(origin))
        .field_at(
            "paragraph",
            Locator::NextSibling(SelectorSet::one("p")),
            Coercer::Text,
        )
}

/// A single page of headings, each optionally followed by a paragraph.
#[derive(Debug)]
pub struct HeadingListSource<F: Fetcher> {
    fetcher: F,
    url: String,
    schema: CompiledSchema,
}

impl<F: Fetcher> HeadingListSource<F> {
    pub fn new(fetcher: F, url: impl Into<String>, origin: &str) -> Result<Self, AppError> {
        let origin = Url::parse(origin)
            .map_err(|e| AppError::ConfigError(format!("Invalid site origin {origin}: {e}")))?;
        Ok(Self {
            fetcher,
            url: url.into(),
            schema: topic_schema(origin).compile()?,
        })
    }
}

impl<F: Fetcher> Source for HeadingListSource<F> {
    fn describe(&self) -> String {
        format!("headings {}", self.url)
    }

    async fn collect(&self) -> Payload {
        match self.fetcher.fetch_body(&FetchRequest::new(&self.url)).await {
            Ok(body) => Payload::from_records(&self.schema.extract_body(&body)),
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Error fetching advanced topics");
                Payload::Many(Vec::new())
            }
        }
    }
}
