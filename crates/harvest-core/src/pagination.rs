use scraper::{Html, Selector};

use crate::error::AppError;
use crate::models::FetchRequest;
use crate::traits::Fetcher;

const PAGINATION_SELECTOR: &str = "ul.pagination";
const PAGE_LINK_SELECTOR: &str = "a";

/// Read the page count from a listing document.
///
/// No pagination control means a single page. Otherwise the label of the
/// second-to-last link is the last page number, since the control renders
/// `… N-1, N, next ›`.
pub fn page_count(document: &Html) -> Result<u32, AppError> {
    let pagination = parse_selector(PAGINATION_SELECTOR)?;
    let links = parse_selector(PAGE_LINK_SELECTOR)?;

    let Some(control) = document.select(&pagination).next() else {
        return Ok(1);
    };

    let labels: Vec<String> = control
        .select(&links)
        .map(|a| a.text().collect::<String>().trim().to_string())
        .collect();

    let label = labels
        .len()
        .checked_sub(2)
        .and_then(|i| labels.get(i))
        .ok_or_else(|| {
            AppError::ParseError(format!(
                "Pagination has {} link(s), need at least 2",
                labels.len()
            ))
        })?;

    match label.parse::<u32>() {
        Ok(0) => Err(AppError::ParseError("Pagination reports page 0".into())),
        Ok(n) => Ok(n),
        Err(e) => Err(AppError::ParseError(format!(
            "Pagination label {label:?} is not a page number: {e}"
        ))),
    }
}

/// Lenient form of [`page_count`]: any failure is logged and yields 1.
pub fn resolve_page_count(document: &Html) -> u32 {
    page_count(document).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Error resolving page count, assuming 1");
        1
    })
}

/// Fetch the unpaginated listing and resolve its page count.
///
/// Never fails: a fetch error falls back to a single page.
pub async fn fetch_page_count<F: Fetcher>(fetcher: &F, url: &str) -> u32 {
    let request = FetchRequest::new(url);
    match fetcher.fetch_body(&request).await {
        Ok(body) => resolve_page_count(&Html::parse_document(&body)),
        Err(e) => {
            tracing::error!(%url, error = %e, "Error fetching total pages");
            1
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::ParseError(format!("Invalid selector '{css}': {e}")))
}
