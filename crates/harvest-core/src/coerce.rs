//! Field coercion: extracted text into typed values.
//!
//! Absent input is never an error. Malformed input is an error in the
//! strict `parse_*` functions; the lenient `to_*` wrappers log it and
//! yield `None` so one bad cell never costs a whole record.

use scraper::ElementRef;
use url::Url;

use crate::error::AppError;
use crate::models::FieldValue;

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercer {
    Text,
    Integer,
    Float,
    /// The node's `href`, resolved against a base URL.
    Link(Url),
}

impl Coercer {
    /// Apply to the node located for `field` (if any).
    pub fn apply(&self, field: &str, node: Option<ElementRef<'_>>) -> FieldValue {
        match self {
            Coercer::Text => text_of(node).into(),
            Coercer::Integer => to_int(field, text_of(node).as_deref()).into(),
            Coercer::Float => to_float(field, text_of(node).as_deref()).into(),
            Coercer::Link(base) => {
                let href = node.and_then(|n| n.value().attr("href"));
                resolve_link(field, href, base).into()
            }
        }
    }
}

/// Full text content of a node, trimmed at both ends. Inline markup keeps
/// its surrounding spaces.
///
/// Returns `None` for an absent node or one with no visible text.
pub fn text_of(node: Option<ElementRef<'_>>) -> Option<String> {
    let text: String = node?.text().collect();
    let text = text.trim();
    if text.is_empty() { None } else { Some(text.to_string()) }
}

/// Strict integer parse. `None` and blank input give `Ok(None)`.
pub fn parse_int(text: Option<&str>) -> Result<Option<i64>, AppError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    text.parse::<i64>()
        .map(Some)
        .map_err(|e| AppError::CoercionError {
            value: text.to_string(),
            target: "integer",
            reason: e.to_string(),
        })
}

/// Strict float parse. `None` and blank input give `Ok(None)`.
pub fn parse_float(text: Option<&str>) -> Result<Option<f64>, AppError> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    text.parse::<f64>()
        .map(Some)
        .map_err(|e| AppError::CoercionError {
            value: text.to_string(),
            target: "float",
            reason: e.to_string(),
        })
}

pub fn to_int(field: &str, text: Option<&str>) -> Option<i64> {
    parse_int(text).unwrap_or_else(|e| {
        tracing::warn!(%field, error = %e, "Error converting to int");
        None
    })
}

pub fn to_float(field: &str, text: Option<&str>) -> Option<f64> {
    parse_float(text).unwrap_or_else(|e| {
        tracing::warn!(%field, error = %e, "Error converting to float");
        None
    })
}

/// Resolve an `href` into an absolute URL string.
pub fn resolve_link(field: &str, href: Option<&str>, base: &Url) -> Option<String> {
    let href = href.map(str::trim).filter(|h| !h.is_empty())?;
    match base.join(href) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!(%field, %href, error = %e, "Error resolving link");
            None
        }
    }
}
