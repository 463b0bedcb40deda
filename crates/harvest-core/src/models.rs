use std::fmt;
use std::time::Duration;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use url::Url;

use crate::error::AppError;

/// A typed field value extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Integer(v) => serde_json::Value::from(*v),
            // Non-finite floats have no JSON representation.
            FieldValue::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Text(v) => serde_json::Value::String(v.clone()),
        }
    }
}

impl From<Option<i64>> for FieldValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Integer)
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Float)
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Text)
    }
}

/// One harvested entity: an ordered mapping from field name to value.
///
/// Every field declared by the schema that produced the record is present,
/// null or not.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field, replacing an existing value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// What a source hands to the persistence sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single structured document.
    One(serde_json::Value),
    /// A list of documents, inserted in order.
    Many(Vec<serde_json::Value>),
    /// The source produced nothing (e.g. a failed AJAX fetch).
    Null,
}

impl Payload {
    pub fn from_records(records: &[Record]) -> Self {
        Payload::Many(records.iter().map(Record::to_json).collect())
    }

    /// Wrap an already-structured response: arrays become `Many`, `null`
    /// stays `Null`, anything else is a single document.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Payload::Null,
            serde_json::Value::Array(items) => Payload::Many(items),
            other => Payload::One(other),
        }
    }

    /// Number of documents the payload would insert.
    pub fn len(&self) -> usize {
        match self {
            Payload::One(_) => 1,
            Payload::Many(items) => items.len(),
            Payload::Null => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    /// Flatten into the documents to insert.
    pub fn into_documents(self) -> Vec<serde_json::Value> {
        match self {
            Payload::One(value) => vec![value],
            Payload::Many(items) => items,
            Payload::Null => Vec::new(),
        }
    }
}

/// Persistence destination: a named collection inside a named store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionTarget {
    pub store: String,
    pub collection: String,
}

impl CollectionTarget {
    pub fn new(store: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.store, self.collection)
    }
}

/// A GET request: base URL plus query parameters, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Resolve into a full URL with the query parameters appended.
    pub fn to_url(&self) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| AppError::HttpError(format!("Invalid URL {}: {e}", self.url)))?;
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.params);
        }
        Ok(url)
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(url) = self.to_url() {
            return write!(f, "{url}");
        }
        write!(f, "{}", self.url)?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

/// Raw transport response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into a transport error.
    pub fn into_outcome(self, request: &FetchRequest) -> FetchOutcome {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                self.status, request
            )))
        }
    }
}

/// Result of one fetch as seen by the worker that issued it: the document
/// body, or the cause of failure.
pub type FetchOutcome = Result<String, AppError>;

/// One page of a paginated listing, created before dispatch and consumed
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTask {
    pub page: u32,
    pub request: FetchRequest,
}

impl PageTask {
    /// Build tasks for pages `1..=page_count` of `base_url`.
    pub fn for_pages(base_url: &str, page_count: u32, page_size: u32) -> Vec<PageTask> {
        (1..=page_count)
            .map(|page| PageTask {
                page,
                request: FetchRequest::new(base_url)
                    .with_param("page_num", page.to_string())
                    .with_param("per_page", page_size.to_string()),
            })
            .collect()
    }
}

/// Aggregate of all records extracted across a set of page tasks, in
/// completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestResult {
    pub records: Vec<Record>,
    pub pages_total: u32,
    pub pages_succeeded: u32,
    pub pages_failed: u32,
}

impl HarvestResult {
    pub fn is_partial(&self) -> bool {
        self.pages_failed > 0
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub target: CollectionTarget,
    /// Documents handed to the sink.
    pub documents: usize,
    /// Documents the sink reported as written, if it accepted the payload.
    pub inserted: Option<u64>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn persisted(&self) -> bool {
        self.inserted.is_some()
    }
}
