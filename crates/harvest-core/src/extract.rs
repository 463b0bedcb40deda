//! Declarative record extraction.
//!
//! A [`RecordSchema`] is plain data: a row selector plus named fields, each
//! with a locator and a coercer. It is compiled once into CSS selectors and
//! then applied to any number of documents.

use scraper::{ElementRef, Html, Selector};

use crate::coerce::Coercer;
use crate::error::AppError;
use crate::models::Record;

/// A set of alternative CSS selectors; a node matching any of them matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet(Vec<String>);

impl SelectorSet {
    pub fn one(css: impl Into<String>) -> Self {
        Self(vec![css.into()])
    }

    pub fn any_of<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(alternatives.into_iter().map(Into::into).collect())
    }

    fn compile(&self) -> Result<Selector, AppError> {
        if self.0.is_empty() {
            return Err(AppError::ParseError("Empty selector set".into()));
        }
        let group = self.0.join(", ");
        Selector::parse(&group)
            .map_err(|e| AppError::ParseError(format!("Invalid selector '{group}': {e}")))
    }
}

/// Where a field's node is found relative to its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// First descendant of the row matching the set.
    Within(SelectorSet),
    /// The row's immediately following sibling element, if it matches.
    NextSibling(SelectorSet),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub locator: Locator,
    pub coercer: Coercer,
}

/// Immutable description of the records a page yields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub rows: SelectorSet,
    pub fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, rows: SelectorSet) -> Self {
        Self {
            name: name.into(),
            rows,
            fields: Vec::new(),
        }
    }

    /// Add a field located by a descendant selector.
    pub fn field(self, name: impl Into<String>, css: impl Into<String>, coercer: Coercer) -> Self {
        self.field_at(name, Locator::Within(SelectorSet::one(css)), coercer)
    }

    pub fn field_at(mut self, name: impl Into<String>, locator: Locator, coercer: Coercer) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            locator,
            coercer,
        });
        self
    }

    pub fn compile(&self) -> Result<CompiledSchema, AppError> {
        let fields = self
            .fields
            .iter()
            .map(|spec| {
                let locator = match &spec.locator {
                    Locator::Within(set) => CompiledLocator::Within(set.compile()?),
                    Locator::NextSibling(set) => CompiledLocator::NextSibling(set.compile()?),
                };
                Ok(CompiledField {
                    name: spec.name.clone(),
                    locator,
                    coercer: spec.coercer.clone(),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(CompiledSchema {
            name: self.name.clone(),
            rows: self.rows.compile()?,
            fields,
        })
    }
}

enum CompiledLocator {
    Within(Selector),
    NextSibling(Selector),
}

impl CompiledLocator {
    fn locate<'a>(&self, row: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match self {
            CompiledLocator::Within(selector) => row.select(selector).next(),
            CompiledLocator::NextSibling(selector) => row
                .next_siblings()
                .find_map(ElementRef::wrap)
                .filter(|sibling| selector.matches(sibling)),
        }
    }
}

struct CompiledField {
    name: String,
    locator: CompiledLocator,
    coercer: Coercer,
}

/// A schema with its selectors parsed, ready to apply.
pub struct CompiledSchema {
    name: String,
    rows: Selector,
    fields: Vec<CompiledField>,
}

impl CompiledSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// One record per matching row, in document order.
    pub fn extract(&self, document: &Html) -> Vec<Record> {
        document
            .select(&self.rows)
            .map(|row| self.extract_row(row))
            .collect()
    }

    /// Parse a markup body and extract from it.
    pub fn extract_body(&self, body: &str) -> Vec<Record> {
        self.extract(&Html::parse_document(body))
    }

    fn extract_row(&self, row: ElementRef<'_>) -> Record {
        let mut record = Record::with_capacity(self.fields.len());
        for field in &self.fields {
            let node = field.locator.locate(row);
            record.insert(field.name.clone(), field.coercer.apply(&field.name, node));
        }
        record
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .field("fields", &self.field_names().collect::<Vec<_>>())
            .finish()
    }
}
