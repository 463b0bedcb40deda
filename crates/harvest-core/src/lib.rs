pub mod coerce;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvester;
pub mod memory;
pub mod models;
pub mod pagination;
pub mod pipeline;
pub mod sources;
pub mod testutil;
pub mod traits;

pub use config::HarvestConfig;
pub use error::{AppError, ErrorKind};
pub use extract::{CompiledSchema, Locator, RecordSchema, SelectorSet};
pub use harvester::{HarvestReporter, Harvester, TracingHarvestReporter};
pub use memory::MemorySink;
pub use models::{CollectionTarget, FetchRequest, FetchResponse, FieldValue, Payload, Record};
pub use pipeline::Pipeline;
pub use sources::{AjaxYearSource, HeadingListSource, PaginatedTableSource, Source};
pub use traits::{Fetcher, NullSink, RecordSink};
