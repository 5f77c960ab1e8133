//! Metric registry, summary parsing and categorization.
//!
//! This module covers the engine-facing side of metrics:
//!
//! - `MetricKind` - The four metric families the engine can compute
//! - `MetricSummary` - Flat name/value mapping read from the engine's summary file
//! - `CategorizedResult` - The summary partitioned into fixed categories

mod categories;
mod registry;
mod summary;

pub use categories::{CategorizedResult, MetricCategory};
pub use registry::MetricKind;
pub use summary::{MetricSummary, MetricValue};
