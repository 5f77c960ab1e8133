//! Engine summary artifact parsing.
//!
//! The summary is a two-line text file: metric names on the first line and
//! the positionally aligned values on the second, both whitespace-delimited.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A summary value: numeric when it looks like an unsigned decimal, text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Coerce a raw value token.
    ///
    /// A token is numeric iff, after removing at most one `.`, it is a
    /// non-empty run of ASCII digits. Signs and exponents therefore stay text:
    /// `"-1.5"` and `"1e-3"` are returned as [`MetricValue::Text`].
    pub fn coerce(token: &str) -> Self {
        let stripped = token.replacen('.', "", 1);
        if !stripped.is_empty() && stripped.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = token.parse::<f64>() {
                return MetricValue::Number(value);
            }
        }
        MetricValue::Text(token.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{}", v),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Flat metric name to value mapping, in summary order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSummary {
    entries: Vec<(String, MetricValue)>,
}

impl MetricSummary {
    /// Parse summary text.
    ///
    /// Names and values are zipped; surplus tokens on either line are ignored.
    /// A repeated name keeps its first position and its last value.
    pub fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let names = lines.next().unwrap_or_default().split_whitespace();
        let values: Vec<&str> = lines.next().unwrap_or_default().split_whitespace().collect();

        let names: Vec<&str> = names.collect();
        if names.len() != values.len() {
            tracing::warn!(
                names = names.len(),
                values = values.len(),
                "summary name and value counts differ; extra tokens ignored"
            );
        }

        let mut summary = Self::default();
        for (name, value) in names.into_iter().zip(values) {
            summary.insert(name, MetricValue::coerce(value));
        }
        summary
    }

    /// Read and parse the summary artifact at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::SummaryNotFound(path.to_path_buf()))
            }
            Err(e) => Err(Error::IoError(io::Error::new(
                e.kind(),
                format!("failed to read summary '{}': {}", path.display(), e),
            ))),
        }
    }

    pub fn insert(&mut self, name: &str, value: MetricValue) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
