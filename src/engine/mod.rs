//! External evaluation engine contract.
//!
//! The engine owns the metric mathematics. It is handed a dataset adapter
//! (where ground truth and tracker results live, and which of them to
//! evaluate) plus the metric families to compute, and writes a two-line
//! summary artifact into the tracker's output directory as a side effect.

mod command;
#[cfg(feature = "python")]
mod python;

pub use command::CommandEngine;
#[cfg(feature = "python")]
pub use python::TrackEvalEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{DatasetConfig, EvalConfig, MetricsConfig};
use crate::metrics::MetricKind;
use crate::pipeline::CancelFlag;
use crate::Result;

/// Dataset selection handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAdapter {
    config: DatasetConfig,
}

impl DatasetAdapter {
    /// Adapter over `gt_folder`/`trackers_folder` for the given benchmark split,
    /// sequences and trackers. Other dataset settings keep their defaults.
    pub fn new(
        gt_folder: impl Into<PathBuf>,
        trackers_folder: impl Into<PathBuf>,
        benchmark: impl Into<String>,
        split: impl Into<String>,
        sequences: Vec<String>,
        trackers: Vec<String>,
    ) -> Self {
        Self::from_config(DatasetConfig {
            gt_folder: gt_folder.into(),
            trackers_folder: trackers_folder.into(),
            benchmark: benchmark.into(),
            split_to_eval: split.into(),
            seq_info: Some(sequences),
            trackers_to_eval: Some(trackers),
            ..DatasetConfig::default()
        })
    }

    pub fn from_config(config: DatasetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn gt_folder(&self) -> &Path {
        &self.config.gt_folder
    }

    pub fn trackers_folder(&self) -> &Path {
        &self.config.trackers_folder
    }

    pub fn benchmark(&self) -> &str {
        &self.config.benchmark
    }

    pub fn split(&self) -> &str {
        &self.config.split_to_eval
    }

    pub fn sequences(&self) -> &[String] {
        self.config.seq_info.as_deref().unwrap_or_default()
    }

    pub fn trackers(&self) -> &[String] {
        self.config.trackers_to_eval.as_deref().unwrap_or_default()
    }

    /// Dataset configuration in the shape TrackEval expects in-process.
    ///
    /// `SEQ_INFO` maps each sequence name to its length; `null` lengths are
    /// read from the sequence's `seqinfo.ini`.
    pub fn engine_config(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(&self.config)?;
        if let Some(serde_json::Value::Array(names)) = value.get("SEQ_INFO") {
            let lengths: serde_json::Map<String, serde_json::Value> = names
                .iter()
                .filter_map(|name| name.as_str())
                .map(|name| (name.to_string(), serde_json::Value::Null))
                .collect();
            value["SEQ_INFO"] = serde_json::Value::Object(lengths);
        }
        Ok(value)
    }

    /// Summary artifact the engine declares for `tracker`.
    pub fn summary_path(&self, tracker: &str) -> PathBuf {
        self.config
            .output_dir(tracker)
            .join(self.config.summary_file_name())
    }
}

/// One engine invocation.
pub struct EngineJob<'a> {
    pub eval: &'a EvalConfig,
    pub dataset: &'a DatasetAdapter,
    pub metrics: &'a MetricsConfig,
    /// Resolved metric families; never empty.
    pub kinds: &'a [MetricKind],
    pub cancel: &'a CancelFlag,
    pub deadline: Option<Instant>,
}

/// What the engine reports back besides the summary artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReport {
    /// Human-readable output lines.
    pub messages: Vec<String>,
}

/// An evaluation engine.
///
/// Implementations block until the evaluation finished. They should honour
/// `job.cancel` and `job.deadline` where they can.
pub trait EvaluationEngine: Send + Sync {
    fn evaluate(&self, job: &EngineJob<'_>) -> Result<EngineReport>;
}

impl<E: EvaluationEngine + ?Sized> EvaluationEngine for Arc<E> {
    fn evaluate(&self, job: &EngineJob<'_>) -> Result<EngineReport> {
        (**self).evaluate(job)
    }
}

impl<E: EvaluationEngine + ?Sized> EvaluationEngine for &E {
    fn evaluate(&self, job: &EngineJob<'_>) -> Result<EngineReport> {
        (**self).evaluate(job)
    }
}
