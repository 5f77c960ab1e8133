//! Embedded TrackEval engine.
//!
//! Configuration layers are handed to Python as dictionaries built from
//! their serde representation, so keys and defaults stay in one place.
//! The dataset layer goes through [`DatasetAdapter::engine_config`] so
//! `SEQ_INFO` arrives as a `{sequence: length}` dict.
//!
//! [`DatasetAdapter::engine_config`]: super::DatasetAdapter::engine_config

use pyo3::prelude::*;
use pyo3::types::PyList;
use serde::Serialize;

use super::{EngineJob, EngineReport, EvaluationEngine};
use crate::{Error, Result};

/// Runs `trackeval.Evaluator` in-process through the embedded interpreter.
///
/// The `trackeval` package must be importable by the interpreter. Python
/// code cannot be interrupted, so cancellation and deadlines are only
/// honoured before the evaluation starts.
#[derive(Debug, Clone, Default)]
pub struct TrackEvalEngine;

impl TrackEvalEngine {
    pub fn new() -> Self {
        Self
    }
}

fn engine_error(err: PyErr) -> Error {
    Error::Engine(format!("trackeval: {}", err))
}

/// Serialize `value` to JSON and load it back as a Python object.
fn to_python<'py, T: Serialize>(json: &Bound<'py, PyModule>, value: &T) -> Result<Bound<'py, PyAny>> {
    let text = serde_json::to_string(value)
        .map_err(|e| Error::Engine(format!("failed to encode engine config: {}", e)))?;
    json.call_method1("loads", (text,)).map_err(engine_error)
}

impl EvaluationEngine for TrackEvalEngine {
    fn evaluate(&self, job: &EngineJob<'_>) -> Result<EngineReport> {
        if job.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if job.deadline.is_some_and(|d| std::time::Instant::now() >= d) {
            return Err(Error::Engine("engine deadline passed before start".to_string()));
        }

        Python::with_gil(|py| {
            let json = py.import_bound("json").map_err(engine_error)?;
            let trackeval = py.import_bound("trackeval").map_err(engine_error)?;

            let eval_config = to_python(&json, job.eval)?;
            let dataset_config = job
                .dataset
                .engine_config()
                .map_err(|e| Error::Engine(format!("failed to encode dataset config: {}", e)))?;
            let dataset_config = to_python(&json, &dataset_config)?;
            let metrics_config = to_python(&json, job.metrics)?;

            let evaluator = trackeval
                .getattr("Evaluator")
                .and_then(|cls| cls.call1((eval_config,)))
                .map_err(engine_error)?;
            let dataset = trackeval
                .getattr("datasets")
                .and_then(|m| m.getattr("MotChallenge2DBox"))
                .and_then(|cls| cls.call1((dataset_config,)))
                .map_err(engine_error)?;

            let metrics_module = trackeval.getattr("metrics").map_err(engine_error)?;
            let metrics = PyList::empty_bound(py);
            for kind in job.kinds {
                let metric = metrics_module
                    .getattr(kind.name())
                    .and_then(|cls| cls.call1((metrics_config.clone(),)))
                    .map_err(engine_error)?;
                metrics.append(metric).map_err(engine_error)?;
            }

            tracing::debug!(metrics = job.kinds.len(), "running trackeval evaluator");
            let datasets = PyList::new_bound(py, [dataset]);
            let output = evaluator
                .call_method1("evaluate", (datasets, metrics))
                .map_err(engine_error)?;

            // `evaluate` returns `(results, messages)`.
            let messages = output
                .get_item(1)
                .and_then(|m| m.str())
                .map(|s| vec![s.to_string()])
                .map_err(engine_error)?;
            Ok(EngineReport { messages })
        })
    }
}
