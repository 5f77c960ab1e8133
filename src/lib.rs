//! # frame-window-eval
//!
//! Scoped evaluation of multi-object tracking results against MOTChallenge
//! ground truth, restricted to an inclusive window of frames.
//!
//! Every request works on its own sandbox: a uniquely named copy of the
//! ground-truth sequence directory and of the tracker directory. The copies
//! are filtered down to the requested frames, handed to an external
//! evaluation engine, and removed again before the request returns. The
//! source datasets are never written.
//!
//! ## Features
//!
//! - Typed, layered configuration with per-key ownership
//! - Streaming, atomic frame filtering of MOT record files
//! - Pluggable evaluation engines (subprocess, embedded TrackEval)
//! - Summary parsing into HOTA / CLEAR / Identity / VACE / COUNT buckets
//! - Worker service with cancellation, deadlines and optional pair locking
//!
//! ## Example
//!
//! ```rust,ignore
//! use frame_window_eval::{
//!     evaluate_window, CommandEngine, ConfigLayers, EvaluationRequest, FrameWindow,
//!     RequestContext,
//! };
//!
//! let request = EvaluationRequest::new("MOT16-02", "MPNTrack", FrameWindow::new(10, 20)?)
//!     .with_benchmark("MOT16");
//! let engine = CommandEngine::new("python3").arg("scripts/run_mot_challenge.py");
//! let result = evaluate_window(&request, &ConfigLayers::default(), &engine, &RequestContext::new())?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

pub mod config;
pub mod engine;
pub mod filter;
pub mod invoker;
pub mod metrics;
pub mod observer;
pub mod pipeline;
pub mod sandbox;
pub mod service;

// Re-exports for convenience
pub use config::{ConfigLayers, DatasetConfig, EvalConfig, MetricsConfig, Overrides, ResolvedConfig};
pub use engine::{CommandEngine, DatasetAdapter, EngineJob, EngineReport, EvaluationEngine};
pub use filter::{filter_frames, FilterStats, FrameWindow, SequenceInfoFile};
pub use metrics::{CategorizedResult, MetricCategory, MetricKind, MetricSummary, MetricValue};
pub use observer::{EvaluationObserver, NoopObserver, TracingObserver};
pub use pipeline::{evaluate_window, CancelFlag, EvaluationRequest, RequestContext};
pub use sandbox::{Sandbox, SandboxBuilder, SandboxToken};
pub use service::{EvaluationHandle, EvaluationService, PairLocks};

#[cfg(feature = "python")]
pub use engine::TrackEvalEngine;

// Error types
pub use crate::error::{Error, ErrorKind, Result};

mod error {
    use std::path::PathBuf;
    use thiserror::Error;

    /// Errors that can occur while evaluating a frame window
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        Config(String),

        #[error("Missing {what} source directory: {}", path.display())]
        MissingSource { what: &'static str, path: PathBuf },

        #[error("Frame filter failed on {}: {reason}", path.display())]
        FilterIo { path: PathBuf, reason: String },

        #[error("Evaluation engine error: {0}")]
        Engine(String),

        #[error("Summary artifact not found: {}", .0.display())]
        SummaryNotFound(PathBuf),

        #[error("Failed to reclaim {}: {source}", path.display())]
        Cleanup {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },

        #[error("Evaluation cancelled")]
        Cancelled,

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Coarse classification of [`Error`], stable across message changes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ErrorKind {
        Config,
        MissingSource,
        FilterIo,
        Engine,
        SummaryNotFound,
        Cleanup,
        Cancelled,
        Io,
    }

    impl Error {
        pub fn kind(&self) -> ErrorKind {
            match self {
                Error::Config(_) => ErrorKind::Config,
                Error::MissingSource { .. } => ErrorKind::MissingSource,
                Error::FilterIo { .. } => ErrorKind::FilterIo,
                Error::Engine(_) => ErrorKind::Engine,
                Error::SummaryNotFound(_) => ErrorKind::SummaryNotFound,
                Error::Cleanup { .. } => ErrorKind::Cleanup,
                Error::Cancelled => ErrorKind::Cancelled,
                Error::IoError(_) => ErrorKind::Io,
            }
        }

        pub(crate) fn filter_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
            Error::FilterIo {
                path: path.into(),
                reason: reason.to_string(),
            }
        }
    }

    /// Result type for frame-window evaluation
    pub type Result<T> = std::result::Result<T, Error>;
}
