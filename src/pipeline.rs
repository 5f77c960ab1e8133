//! End-to-end frame-window evaluation of one sequence/tracker pair.
//!
//! ```text
//! request -> resolve config -> build sandbox -> filter GT -> rewrite seqLength
//!         -> stage + filter tracker file -> invoke engine -> parse summary
//!         -> categorize -> reclaim sandbox
//! ```
//!
//! Configuration errors and missing sources are reported before any sandbox
//! exists. Once a sandbox was built it is reclaimed on every exit path,
//! before the outcome is returned.

use std::fs;
use std::path::{Component, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ConfigLayers, DatasetConfig, Overrides, ResolvedConfig};
use crate::engine::EvaluationEngine;
use crate::filter::{filter_frames, FrameWindow, SequenceInfoFile};
use crate::invoker;
use crate::metrics::{CategorizedResult, MetricSummary};
use crate::observer::{EvaluationObserver, TracingObserver};
use crate::sandbox::{Sandbox, SandboxBuilder, SandboxToken};
use crate::{Error, Result};

/// One evaluation request.
///
/// `benchmark`, `split` and `metrics` fall back to the configuration layers
/// when unset. `overrides` are applied first; the request's own fields win.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub sequence: String,
    pub tracker: String,
    pub window: FrameWindow,
    pub metrics: Option<Vec<String>>,
    pub benchmark: Option<String>,
    pub split: Option<String>,
    /// Replacement tracker record file (e.g. an upload), copied into the
    /// sandbox in place of the tracker's own file for `sequence`.
    pub tracker_file: Option<PathBuf>,
    pub overrides: Overrides,
}

impl EvaluationRequest {
    pub fn new(sequence: impl Into<String>, tracker: impl Into<String>, window: FrameWindow) -> Self {
        Self {
            sequence: sequence.into(),
            tracker: tracker.into(),
            window,
            metrics: None,
            benchmark: None,
            split: None,
            tracker_file: None,
            overrides: Overrides::new(),
        }
    }

    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics = Some(metrics.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    pub fn with_split(mut self, split: impl Into<String>) -> Self {
        self.split = Some(split.into());
        self
    }

    pub fn with_tracker_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tracker_file = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Caller overrides plus the request's own selections.
    pub fn effective_overrides(&self) -> Overrides {
        let mut overrides = self.overrides.clone();
        overrides.set("SEQ_INFO", [self.sequence.as_str()]);
        overrides.set("TRACKERS_TO_EVAL", [self.tracker.as_str()]);
        if let Some(benchmark) = &self.benchmark {
            overrides.set("BENCHMARK", [benchmark.as_str()]);
        }
        if let Some(split) = &self.split {
            overrides.set("SPLIT_TO_EVAL", [split.as_str()]);
        }
        if let Some(metrics) = &self.metrics {
            overrides.set("METRICS", metrics.iter().map(String::as_str));
        }
        overrides
    }
}

/// Shared cancellation signal for one request.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Request-scoped execution context: sandbox token, cancellation signal,
/// optional deadline and the observer receiving pipeline events.
#[derive(Clone)]
pub struct RequestContext {
    token: SandboxToken,
    cancel: CancelFlag,
    deadline: Option<Instant>,
    observer: Arc<dyn EvaluationObserver>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Fresh context with a random token and the tracing observer.
    pub fn new() -> Self {
        Self {
            token: SandboxToken::generate(),
            cancel: CancelFlag::new(),
            deadline: None,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_token(mut self, token: SandboxToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_observer(mut self, observer: Arc<dyn EvaluationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn token(&self) -> &SandboxToken {
        &self.token
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn observer(&self) -> &dyn EvaluationObserver {
        self.observer.as_ref()
    }

    /// Fail if the request was cancelled or ran past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Engine("evaluation deadline exceeded".to_string()));
        }
        Ok(())
    }
}

/// Evaluate `request` over its frame window and return categorized metrics.
///
/// Returns either all five category buckets or an error, never a partial
/// result. Cleanup failures are logged and reported to the observer but do
/// not replace the outcome.
pub fn evaluate_window(
    request: &EvaluationRequest,
    layers: &ConfigLayers,
    engine: &dyn EvaluationEngine,
    ctx: &RequestContext,
) -> Result<CategorizedResult> {
    let span = tracing::info_span!(
        "evaluate_window",
        token = %ctx.token(),
        sequence = %request.sequence,
        tracker = %request.tracker,
    );
    let _enter = span.enter();

    let config = layers.resolve(&request.effective_overrides())?;
    ctx.observer().config_resolved(request, &config);
    ctx.check()?;

    let mut sandbox = SandboxBuilder::new(&config.dataset).build(
        &request.sequence,
        &request.tracker,
        ctx.token(),
    )?;
    ctx.observer().sandbox_created(&sandbox);

    let outcome = run_in_sandbox(request, &config, engine, ctx, &sandbox);

    let cleanup_errors = sandbox.reclaim();
    ctx.observer().sandbox_reclaimed(&sandbox);
    for err in &cleanup_errors {
        ctx.observer().cleanup_failed(err);
    }

    if let Err(err) = &outcome {
        tracing::warn!(error = %err, "frame-window evaluation failed");
    }
    outcome
}

/// Ground-truth file of the sandbox sequence. Filtering rewrites it in place,
/// so it must resolve inside the sandbox copy.
fn sandboxed_gt_file(dataset: &DatasetConfig, sandbox: &Sandbox) -> Result<PathBuf> {
    let gt_file = dataset.gt_file(&sandbox.sequence_name());
    let inside = gt_file
        .strip_prefix(sandbox.gt_dir())
        .is_ok_and(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))));
    if !inside {
        return Err(Error::filter_io(
            &gt_file,
            format!(
                "GT_LOC_FORMAT resolves outside the sandbox sequence {}",
                sandbox.gt_dir().display()
            ),
        ));
    }
    Ok(gt_file)
}

fn run_in_sandbox(
    request: &EvaluationRequest,
    config: &ResolvedConfig,
    engine: &dyn EvaluationEngine,
    ctx: &RequestContext,
    sandbox: &Sandbox,
) -> Result<CategorizedResult> {
    let window = request.window;
    let dataset = &config.dataset;
    let sequence_name = sandbox.sequence_name();

    // Ground truth
    let gt_file = sandboxed_gt_file(dataset, sandbox)?;
    let stats = filter_frames(&gt_file, window)?;
    ctx.observer().frames_filtered(&gt_file, &stats);

    let mut seqinfo = SequenceInfoFile::new(sandbox.gt_dir().join("seqinfo.ini"))?;
    seqinfo.set_seq_length(window.frame_count())?;
    seqinfo.save()?;

    ctx.check()?;

    // Tracker
    let tracker_data = sandbox.tracker_dir().join(&dataset.tracker_sub_folder);
    let tracker_file = tracker_data.join(format!("{}.txt", request.sequence));
    if let Some(upload) = &request.tracker_file {
        fs::create_dir_all(&tracker_data).map_err(|e| Error::filter_io(&tracker_data, e))?;
        fs::copy(upload, &tracker_file).map_err(|e| {
            Error::filter_io(upload, format!("failed to stage tracker file: {}", e))
        })?;
    }
    let stats = filter_frames(&tracker_file, window)?;
    ctx.observer().frames_filtered(&tracker_file, &stats);

    let scoped_file = tracker_data.join(format!("{}.txt", sequence_name));
    fs::rename(&tracker_file, &scoped_file).map_err(|e| Error::filter_io(&tracker_file, e))?;

    ctx.check()?;

    // Engine
    let invocation = invoker::invoke(engine, config, sandbox, ctx)?;
    ctx.observer().engine_finished(&invocation.report);

    let summary = MetricSummary::read(&invocation.summary_path)?;
    let result = CategorizedResult::from_summary(&summary);
    tracing::info!(
        summary_metrics = summary.len(),
        categorized_metrics = result.len(),
        "evaluation summary parsed"
    );
    Ok(result)
}
