//! Hand-off of a prepared sandbox to the evaluation engine.

use std::fs;
use std::path::PathBuf;

use crate::config::ResolvedConfig;
use crate::engine::{DatasetAdapter, EngineJob, EngineReport, EvaluationEngine};
use crate::metrics::MetricKind;
use crate::pipeline::RequestContext;
use crate::sandbox::Sandbox;
use crate::{Error, Result};

/// Result of one engine run over a sandbox.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub report: EngineReport,
    pub kinds: Vec<MetricKind>,
    /// Where the engine declared it writes its summary.
    pub summary_path: PathBuf,
}

/// Dataset adapter pointing the engine at the sandboxed sequence and tracker.
///
/// `OUTPUT_FOLDER` is cleared so the summary lands inside the sandboxed
/// tracker directory and is reclaimed with it.
pub fn sandbox_adapter(config: &ResolvedConfig, sandbox: &Sandbox) -> DatasetAdapter {
    let mut dataset = config.dataset.clone();
    dataset.seq_info = Some(vec![sandbox.sequence_name()]);
    dataset.trackers_to_eval = Some(vec![sandbox.tracker_name()]);
    dataset.output_folder = None;
    DatasetAdapter::from_config(dataset)
}

/// Run `engine` over `sandbox`.
///
/// Fails with [`Error::Engine`] before calling the engine when none of the
/// configured metric names is a known family.
pub fn invoke(
    engine: &dyn EvaluationEngine,
    config: &ResolvedConfig,
    sandbox: &Sandbox,
    ctx: &RequestContext,
) -> Result<Invocation> {
    let kinds = MetricKind::resolve(&config.metrics.metrics);
    if kinds.is_empty() {
        return Err(Error::Engine(format!(
            "no metrics selected for evaluation: none of {:?} is one of {:?}",
            config.metrics.metrics,
            MetricKind::ALL.map(|k| k.name())
        )));
    }

    let adapter = sandbox_adapter(config, sandbox);
    let summary_path = adapter.summary_path(&sandbox.tracker_name());

    // The tracker copy may carry a summary from an earlier full run.
    if summary_path.starts_with(sandbox.tracker_dir()) && summary_path.exists() {
        tracing::debug!(path = %summary_path.display(), "removing stale summary from sandbox");
        fs::remove_file(&summary_path)?;
    }

    ctx.check()?;
    tracing::info!(
        metrics = ?kinds.iter().map(|k| k.name()).collect::<Vec<_>>(),
        sequence = %sandbox.sequence_name(),
        tracker = %sandbox.tracker_name(),
        "invoking evaluation engine"
    );

    let job = EngineJob {
        eval: &config.eval,
        dataset: &adapter,
        metrics: &config.metrics,
        kinds: &kinds,
        cancel: ctx.cancel_flag(),
        deadline: ctx.deadline(),
    };
    let report = engine.evaluate(&job)?;

    Ok(Invocation {
        report,
        kinds,
        summary_path,
    })
}
