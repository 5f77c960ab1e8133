//! Caller-owned observability hook for the evaluation pipeline.

use std::path::Path;

use crate::config::{ConfigLayer, ResolvedConfig};
use crate::engine::EngineReport;
use crate::filter::FilterStats;
use crate::pipeline::EvaluationRequest;
use crate::sandbox::Sandbox;
use crate::Error;

/// Receives pipeline events. Every method defaults to doing nothing.
pub trait EvaluationObserver: Send + Sync {
    fn config_resolved(&self, _request: &EvaluationRequest, _config: &ResolvedConfig) {}

    fn sandbox_created(&self, _sandbox: &Sandbox) {}

    fn frames_filtered(&self, _path: &Path, _stats: &FilterStats) {}

    fn engine_finished(&self, _report: &EngineReport) {}

    /// Called once per sandbox, after its directories were removed.
    fn sandbox_reclaimed(&self, _sandbox: &Sandbox) {}

    fn cleanup_failed(&self, _error: &Error) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EvaluationObserver for NoopObserver {}

/// Observer that renders events through `tracing`.
///
/// The resolved configuration is logged at debug level, one event per key.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

fn log_layer<L: ConfigLayer>(layer: &L) {
    for (key, tokens) in layer.tokens() {
        tracing::debug!(layer = L::NAME, key, value = %tokens.join(" "), "config");
    }
}

impl EvaluationObserver for TracingObserver {
    fn config_resolved(&self, request: &EvaluationRequest, config: &ResolvedConfig) {
        tracing::info!(
            sequence = %request.sequence,
            tracker = %request.tracker,
            start = request.window.start(),
            end = request.window.end(),
            benchmark = %config.dataset.benchmark,
            split = %config.dataset.split_to_eval,
            metrics = ?config.metrics.metrics,
            "configuration resolved"
        );
        log_layer(&config.eval);
        log_layer(&config.dataset);
        log_layer(&config.metrics);
    }

    fn frames_filtered(&self, path: &Path, stats: &FilterStats) {
        tracing::info!(
            path = %path.display(),
            lines_read = stats.lines_read,
            lines_kept = stats.lines_kept,
            "frames filtered"
        );
    }

    fn engine_finished(&self, report: &EngineReport) {
        tracing::info!(messages = report.messages.len(), "evaluation engine finished");
        for message in &report.messages {
            tracing::debug!(%message, "engine output");
        }
    }

    fn sandbox_reclaimed(&self, sandbox: &Sandbox) {
        tracing::info!(token = %sandbox.token(), "sandbox reclaimed");
    }

    fn cleanup_failed(&self, error: &Error) {
        tracing::warn!(%error, "sandbox cleanup failed");
    }
}
