//! Worker service running each evaluation on its own thread.
//!
//! Concurrent requests never share a sandbox, so the service needs no global
//! lock. [`PairLocks`] is available for deployments that want to serialise
//! requests for the same `(sequence, tracker)` pair anyway.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::config::ConfigLayers;
use crate::engine::EvaluationEngine;
use crate::metrics::CategorizedResult;
use crate::observer::{EvaluationObserver, TracingObserver};
use crate::pipeline::{evaluate_window, CancelFlag, EvaluationRequest, RequestContext};
use crate::sandbox::SandboxToken;
use crate::{Error, Result};

const LOCK_POLL: Duration = Duration::from_millis(50);

/// Submits evaluation requests to dedicated worker threads.
#[derive(Clone)]
pub struct EvaluationService {
    engine: Arc<dyn EvaluationEngine>,
    layers: Arc<ConfigLayers>,
    observer: Arc<dyn EvaluationObserver>,
    pair_locks: Option<Arc<PairLocks>>,
    timeout: Option<Duration>,
}

impl EvaluationService {
    pub fn new(engine: Arc<dyn EvaluationEngine>, layers: ConfigLayers) -> Self {
        Self {
            engine,
            layers: Arc::new(layers),
            observer: Arc::new(TracingObserver),
            pair_locks: None,
            timeout: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EvaluationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Deadline applied to every request, measured from submission.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Serialise requests for the same `(sequence, tracker)` pair.
    pub fn with_pair_locks(mut self, locks: Arc<PairLocks>) -> Self {
        self.pair_locks = Some(locks);
        self
    }

    pub fn layers(&self) -> &ConfigLayers {
        &self.layers
    }

    /// Start evaluating `request` on a new worker thread.
    pub fn submit(&self, request: EvaluationRequest) -> Result<EvaluationHandle> {
        let mut ctx = RequestContext::new().with_observer(Arc::clone(&self.observer));
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_timeout(timeout);
        }
        let token = ctx.token().clone();
        let cancel = ctx.cancel_flag().clone();

        let (sender, receiver) = bounded(1);
        let engine = Arc::clone(&self.engine);
        let layers = Arc::clone(&self.layers);
        let locks = self.pair_locks.clone();

        let name: String = format!("eval-{}", token).chars().take(16).collect();
        let join = thread::Builder::new().name(name).spawn(move || {
            let outcome = run_request(&request, &layers, engine.as_ref(), &ctx, locks.as_deref());
            // The handle may have been dropped; the result is discarded then.
            let _ = sender.send(outcome);
        })?;

        tracing::debug!(%token, "evaluation submitted");
        Ok(EvaluationHandle {
            token,
            cancel,
            receiver,
            join: Some(join),
            finished: false,
        })
    }
}

fn run_request(
    request: &EvaluationRequest,
    layers: &ConfigLayers,
    engine: &dyn EvaluationEngine,
    ctx: &RequestContext,
    locks: Option<&PairLocks>,
) -> Result<CategorizedResult> {
    let _guard = match locks {
        Some(locks) => Some(locks.acquire(&request.sequence, &request.tracker, ctx)?),
        None => None,
    };
    evaluate_window(request, layers, engine, ctx)
}

/// Handle to one submitted evaluation.
///
/// Dropping the handle before taking the result cancels the request; its
/// worker still reclaims the sandbox before exiting.
pub struct EvaluationHandle {
    token: SandboxToken,
    cancel: CancelFlag,
    receiver: Receiver<Result<CategorizedResult>>,
    join: Option<JoinHandle<()>>,
    finished: bool,
}

impl EvaluationHandle {
    pub fn token(&self) -> &SandboxToken {
        &self.token
    }

    /// Ask the worker to stop. The result becomes [`Error::Cancelled`] unless
    /// the evaluation already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the evaluation finished.
    pub fn wait(mut self) -> Result<CategorizedResult> {
        let outcome = self
            .receiver
            .recv()
            .unwrap_or_else(|_| Err(worker_lost()));
        self.finish();
        outcome
    }

    /// Wait up to `timeout`; on timeout the handle is given back unchanged.
    pub fn wait_timeout(mut self, timeout: Duration) -> std::result::Result<Result<CategorizedResult>, Self> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => {
                self.finish();
                Ok(outcome)
            }
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => {
                self.finish();
                Ok(Err(worker_lost()))
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(join) = self.join.take() {
            // Panics were already turned into a lost-worker error.
            let _ = join.join();
        }
    }
}

fn worker_lost() -> Error {
    Error::Engine("evaluation worker exited without a result".to_string())
}

impl Drop for EvaluationHandle {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(token = %self.token, "evaluation handle dropped, cancelling");
            self.cancel.cancel();
        }
    }
}

/// Explicit mutual exclusion per `(sequence, tracker)` pair.
#[derive(Debug, Default)]
pub struct PairLocks {
    busy: Mutex<HashSet<(String, String)>>,
    released: Condvar,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the pair is free, then hold it until the guard drops.
    ///
    /// Gives up with the context's error when it is cancelled or its
    /// deadline passes while waiting.
    pub fn acquire(&self, sequence: &str, tracker: &str, ctx: &RequestContext) -> Result<PairGuard<'_>> {
        let key = (sequence.to_string(), tracker.to_string());
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        while busy.contains(&key) {
            ctx.check()?;
            let (guard, _) = self
                .released
                .wait_timeout(busy, LOCK_POLL)
                .unwrap_or_else(PoisonError::into_inner);
            busy = guard;
        }
        busy.insert(key.clone());
        Ok(PairGuard { locks: self, key })
    }

    pub fn is_held(&self, sequence: &str, tracker: &str) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(sequence.to_string(), tracker.to_string()))
    }
}

/// Holds one pair of a [`PairLocks`].
#[derive(Debug)]
pub struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: (String, String),
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self.locks.busy.lock().unwrap_or_else(PoisonError::into_inner);
        busy.remove(&self.key);
        self.locks.released.notify_all();
    }
}
