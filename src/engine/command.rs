//! Engine driven as an external program.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{EngineJob, EngineReport, EvaluationEngine};
use crate::config::ConfigLayer;
use crate::{Error, Result};

/// Runs an evaluation program as a subprocess.
///
/// The resolved configuration is passed as `--KEY value...` flags, the
/// convention of TrackEval's `run_mot_challenge.py`:
///
/// ```text
/// python3 scripts/run_mot_challenge.py --USE_PARALLEL False ... \
///     --SEQ_INFO MOT16-02_<token> --TRACKERS_TO_EVAL MPNTrack_<token> --METRICS HOTA CLEAR
/// ```
///
/// Standard output lines become the report messages. On unix the child leads
/// its own process group, and the whole group is killed on cancellation or
/// when the job deadline passes.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    poll_interval: Duration,
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Append a leading argument (e.g. the runner script).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Full argument list for `job`, leading arguments first.
    pub fn command_args(&self, job: &EngineJob<'_>) -> Vec<String> {
        let mut out = self.args.clone();
        let mut push = |key: &str, tokens: Vec<String>| {
            out.push(format!("--{}", key));
            out.extend(tokens);
        };

        for (key, tokens) in job.eval.tokens() {
            push(key, tokens);
        }
        for (key, tokens) in job.dataset.config().tokens() {
            push(key, tokens);
        }
        push("METRICS", job.kinds.iter().map(|k| k.name().to_string()).collect());
        push("THRESHOLD", vec![job.metrics.threshold.to_string()]);
        out
    }
}

/// Send SIGKILL to the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // -0 would signal our own group.
    if pid == 0 || pid > i32::MAX as u32 {
        tracing::warn!(pid, "skipping process group kill for out-of-range pid");
        return;
    }
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => tracing::debug!(pgid = pid, "engine process group killed"),
        Ok(status) => tracing::debug!(pgid = pid, %status, "kill failed for engine process group"),
        Err(e) => tracing::debug!(pgid = pid, error = %e, "failed to run kill for engine process group"),
    }
}

/// Kill the engine and everything it started, then reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(child.id());
    if let Err(e) = child.kill() {
        tracing::debug!(error = %e, "engine process already gone");
    }
    if let Err(e) = child.wait() {
        tracing::debug!(error = %e, "failed to reap engine process");
    }
}

/// Collect the lines of a child pipe on a background thread.
fn drain<R: Read + Send + 'static>(pipe: R, stream: &'static str) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut lines = Vec::new();
        for line in BufReader::new(pipe).lines().map_while(|l| l.ok()) {
            tracing::trace!(stream, %line, "engine");
            lines.push(line);
        }
        lines
    })
}

impl EvaluationEngine for CommandEngine {
    fn evaluate(&self, job: &EngineJob<'_>) -> Result<EngineReport> {
        let args = self.command_args(job);
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        tracing::debug!(program = %self.program.display(), args = ?args, "spawning evaluation engine");
        let mut child = command.spawn().map_err(|e| {
            Error::Engine(format!(
                "failed to start '{}': {}",
                self.program.display(),
                e
            ))
        })?;

        let stdout = child.stdout.take().map(|p| drain(p, "stdout"));
        let stderr = child.stderr.take().map(|p| drain(p, "stderr"));

        let started = Instant::now();
        let outcome = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => break Err(Error::Engine(format!("failed to wait for engine: {}", e))),
            }
            if job.cancel.is_cancelled() {
                break Err(Error::Cancelled);
            }
            if job.deadline.is_some_and(|d| Instant::now() >= d) {
                break Err(Error::Engine(format!(
                    "engine timed out after {:.1}s",
                    started.elapsed().as_secs_f64()
                )));
            }
            thread::sleep(self.poll_interval);
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                terminate(&mut child);
                // Readers are left detached; a descendant outside the group
                // may still hold the pipes open.
                return Err(err);
            }
        };

        let messages = stdout
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let errors = stderr
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let tail: Vec<&str> = errors.iter().rev().take(5).rev().map(String::as_str).collect();
            return Err(Error::Engine(format!(
                "engine exited with {}: {}",
                status,
                tail.join(" | ")
            )));
        }

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation engine exited"
        );
        Ok(EngineReport { messages })
    }
}
