//! Request-scoped sandboxes: isolated copies of one sequence and one tracker.
//!
//! A [`Sandbox`] remembers exactly which directories its builder created and
//! removes only those, once. Dropping an unreclaimed sandbox reclaims it, so
//! an abandoned or panicking request still cleans up after itself.

mod builder;

pub use builder::SandboxBuilder;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::Error;

/// Request-unique token embedded in every sandbox directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxToken(String);

impl SandboxToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap a caller-chosen token. Path separators are replaced so the token
    /// can never escape the directory it is appended in.
    pub fn from_string(token: impl Into<String>) -> Self {
        let token: String = token
            .into()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<name>_<token>`
    pub fn scoped(&self, name: &str) -> String {
        format!("{}_{}", name, self.0)
    }
}

impl fmt::Display for SandboxToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filtered copy of a ground-truth sequence and a tracker directory.
#[derive(Debug)]
pub struct Sandbox {
    token: SandboxToken,
    sequence: String,
    tracker: String,
    gt_dir: PathBuf,
    tracker_dir: PathBuf,
    /// Directories created by the builder and not yet removed.
    created: Vec<PathBuf>,
    reclaimed: bool,
}

impl Sandbox {
    pub fn token(&self) -> &SandboxToken {
        &self.token
    }

    /// Original sequence name.
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Original tracker name.
    pub fn tracker(&self) -> &str {
        &self.tracker
    }

    /// Sequence name the engine sees, `<sequence>_<token>`.
    pub fn sequence_name(&self) -> String {
        self.token.scoped(&self.sequence)
    }

    /// Tracker name the engine sees, `<tracker>_<token>`.
    pub fn tracker_name(&self) -> String {
        self.token.scoped(&self.tracker)
    }

    /// Sandboxed copy of the ground-truth sequence directory.
    pub fn gt_dir(&self) -> &Path {
        &self.gt_dir
    }

    /// Sandboxed copy of the tracker directory.
    pub fn tracker_dir(&self) -> &Path {
        &self.tracker_dir
    }

    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed
    }

    /// Remove every directory this sandbox created.
    ///
    /// Only the first call does any work; later calls return no errors.
    /// Removal failures are returned as [`Error::Cleanup`] for the caller to
    /// log; a path that is already gone counts as removed.
    pub fn reclaim(&mut self) -> Vec<Error> {
        if self.reclaimed {
            return Vec::new();
        }
        self.reclaimed = true;

        let mut errors = Vec::new();
        // Reverse creation order.
        while let Some(path) = self.created.pop() {
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "removed sandbox directory"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => errors.push(Error::Cleanup { path, source }),
            }
        }
        errors
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.reclaimed {
            return;
        }
        tracing::warn!(token = %self.token, "sandbox dropped without explicit reclaim");
        for err in self.reclaim() {
            tracing::warn!(error = %err, "sandbox cleanup failed");
        }
    }
}

/// Recursively copy the entries of `src` into the existing directory `dst`.
pub(crate) fn copy_contents(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if fs::metadata(&from)?.is_dir() {
            fs::create_dir(&to)?;
            copy_contents(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
