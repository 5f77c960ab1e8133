//! Sandbox construction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{copy_contents, Sandbox, SandboxToken};
use crate::config::DatasetConfig;
use crate::{Error, Result};

/// Creates sandboxes next to the source directories named by a
/// [`DatasetConfig`].
///
/// Sandboxed copies live beside their sources, so the evaluation engine finds
/// them through the same `<root>/<BENCHMARK>-<SPLIT>/` layout:
///
/// ```text
/// data/gt/mot_challenge/MOT16-train/MOT16-02_<token>/
/// data/trackers/mot_challenge/MOT16-train/MPNTrack_<token>/
/// ```
pub struct SandboxBuilder<'a> {
    dataset: &'a DatasetConfig,
}

fn require_dir(what: &'static str, path: PathBuf) -> Result<PathBuf> {
    if path.is_dir() {
        return Ok(path);
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    tracing::error!(
        what,
        path = %path.display(),
        parent_exists = parent.is_dir(),
        "source directory does not exist"
    );
    Err(Error::MissingSource { what, path })
}

/// Copy `src` to a new directory `dst`, removing any partial copy on failure.
fn copy_or_discard(src: &Path, dst: &Path) -> Result<()> {
    let copy_error = |e: io::Error| {
        Error::IoError(io::Error::new(
            e.kind(),
            format!(
                "failed to copy '{}' to '{}': {}",
                src.display(),
                dst.display(),
                e
            ),
        ))
    };

    // An existing destination belongs to someone else and is left alone.
    fs::create_dir(dst).map_err(copy_error)?;
    if let Err(e) = copy_contents(src, dst) {
        if let Err(cleanup) = fs::remove_dir_all(dst) {
            tracing::warn!(path = %dst.display(), error = %cleanup, "failed to discard partial copy");
        }
        return Err(copy_error(e));
    }
    Ok(())
}

impl<'a> SandboxBuilder<'a> {
    pub fn new(dataset: &'a DatasetConfig) -> Self {
        Self { dataset }
    }

    /// Copy `sequence`'s ground-truth directory and `tracker`'s directory into
    /// fresh token-scoped directories.
    ///
    /// Either both copies exist afterwards or neither does.
    pub fn build(&self, sequence: &str, tracker: &str, token: &SandboxToken) -> Result<Sandbox> {
        let gt_src = require_dir("ground-truth", self.dataset.sequence_dir(sequence))?;
        let tracker_src = require_dir("tracker", self.dataset.tracker_dir(tracker))?;

        let gt_dir = self.dataset.sequence_dir(&token.scoped(sequence));
        let tracker_dir = self.dataset.tracker_dir(&token.scoped(tracker));

        copy_or_discard(&gt_src, &gt_dir)?;
        if let Err(e) = copy_or_discard(&tracker_src, &tracker_dir) {
            if let Err(cleanup) = fs::remove_dir_all(&gt_dir) {
                tracing::warn!(
                    path = %gt_dir.display(),
                    error = %cleanup,
                    "failed to discard ground-truth copy"
                );
            }
            return Err(e);
        }

        tracing::info!(
            token = %token,
            gt_dir = %gt_dir.display(),
            tracker_dir = %tracker_dir.display(),
            "sandbox created"
        );

        Ok(Sandbox {
            token: token.clone(),
            sequence: sequence.to_string(),
            tracker: tracker.to_string(),
            created: vec![gt_dir.clone(), tracker_dir.clone()],
            gt_dir,
            tracker_dir,
            reclaimed: false,
        })
    }
}
