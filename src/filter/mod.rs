//! Frame-window filtering of MOTChallenge record files.
//!
//! Record files are CSV lines of the form
//! `frame,id,bb_left,bb_top,bb_width,bb_height,conf,...`. Filtering keeps a
//! line byte-for-byte iff its leading frame number lies inside the window.

mod seqinfo;

pub use seqinfo::SequenceInfoFile;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Inclusive range of 1-based frame numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameWindow {
    start: u64,
    end: u64,
}

impl FrameWindow {
    /// Create a window `[start, end]`. Both bounds must be at least 1 and
    /// `start <= end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start == 0 {
            return Err(Error::Config(format!(
                "frame window must start at frame 1 or later, got {}",
                start
            )));
        }
        if start > end {
            return Err(Error::Config(format!(
                "frame window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of frames the window spans, `end - start + 1`.
    pub fn frame_count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Negative frames are never inside a window.
    pub fn contains(&self, frame: i64) -> bool {
        u64::try_from(frame).is_ok_and(|f| self.start <= f && f <= self.end)
    }
}

/// Line counts from one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub lines_read: usize,
    pub lines_kept: usize,
}

/// Parse the leading comma-delimited field of a record line as a frame number.
fn leading_frame(line: &[u8]) -> Option<i64> {
    let field = match line.iter().position(|&b| b == b',') {
        Some(idx) => &line[..idx],
        None => line,
    };
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

/// Filter `path` in place to the lines whose frame lies inside `window`.
///
/// The input is streamed line by line into a temporary file in the same
/// directory, which then atomically replaces the original. On any failure the
/// temporary file is discarded and `path` is left as it was.
pub fn filter_frames<P: AsRef<Path>>(path: P, window: FrameWindow) -> Result<FilterStats> {
    let path = path.as_ref();
    let source = File::open(path).map_err(|e| Error::filter_io(path, e))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let temp = NamedTempFile::new_in(dir).map_err(|e| Error::filter_io(path, e))?;
    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(temp);
    let mut stats = FilterStats::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| Error::filter_io(path, e))?;
        if n == 0 {
            break;
        }
        stats.lines_read += 1;

        let frame = leading_frame(&line).ok_or_else(|| {
            Error::filter_io(
                path,
                format!(
                    "line {}: leading field is not an integer frame number: {:?}",
                    stats.lines_read,
                    String::from_utf8_lossy(&line).trim_end()
                ),
            )
        })?;

        if window.contains(frame) {
            writer.write_all(&line).map_err(|e| Error::filter_io(path, e))?;
            stats.lines_kept += 1;
        }
    }

    let temp = writer
        .into_inner()
        .map_err(|e| Error::filter_io(path, e.error().to_string()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::filter_io(path, e))?;
    temp.persist(path)
        .map_err(|e| Error::filter_io(path, e.error))?;

    tracing::debug!(
        path = %path.display(),
        start = window.start(),
        end = window.end(),
        lines_read = stats.lines_read,
        lines_kept = stats.lines_kept,
        "filtered record file"
    );

    Ok(stats)
}
