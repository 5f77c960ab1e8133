//! MOTChallenge seqinfo.ini reader and rewriter.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Sequence metadata file, usually `<sequence>/seqinfo.ini`:
/// ```ini
/// [Sequence]
/// name=MOT17-02-FRCNN
/// imDir=img1
/// frameRate=30
/// seqLength=600
/// imWidth=1920
/// imHeight=1080
/// imExt=.jpg
/// ```
///
/// Section and key names match case-insensitively. Lines that are not touched
/// by [`SequenceInfoFile::set`] are written back verbatim.
#[derive(Debug)]
pub struct SequenceInfoFile {
    path: PathBuf,
    lines: Vec<String>,
}

/// Section name of a `[name]` header line.
fn section_header(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

/// `(key, value)` of a `key=value` or `key: value` line.
fn key_value(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let idx = trimmed.find(['=', ':'])?;
    Some((trimmed[..idx].trim(), trimmed[idx + 1..].trim()))
}

impl SequenceInfoFile {
    /// Read the metadata file at `file_path`.
    pub fn new<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::filter_io(&path, format!("failed to open sequence info file: {}", e))
        })?;

        Ok(Self {
            path,
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index range `(header, end)` of the lines belonging to `section`.
    fn section_bounds(&self, section: &str) -> Option<(usize, usize)> {
        let header = self.lines.iter().position(|l| {
            section_header(l).is_some_and(|name| name.eq_ignore_ascii_case(section))
        })?;
        let end = self.lines[header + 1..]
            .iter()
            .position(|l| section_header(l).is_some())
            .map(|offset| header + 1 + offset)
            .unwrap_or(self.lines.len());
        Some((header, end))
    }

    /// Look up `key` inside `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let (header, end) = self.section_bounds(section)?;
        self.lines[header + 1..end]
            .iter()
            .filter_map(|l| key_value(l))
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Look up `key` in the `Sequence` section and parse it as an integer.
    pub fn search_int(&self, key: &str) -> Result<i64> {
        let value = self.get("Sequence", key).ok_or_else(|| {
            Error::filter_io(&self.path, format!("couldn't find '{}'", key))
        })?;
        value.parse().map_err(|e| {
            Error::filter_io(
                &self.path,
                format!("value for '{}' is not an integer: {}", key, e),
            )
        })
    }

    /// Set `key` inside `section`, replacing its value in place or appending
    /// the key at the end of the section. Fails if the section is absent.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let (header, end) = self.section_bounds(section).ok_or_else(|| {
            Error::filter_io(&self.path, format!("missing [{}] section", section))
        })?;

        let existing = (header + 1..end).find(|&i| {
            key_value(&self.lines[i]).is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
        });

        match existing {
            Some(i) => {
                let line = &self.lines[i];
                let prefix = line.find(['=', ':']).map_or(line.len(), |d| d + 1);
                self.lines[i] = format!("{}{}", &line[..prefix], value);
            }
            None => {
                // Insert after the last non-blank line of the section.
                let mut at = end;
                while at > header + 1 && self.lines[at - 1].trim().is_empty() {
                    at -= 1;
                }
                self.lines.insert(at, format!("{}={}", key, value));
            }
        }
        Ok(())
    }

    /// Set the `Sequence/seqLength` entry.
    pub fn set_seq_length(&mut self, length: u64) -> Result<()> {
        self.set("Sequence", "seqLength", &length.to_string())
    }

    /// Write the file back through a temporary file and an atomic rename.
    pub fn save(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| Error::filter_io(&self.path, e))?;
        for line in &self.lines {
            writeln!(temp, "{}", line).map_err(|e| Error::filter_io(&self.path, e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::filter_io(&self.path, e))?;
        temp.persist(&self.path)
            .map_err(|e| Error::filter_io(&self.path, e.error))?;
        Ok(())
    }
}
