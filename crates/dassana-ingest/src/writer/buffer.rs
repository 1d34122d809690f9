//! Local NDJSON buffer files
//!
//! The registry owns every open handle: one main buffer that rotates, plus
//! named side-channel buffers that are opened lazily and only closed when the
//! writer finishes.

use crate::error::{IngestError, Result};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BUFFER_EXTENSION: &str = "ndjson";

/// An open, append-only buffer file
#[derive(Debug)]
pub struct BufferFile {
    path: PathBuf,
    writer: BufWriter<File>,
    len: u64,
}

impl BufferFile {
    /// Create a new file named `<stem>.ndjson` in `dir`, adding `-<n>` when
    /// that name (or its `.gz` artifact) already exists.
    pub fn create(dir: &Path, stem: &str) -> Result<Self> {
        let path = unique_path(dir, stem);
        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened buffer file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one line and return the new size.
    pub fn append(&mut self, line: &[u8]) -> Result<u64> {
        self.writer.write_all(line)?;
        self.len += line.len() as u64;
        Ok(self.len)
    }

    /// Flush and close the handle. The file stays on disk.
    pub fn finish(self) -> Result<FinishedBuffer> {
        let file = self
            .writer
            .into_inner()
            .map_err(|e| IngestError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(FinishedBuffer {
            path: self.path,
            len: self.len,
        })
    }
}

/// A closed buffer file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedBuffer {
    pub path: PathBuf,
    pub len: u64,
}

fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let taken = |p: &Path| p.exists() || dassana_common::compression::gz_path(p).exists();

    let mut candidate = dir.join(format!("{}.{}", stem, BUFFER_EXTENSION));
    let mut n = 1;
    while taken(&candidate) {
        candidate = dir.join(format!("{}-{}.{}", stem, n, BUFFER_EXTENSION));
        n += 1;
    }
    candidate
}

/// Custom buffer names become part of a file name.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(IngestError::invalid_input(format!(
            "Custom buffer name must be [A-Za-z0-9_.-] and not start with '.': {:?}",
            name
        )))
    }
}

#[derive(Debug)]
pub struct BufferRegistry {
    dir: PathBuf,
    main: Option<BufferFile>,
    custom: BTreeMap<String, BufferFile>,
}

impl BufferRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            main: None,
            custom: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a fresh main buffer named by the current epoch seconds.
    pub fn open_main(&mut self) -> Result<&mut BufferFile> {
        if self.main.is_some() {
            return Err(IngestError::invalid_state("Main buffer is already open"));
        }
        let stem = chrono::Utc::now().timestamp().to_string();
        Ok(self.main.insert(BufferFile::create(&self.dir, &stem)?))
    }

    pub fn main_mut(&mut self) -> Result<&mut BufferFile> {
        self.main
            .as_mut()
            .ok_or_else(|| IngestError::invalid_state("No open main buffer"))
    }

    /// Close the main buffer, if open.
    pub fn finish_main(&mut self) -> Result<Option<FinishedBuffer>> {
        self.main.take().map(BufferFile::finish).transpose()
    }

    /// The named buffer, created on first use as `<name>-<epoch>.ndjson`.
    pub fn custom_mut(&mut self, name: &str) -> Result<&mut BufferFile> {
        if !self.custom.contains_key(name) {
            validate_name(name)?;
            let stem = format!("{}-{}", name, chrono::Utc::now().timestamp());
            let file = BufferFile::create(&self.dir, &stem)?;
            self.custom.insert(name.to_string(), file);
        }
        self.custom
            .get_mut(name)
            .ok_or_else(|| IngestError::invalid_state(format!("Custom buffer {} vanished", name)))
    }

    /// Close every custom buffer, in name order.
    pub fn finish_custom(&mut self) -> Result<Vec<(String, FinishedBuffer)>> {
        std::mem::take(&mut self.custom)
            .into_iter()
            .map(|(name, file)| file.finish().map(|done| (name, done)))
            .collect()
    }

    /// Close every handle without further processing. Files stay on disk.
    pub fn close_all(&mut self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let files = self.main.take().into_iter().chain(std::mem::take(&mut self.custom).into_values());
        for file in files {
            let path = file.path().to_path_buf();
            if let Err(e) = file.finish() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to flush buffer while closing");
            }
            paths.push(path);
        }
        paths
    }
}
