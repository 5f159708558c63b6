//! Record sinks
//!
//! Append-only destinations for rendered records.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::{RecordSink, SinkError};

/// Appends records to a file, creating it and its directory if needed
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open `path` for appending
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|source| SinkError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
                tracing::info!("created output directory {}", dir.display());
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Output file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileSink {
    fn append(&mut self, records: &str) -> Result<(), SinkError> {
        self.writer.write_all(records.as_bytes())?;
        // Readers tail the file, so each batch goes out immediately
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<String>>,
    flushes: Arc<Mutex<usize>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far
    pub fn contents(&self) -> String {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `flush` calls
    pub fn flush_count(&self) -> usize {
        *self.flushes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for MemorySink {
    fn append(&mut self, records: &str) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(records);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        *self.flushes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
