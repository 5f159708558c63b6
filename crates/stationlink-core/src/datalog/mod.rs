//! Output Records
//!
//! Renders decoded samples as `;`-separated records and appends them to a
//! sink.

mod format;
mod recorder;

pub use format::{stamp, RecordFormat, SEPARATOR};
pub use recorder::{FileSink, MemorySink};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a record sink
#[derive(Error, Debug)]
pub enum SinkError {
    /// Output directory could not be created
    #[error("Can't create the output folder {path}: {source}")]
    CreateDir {
        /// Directory
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// Output file could not be opened
    #[error("Can't open the output file {path}: {source}")]
    Open {
        /// File
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// Append or flush failed
    #[error("Write failed: {0}")]
    Write(#[from] io::Error),
}

/// Append-only destination for rendered records
pub trait RecordSink: Send {
    /// Append one or more complete records
    fn append(&mut self, records: &str) -> Result<(), SinkError>;

    /// Push buffered records to storage
    fn flush(&mut self) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn append(&mut self, records: &str) -> Result<(), SinkError> {
        (**self).append(records)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}
