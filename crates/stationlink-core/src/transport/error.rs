//! Transport errors

use std::io;
use thiserror::Error;

/// Errors raised by the serial transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// Rejected setting
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `open()` on an open link
    #[error("Serial port already open")]
    AlreadyOpen,

    /// Operation needs an open link
    #[error("Serial port not open")]
    NotOpen,

    /// `open()` on a faulted link
    #[error("Serial port faulted, close it before reopening")]
    Faulted,

    #[error("I/O error on {port}: {message}")]
    /// Platform I/O failure
    Io {
        /// Port identifier
        port: String,
        /// I/O error kind
        kind: io::ErrorKind,
        /// Raw OS error number
        code: Option<i32>,
        /// Platform message
        message: String,
    },

    /// Feature the backend lacks
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Build an I/O error for `port`, keeping the raw OS code when present
    pub fn io(port: &str, err: &io::Error) -> Self {
        if err.kind() == io::ErrorKind::Unsupported {
            return TransportError::Unsupported(err.to_string());
        }
        TransportError::Io {
            port: port.to_string(),
            kind: err.kind(),
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }

    /// Raw OS error code, if this is an I/O error that carried one
    pub fn code(&self) -> Option<i32> {
        match self {
            TransportError::Io { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether the error moves the connection to the faulted state
    pub fn is_fatal_io(&self) -> bool {
        matches!(self, TransportError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_keeps_os_code() {
        let err = io::Error::from_raw_os_error(2);
        let mapped = TransportError::io("/dev/ttyUSB0", &err);
        assert_eq!(mapped.code(), Some(2));
        assert!(mapped.is_fatal_io());
        assert!(mapped.to_string().contains("/dev/ttyUSB0"));
    }

    #[test]
    fn test_unsupported_kind_maps_to_unsupported() {
        let err = io::Error::new(io::ErrorKind::Unsupported, "mark parity");
        let mapped = TransportError::io("COM6", &err);
        assert!(matches!(mapped, TransportError::Unsupported(_)));
        assert!(!mapped.is_fatal_io());
    }
}
