//! Line framing
//!
//! Turns the raw byte stream into protocol lines. Each byte gets its own
//! read deadline, as if it were read with a one-byte `read`; bytes the
//! driver hands over early are kept for the next byte request.

use super::connection::SerialTransport;
use super::TransportError;

/// Frames lines out of a transport's byte stream
pub struct LineReader<'a> {
    transport: &'a SerialTransport,
}

impl<'a> LineReader<'a> {
    /// Create a line reader over an open transport
    pub fn new(transport: &'a SerialTransport) -> Self {
        Self { transport }
    }

    /// Read one line of at most `max_size` bytes.
    ///
    /// Stops when the buffer ends with `eol`, when a byte does not arrive
    /// within its deadline, or when `max_size` bytes have been read. The
    /// marker is kept; callers check `ends_with(eol)` to tell a complete
    /// line from a timed-out or truncated one.
    pub fn read_line(&self, max_size: usize, eol: &[u8]) -> Result<Vec<u8>, TransportError> {
        check_eol(eol)?;
        if max_size == 0 {
            return Ok(Vec::new());
        }

        let mut source = self.transport.lock_reader()?;
        let mut line = Vec::with_capacity(max_size.min(super::DEFAULT_MAX_LINE));
        while line.len() < max_size {
            match source.next_byte()? {
                Some(byte) => {
                    line.push(byte);
                    if line.ends_with(eol) {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(line)
    }

    /// Read lines until `max_size` bytes in total have been read or a byte
    /// times out. A trailing partial line is returned as the last element.
    pub fn read_lines(
        &self,
        max_size: usize,
        eol: &[u8],
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        check_eol(eol)?;
        if max_size == 0 {
            return Ok(Vec::new());
        }

        let mut source = self.transport.lock_reader()?;
        let mut lines = Vec::new();
        let mut current = Vec::new();
        let mut total = 0;
        while total < max_size {
            match source.next_byte()? {
                Some(byte) => {
                    current.push(byte);
                    total += 1;
                    if current.ends_with(eol) {
                        lines.push(std::mem::take(&mut current));
                    }
                }
                None => break,
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        Ok(lines)
    }
}

fn check_eol(eol: &[u8]) -> Result<(), TransportError> {
    if eol.is_empty() {
        return Err(TransportError::InvalidConfig(
            "end-of-line marker is empty".to_string(),
        ));
    }
    Ok(())
}
