//! Platform serial access
//!
//! `PlatformSerial` opens devices; `PlatformPort` is one open device handle.
//! The transport only talks to these traits, so the native backend and the
//! simulated device are interchangeable.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::config::{ByteSize, FlowControl, Parity, SerialConfig, StopBits};

/// Which driver buffer to discard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearBuffer {
    /// Received, unread bytes
    Input,
    /// Bytes queued for transmission
    Output,
    /// Both directions
    All,
}

/// Modem status inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    /// Clear To Send
    Cts,
    /// Data Set Ready
    Dsr,
    /// Ring Indicator
    Ri,
    /// Carrier Detect
    Cd,
}

/// Modem control outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    /// Request To Send
    Rts,
    /// Data Terminal Ready
    Dtr,
    /// Break condition on TX
    Break,
}

/// Capability to open serial devices on the current platform
pub trait PlatformSerial: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Acquire the device described by `config` and apply its line settings
    fn open(&self, config: &SerialConfig) -> io::Result<Box<dyn PlatformPort>>;
}

/// An open device handle
pub trait PlatformPort: Send {
    /// Re-apply line settings to the open device
    fn configure(&mut self, config: &SerialConfig) -> io::Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`
    /// for the first byte. Returns `Ok(0)` when the wait expires.
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write as much of `buf` as the device accepts within `timeout`.
    /// Returns `Ok(0)` when nothing could be written in time.
    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize>;

    /// Bytes held by the driver's receive buffer
    fn bytes_to_read(&mut self) -> io::Result<usize>;

    /// Block until pending output has been transmitted
    fn flush(&mut self) -> io::Result<()>;

    /// Discard driver buffers
    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()>;

    /// Duplicate the handle so reads and writes can proceed independently
    fn try_clone(&self) -> io::Result<Box<dyn PlatformPort>>;

    /// Sample a modem status line
    fn read_status(&mut self, line: StatusLine) -> io::Result<bool> {
        Err(unsupported(format!("{:?} status", line)))
    }

    /// Drive a modem control line
    fn set_control(&mut self, line: ControlLine, level: bool) -> io::Result<()> {
        let _ = level;
        Err(unsupported(format!("{:?} control", line)))
    }
}

pub(crate) fn unsupported(what: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, what.into())
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Native backend built on the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSerial;

impl PlatformSerial for NativeSerial {
    fn name(&self) -> &str {
        "native"
    }

    fn open(&self, config: &SerialConfig) -> io::Result<Box<dyn PlatformPort>> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.timeout.read_constant as u64))
            .open()
            .map_err(io::Error::from)?;

        let mut native = NativePort { port };
        native.configure(config)?;
        Ok(Box::new(native))
    }
}

/// Open device handle from the `serialport` crate
pub struct NativePort {
    port: Box<dyn SerialPort>,
}

impl NativePort {
    /// Wrap an already-open `serialport` handle
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

fn data_bits(size: ByteSize) -> serialport::DataBits {
    match size {
        ByteSize::Five => serialport::DataBits::Five,
        ByteSize::Six => serialport::DataBits::Six,
        ByteSize::Seven => serialport::DataBits::Seven,
        ByteSize::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> io::Result<serialport::Parity> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => {
            Err(unsupported(format!("{:?} parity", parity)))
        }
    }
}

fn stop_bits(bits: StopBits) -> io::Result<serialport::StopBits> {
    match bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(unsupported("1.5 stop bits")),
    }
}

fn flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}

impl PlatformPort for NativePort {
    fn configure(&mut self, config: &SerialConfig) -> io::Result<()> {
        let parity = parity(config.parity)?;
        let stop_bits = stop_bits(config.stop_bits)?;

        self.port.set_baud_rate(config.baud_rate)?;
        self.port.set_data_bits(data_bits(config.byte_size))?;
        self.port.set_parity(parity)?;
        self.port.set_stop_bits(stop_bits)?;
        self.port.set_flow_control(flow_control(config.flow_control))?;

        // Keep DTR asserted so the device sees a host on the line
        if let Err(e) = self.port.write_data_terminal_ready(true) {
            tracing::debug!("configure: failed to set DTR high: {} (continuing)", e);
        }
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.port.set_timeout(timeout)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.port.set_timeout(timeout)?;
        match self.port.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
        let which = match buffer {
            ClearBuffer::Input => serialport::ClearBuffer::Input,
            ClearBuffer::Output => serialport::ClearBuffer::Output,
            ClearBuffer::All => serialport::ClearBuffer::All,
        };
        self.port.clear(which)?;
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn PlatformPort>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(NativePort { port }))
    }

    fn read_status(&mut self, line: StatusLine) -> io::Result<bool> {
        let level = match line {
            StatusLine::Cts => self.port.read_clear_to_send()?,
            StatusLine::Dsr => self.port.read_data_set_ready()?,
            StatusLine::Ri => self.port.read_ring_indicator()?,
            StatusLine::Cd => self.port.read_carrier_detect()?,
        };
        Ok(level)
    }

    fn set_control(&mut self, line: ControlLine, level: bool) -> io::Result<()> {
        match line {
            ControlLine::Rts => self.port.write_request_to_send(level)?,
            ControlLine::Dtr => self.port.write_data_terminal_ready(level)?,
            ControlLine::Break if level => self.port.set_break()?,
            ControlLine::Break => self.port.clear_break()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_line_settings() {
        assert_eq!(
            parity(Parity::Mark).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
        assert_eq!(
            stop_bits(StopBits::OnePointFive).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
        assert_eq!(parity(Parity::Even).unwrap(), serialport::Parity::Even);
        assert_eq!(stop_bits(StopBits::Two).unwrap(), serialport::StopBits::Two);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let config = SerialConfig::new("/dev/stationlink-does-not-exist", 4800);
        assert!(NativeSerial.open(&config).is_err());
    }
}
