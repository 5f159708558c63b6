//! Connection management
//!
//! Owns the platform handle and its configuration. Reads and writes take
//! independent locks so one thread can read while another writes; anything
//! that touches the whole link (open, close, reconfigure, purge) takes the
//! read lock and then the write lock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::config::{ByteSize, FlowControl, Parity, SerialConfig, StopBits, Timeout};
use super::platform::{
    ClearBuffer, ControlLine, NativeSerial, PlatformPort, PlatformSerial, StatusLine,
};
use super::{TransportError, SETTLE_DELAY_MS};

/// Largest chunk pulled from the driver by a single byte request
const READ_AHEAD_SIZE: usize = 64;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No platform handle
    Closed,
    /// Handle acquired and configured
    Open,
    /// An I/O error made the handle unusable; only `close()` is legal
    Faulted,
}

/// Cumulative traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounters {
    /// Bytes received
    pub rx_bytes: u64,
    /// Bytes written
    pub tx_bytes: u64,
    /// Successful opens, recovery cycles included
    pub opens: u64,
}

pub(crate) struct ReadHalf {
    port: Option<Box<dyn PlatformPort>>,
    /// Bytes pulled from the driver but not yet handed out
    pending: VecDeque<u8>,
}

pub(crate) struct WriteHalf {
    port: Option<Box<dyn PlatformPort>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serial link with independent read and write paths
pub struct SerialTransport {
    platform: Box<dyn PlatformSerial>,
    config: Mutex<SerialConfig>,
    state: Mutex<ConnectionState>,
    reader: Mutex<ReadHalf>,
    writer: Mutex<WriteHalf>,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    opens: AtomicU64,
}

impl SerialTransport {
    /// Create a closed transport using the native serial backend
    pub fn new(config: SerialConfig) -> Self {
        Self::with_platform(config, Box::new(NativeSerial))
    }

    /// Create a closed transport on top of a specific platform backend
    pub fn with_platform(config: SerialConfig, platform: Box<dyn PlatformSerial>) -> Self {
        Self {
            platform,
            config: Mutex::new(config),
            state: Mutex::new(ConnectionState::Closed),
            reader: Mutex::new(ReadHalf {
                port: None,
                pending: VecDeque::new(),
            }),
            writer: Mutex::new(WriteHalf { port: None }),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            opens: AtomicU64::new(0),
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Check whether the link is open
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SerialConfig {
        lock(&self.config).clone()
    }

    /// Port identifier
    pub fn port(&self) -> String {
        lock(&self.config).port.clone()
    }

    /// Configured baud rate
    pub fn baud_rate(&self) -> u32 {
        lock(&self.config).baud_rate
    }

    /// Configured timeouts
    pub fn timeout(&self) -> Timeout {
        lock(&self.config).timeout
    }

    /// Backend name
    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    /// Get cumulative traffic counters
    pub fn counters(&self) -> LinkCounters {
        LinkCounters {
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            _ => Err(TransportError::NotOpen),
        }
    }

    /// Map a platform error, faulting the link on real I/O failures
    fn fault(&self, err: &io::Error) -> TransportError {
        let mapped = TransportError::io(&self.port(), err);
        if mapped.is_fatal_io() {
            tracing::error!("serial link faulted: {}", mapped);
            self.set_state(ConnectionState::Faulted);
        }
        mapped
    }

    pub(crate) fn lock_both(&self) -> (MutexGuard<'_, ReadHalf>, MutexGuard<'_, WriteHalf>) {
        let reader = lock(&self.reader);
        let writer = lock(&self.writer);
        (reader, writer)
    }

    pub(crate) fn open_locked(
        &self,
        reader: &mut ReadHalf,
        writer: &mut WriteHalf,
    ) -> Result<(), TransportError> {
        let config = self.config();
        config.validate()?;
        match self.state() {
            ConnectionState::Open => return Err(TransportError::AlreadyOpen),
            ConnectionState::Faulted => return Err(TransportError::Faulted),
            ConnectionState::Closed => {}
        }

        let mut port = self
            .platform
            .open(&config)
            .map_err(|e| TransportError::io(&config.port, &e))?;
        port.clear(ClearBuffer::All)
            .map_err(|e| TransportError::io(&config.port, &e))?;
        let write_port = port
            .try_clone()
            .map_err(|e| TransportError::io(&config.port, &e))?;

        thread::sleep(Duration::from_millis(SETTLE_DELAY_MS));

        reader.port = Some(port);
        reader.pending.clear();
        writer.port = Some(write_port);
        self.set_state(ConnectionState::Open);
        self.opens.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "opened {} @ {} bps via {} backend",
            config.port,
            config.baud_rate,
            self.platform.name()
        );
        Ok(())
    }

    pub(crate) fn close_locked(&self, reader: &mut ReadHalf, writer: &mut WriteHalf) {
        let had_handle = reader.port.is_some() || writer.port.is_some();
        reader.port = None;
        reader.pending.clear();
        writer.port = None;
        self.set_state(ConnectionState::Closed);
        if had_handle {
            tracing::debug!("closed {}", self.port());
        }
    }

    /// Acquire the device and apply the full configuration
    pub fn open(&self) -> Result<(), TransportError> {
        let (mut reader, mut writer) = self.lock_both();
        self.open_locked(&mut reader, &mut writer)
    }

    /// Release the device. Safe to call any number of times.
    pub fn close(&self) {
        let (mut reader, mut writer) = self.lock_both();
        self.close_locked(&mut reader, &mut writer);
    }

    /// Read up to `buf.len()` bytes.
    ///
    /// Blocks until the buffer is full, the read deadline passes or the
    /// inter-byte gap is exceeded. A short count is not an error.
    pub fn read_into(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut reader = lock(&self.reader);
        self.ensure_open()?;
        let timeout = self.timeout();
        let got = self.read_locked(&mut reader, buf, timeout)?;
        self.rx_bytes.fetch_add(got as u64, Ordering::Relaxed);
        Ok(got)
    }

    /// Read up to `max_bytes` bytes into a new buffer
    pub fn read(&self, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; max_bytes];
        let got = self.read_into(&mut buf)?;
        buf.truncate(got);
        Ok(buf)
    }

    fn read_locked(
        &self,
        half: &mut ReadHalf,
        buf: &mut [u8],
        timeout: Timeout,
    ) -> Result<usize, TransportError> {
        let mut got = 0;
        while got < buf.len() {
            match half.pending.pop_front() {
                Some(b) => {
                    buf[got] = b;
                    got += 1;
                }
                None => break,
            }
        }

        let port = half.port.as_mut().ok_or(TransportError::NotOpen)?;
        let start = Instant::now();
        let deadline = timeout.read_deadline(buf.len());
        let gap = timeout.inter_byte_gap();

        while got < buf.len() {
            let remaining = deadline.saturating_sub(start.elapsed());
            let wait = match gap {
                Some(gap) if got > 0 => remaining.min(gap),
                _ => remaining,
            };
            let n = port
                .read_timeout(&mut buf[got..], wait)
                .map_err(|e| self.fault(&e))?;
            if n == 0 {
                break;
            }
            got += n;
            if remaining.is_zero() {
                break;
            }
        }
        Ok(got)
    }

    pub(crate) fn lock_reader(&self) -> Result<ByteSource<'_>, TransportError> {
        let half = lock(&self.reader);
        self.ensure_open()?;
        let window = self.timeout().read_deadline(1);
        Ok(ByteSource {
            transport: self,
            half,
            window,
        })
    }

    /// Write `data`, blocking at most for the write deadline.
    ///
    /// Returns how many bytes the device accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut writer = lock(&self.writer);
        self.ensure_open()?;
        let deadline = self.timeout().write_deadline(data.len());
        let port = writer.port.as_mut().ok_or(TransportError::NotOpen)?;

        let start = Instant::now();
        let mut written = 0;
        while written < data.len() {
            let remaining = deadline.saturating_sub(start.elapsed());
            let n = port
                .write_timeout(&data[written..], remaining)
                .map_err(|e| self.fault(&e))?;
            if n == 0 {
                break;
            }
            written += n;
            if remaining.is_zero() {
                break;
            }
        }
        self.tx_bytes.fetch_add(written as u64, Ordering::Relaxed);
        Ok(written)
    }

    /// Bytes ready to be read without blocking; zero when closed
    pub fn available(&self) -> Result<usize, TransportError> {
        let mut reader = lock(&self.reader);
        self.available_locked(&mut reader)
    }

    pub(crate) fn available_locked(&self, half: &mut ReadHalf) -> Result<usize, TransportError> {
        if !self.is_open() {
            return Ok(0);
        }
        let buffered = match half.port.as_mut() {
            Some(port) => port.bytes_to_read().map_err(|e| self.fault(&e))?,
            None => 0,
        };
        Ok(half.pending.len() + buffered)
    }

    /// Block until at least one byte can be read or `timeout` passes
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool, TransportError> {
        let mut reader = lock(&self.reader);
        self.ensure_open()?;
        if !reader.pending.is_empty() {
            return Ok(true);
        }
        let port = reader.port.as_mut().ok_or(TransportError::NotOpen)?;
        let mut chunk = [0u8; READ_AHEAD_SIZE];
        let n = port
            .read_timeout(&mut chunk, timeout)
            .map_err(|e| self.fault(&e))?;
        reader.pending.extend(&chunk[..n]);
        Ok(n > 0)
    }

    /// Update one configuration field, re-applying it to a live handle
    fn reconfigure(&self, update: impl FnOnce(&mut SerialConfig)) -> Result<(), TransportError> {
        let (mut reader, _writer) = self.lock_both();
        let (previous, next) = {
            let mut config = lock(&self.config);
            let previous = config.clone();
            update(&mut config);
            (previous, config.clone())
        };

        if self.state() != ConnectionState::Open {
            return Ok(());
        }
        let port = reader.port.as_mut().ok_or(TransportError::NotOpen)?;
        if let Err(e) = port.configure(&next) {
            *lock(&self.config) = previous;
            return Err(self.fault(&e));
        }
        thread::sleep(Duration::from_millis(SETTLE_DELAY_MS));
        Ok(())
    }

    /// Change the port; an open link is closed and reopened on the new port
    pub fn set_port(&self, port: impl Into<String>) -> Result<(), TransportError> {
        let (mut reader, mut writer) = self.lock_both();
        let was_open = self.state() == ConnectionState::Open;
        if was_open {
            self.close_locked(&mut reader, &mut writer);
        }
        lock(&self.config).port = port.into();
        if was_open {
            self.open_locked(&mut reader, &mut writer)?;
        }
        Ok(())
    }

    /// Change the baud rate
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), TransportError> {
        if baud_rate == 0 {
            return Err(TransportError::InvalidConfig(
                "baud rate must be positive".to_string(),
            ));
        }
        self.reconfigure(|c| c.baud_rate = baud_rate)
    }

    /// Change the character size
    pub fn set_byte_size(&self, byte_size: ByteSize) -> Result<(), TransportError> {
        self.reconfigure(|c| c.byte_size = byte_size)
    }

    /// Change the parity mode
    pub fn set_parity(&self, parity: Parity) -> Result<(), TransportError> {
        self.reconfigure(|c| c.parity = parity)
    }

    /// Change the stop bits
    pub fn set_stop_bits(&self, stop_bits: StopBits) -> Result<(), TransportError> {
        self.reconfigure(|c| c.stop_bits = stop_bits)
    }

    /// Change the flow control mode
    pub fn set_flow_control(&self, flow_control: FlowControl) -> Result<(), TransportError> {
        self.reconfigure(|c| c.flow_control = flow_control)
    }

    /// Change the timeouts; they apply from the next read or write
    pub fn set_timeout(&self, timeout: Timeout) -> Result<(), TransportError> {
        let _guards = self.lock_both();
        lock(&self.config).timeout = timeout;
        Ok(())
    }

    pub(crate) fn flush_locked(&self, writer: &mut WriteHalf) -> Result<(), TransportError> {
        self.ensure_open()?;
        let port = writer.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.flush().map_err(|e| self.fault(&e))
    }

    pub(crate) fn purge_locked(
        &self,
        reader: &mut ReadHalf,
        _writer: &mut WriteHalf,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        reader.pending.clear();
        let port = reader.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.clear(ClearBuffer::All).map_err(|e| self.fault(&e))
    }

    /// Wait for pending output to be transmitted
    pub fn flush(&self) -> Result<(), TransportError> {
        let (_reader, mut writer) = self.lock_both();
        self.flush_locked(&mut writer)
    }

    /// Discard received but unread bytes
    pub fn flush_input(&self) -> Result<(), TransportError> {
        let mut reader = lock(&self.reader);
        self.ensure_open()?;
        reader.pending.clear();
        let port = reader.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.clear(ClearBuffer::Input).map_err(|e| self.fault(&e))
    }

    /// Discard bytes queued for transmission
    pub fn flush_output(&self) -> Result<(), TransportError> {
        let mut writer = lock(&self.writer);
        self.ensure_open()?;
        let port = writer.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.clear(ClearBuffer::Output).map_err(|e| self.fault(&e))
    }

    /// Drop everything in both directions
    pub fn purge(&self) -> Result<(), TransportError> {
        let (mut reader, mut writer) = self.lock_both();
        self.purge_locked(&mut reader, &mut writer)
    }

    fn status(&self, line: StatusLine) -> Result<bool, TransportError> {
        let mut writer = lock(&self.writer);
        self.ensure_open()?;
        let port = writer.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.read_status(line).map_err(|e| self.fault(&e))
    }

    fn control(&self, line: ControlLine, level: bool) -> Result<(), TransportError> {
        let mut writer = lock(&self.writer);
        self.ensure_open()?;
        let port = writer.port.as_mut().ok_or(TransportError::NotOpen)?;
        port.set_control(line, level).map_err(|e| self.fault(&e))
    }

    /// Clear To Send
    pub fn cts(&self) -> Result<bool, TransportError> {
        self.status(StatusLine::Cts)
    }

    /// Data Set Ready
    pub fn dsr(&self) -> Result<bool, TransportError> {
        self.status(StatusLine::Dsr)
    }

    /// Ring Indicator
    pub fn ri(&self) -> Result<bool, TransportError> {
        self.status(StatusLine::Ri)
    }

    /// Carrier Detect
    pub fn cd(&self) -> Result<bool, TransportError> {
        self.status(StatusLine::Cd)
    }

    /// Drive Request To Send
    pub fn set_rts(&self, level: bool) -> Result<(), TransportError> {
        self.control(ControlLine::Rts, level)
    }

    /// Drive Data Terminal Ready
    pub fn set_dtr(&self, level: bool) -> Result<(), TransportError> {
        self.control(ControlLine::Dtr, level)
    }

    /// Hold or release a break condition
    pub fn set_break(&self, level: bool) -> Result<(), TransportError> {
        self.control(ControlLine::Break, level)
    }

    /// Hold a break condition for `duration`, then release it
    pub fn send_break(&self, duration: Duration) -> Result<(), TransportError> {
        self.set_break(true)?;
        thread::sleep(duration);
        self.set_break(false)
    }

    /// Read `count` single bytes and describe each one, for line debugging
    pub fn dump(&self, count: usize) -> Result<Vec<String>, TransportError> {
        let mut lines = Vec::new();
        for i in 0..count {
            if let Some(&b) = self.read(1)?.first() {
                let shown = if (32..128).contains(&b) {
                    (b as char).to_string()
                } else {
                    "***".to_string()
                };
                lines.push(format!("{:02} - [{:02X}] = '{}'", i, b, shown));
            }
        }
        Ok(lines)
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read lock held for the duration of one framing call
pub(crate) struct ByteSource<'a> {
    transport: &'a SerialTransport,
    half: MutexGuard<'a, ReadHalf>,
    window: Duration,
}

impl ByteSource<'_> {
    /// Next byte, or `None` when none arrived within the one-byte deadline.
    ///
    /// Whatever else the driver had ready is kept for later calls.
    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>, TransportError> {
        if let Some(b) = self.half.pending.pop_front() {
            return Ok(Some(b));
        }
        self.transport.ensure_open()?;
        let port = self.half.port.as_mut().ok_or(TransportError::NotOpen)?;
        let mut chunk = [0u8; READ_AHEAD_SIZE];
        let n = port
            .read_timeout(&mut chunk, self.window)
            .map_err(|e| self.transport.fault(&e))?;
        if n == 0 {
            return Ok(None);
        }
        self.transport
            .rx_bytes
            .fetch_add(n as u64, Ordering::Relaxed);
        self.half.pending.extend(&chunk[1..n]);
        Ok(Some(chunk[0]))
    }
}
