//! Simulated serial device
//!
//! In-memory `PlatformSerial` used by tests and by demo mode. The device
//! keeps one receive queue shared by every handle it hands out, so the read
//! and write halves of a transport see the same line.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::config::{Parity, SerialConfig};
use super::platform::{ClearBuffer, ControlLine, PlatformPort, PlatformSerial, StatusLine};

type Source = Box<dyn FnMut() -> Vec<u8> + Send>;
type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// What the simulated device has been asked to do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimJournal {
    /// Port names passed to each successful open
    pub opened: Vec<String>,
    /// Configurations applied, at open and on every reconfigure
    pub configured: Vec<SerialConfig>,
    /// Number of primary handles released
    pub closes: usize,
    /// Number of buffer clears
    pub clears: usize,
    /// Number of output flushes
    pub flushes: usize,
    /// Control line changes, in order
    pub controls: Vec<(ControlLine, bool)>,
}

#[derive(Default)]
struct DeviceState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    source: Option<Source>,
    responder: Option<Responder>,
    silent_opens: usize,
    silent: bool,
    failing_opens: usize,
    fail_io: bool,
    rejected_parity: Vec<Parity>,
    journal: SimJournal,
}

impl DeviceState {
    /// Top up the receive queue from the streaming source
    fn refill(&mut self) {
        if self.silent || !self.rx.is_empty() {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            let chunk = source();
            self.rx.extend(chunk);
        }
    }

    fn check_io(&self) -> io::Result<()> {
        if self.fail_io {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated device lost"))
        } else {
            Ok(())
        }
    }

    fn check_config(&self, config: &SerialConfig) -> io::Result<()> {
        if self.rejected_parity.contains(&config.parity) {
            return Err(super::platform::unsupported(format!(
                "{:?} parity",
                config.parity
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Device {
    state: Mutex<DeviceState>,
    arrived: Condvar,
}

impl Device {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated serial device. Clones share the same device.
#[derive(Clone, Default)]
pub struct SimulatedSerial {
    device: Arc<Device>,
}

impl SimulatedSerial {
    /// Create an idle device with nothing to send
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the device had just sent them
    pub fn push_rx(&self, data: &[u8]) {
        self.device.lock().rx.extend(data.iter().copied());
        self.device.arrived.notify_all();
    }

    /// Continuous output, pulled whenever the receive queue runs dry
    pub fn set_source(&self, source: impl FnMut() -> Vec<u8> + Send + 'static) {
        self.device.lock().source = Some(Box::new(source));
    }

    /// Reply generator, called with every chunk the host writes
    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) {
        self.device.lock().responder = Some(Box::new(responder));
    }

    /// The next `count` opens succeed but the device stays mute
    pub fn silent_opens(&self, count: usize) {
        self.device.lock().silent_opens = count;
    }

    /// The next `count` opens fail as if the device were missing
    pub fn failing_opens(&self, count: usize) {
        self.device.lock().failing_opens = count;
    }

    /// Make every operation on open handles fail with a broken pipe
    pub fn fail_io(&self, fail: bool) {
        self.device.lock().fail_io = fail;
    }

    /// Report `parity` as unsupported when configuring
    pub fn reject_parity(&self, parity: Parity) {
        self.device.lock().rejected_parity.push(parity);
    }

    /// Drain everything the host has written so far
    pub fn take_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.device.lock().tx)
    }

    /// Snapshot of the call journal
    pub fn journal(&self) -> SimJournal {
        self.device.lock().journal.clone()
    }
}

impl PlatformSerial for SimulatedSerial {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&self, config: &SerialConfig) -> io::Result<Box<dyn PlatformPort>> {
        let mut state = self.device.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such device", config.port),
            ));
        }
        state.check_config(config)?;

        state.silent = state.silent_opens > 0;
        if state.silent {
            state.silent_opens -= 1;
        }
        state.journal.opened.push(config.port.clone());
        state.journal.configured.push(config.clone());

        Ok(Box::new(SimPort {
            device: Arc::clone(&self.device),
            primary: true,
        }))
    }
}

struct SimPort {
    device: Arc<Device>,
    primary: bool,
}

impl Drop for SimPort {
    fn drop(&mut self) {
        if self.primary {
            self.device.lock().journal.closes += 1;
        }
    }
}

impl PlatformPort for SimPort {
    fn configure(&mut self, config: &SerialConfig) -> io::Result<()> {
        let mut state = self.device.lock();
        state.check_io()?;
        state.check_config(config)?;
        state.journal.configured.push(config.clone());
        Ok(())
    }

    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.device.lock();
        loop {
            state.check_io()?;
            state.refill();
            if !state.silent && !state.rx.is_empty() {
                let n = buf.len().min(state.rx.len());
                for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            state = self
                .device
                .arrived
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn write_timeout(&mut self, buf: &[u8], _timeout: Duration) -> io::Result<usize> {
        let mut guard = self.device.lock();
        let state = &mut *guard;
        state.check_io()?;
        state.tx.extend_from_slice(buf);
        if let Some(responder) = state.responder.as_mut() {
            let reply = responder(buf);
            state.rx.extend(reply);
            self.device.arrived.notify_all();
        }
        Ok(buf.len())
    }

    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let mut state = self.device.lock();
        state.check_io()?;
        if state.silent {
            return Ok(0);
        }
        state.refill();
        Ok(state.rx.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.device.lock();
        state.check_io()?;
        state.journal.flushes += 1;
        Ok(())
    }

    fn clear(&mut self, buffer: ClearBuffer) -> io::Result<()> {
        let mut state = self.device.lock();
        state.check_io()?;
        if matches!(buffer, ClearBuffer::Input | ClearBuffer::All) {
            state.rx.clear();
        }
        state.journal.clears += 1;
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn PlatformPort>> {
        Ok(Box::new(SimPort {
            device: Arc::clone(&self.device),
            primary: false,
        }))
    }

    fn read_status(&mut self, line: StatusLine) -> io::Result<bool> {
        let state = self.device.lock();
        state.check_io()?;
        match line {
            StatusLine::Cts | StatusLine::Dsr => Ok(true),
            StatusLine::Ri => Ok(false),
            StatusLine::Cd => Err(super::platform::unsupported("carrier detect")),
        }
    }

    fn set_control(&mut self, line: ControlLine, level: bool) -> io::Result<()> {
        let mut state = self.device.lock();
        state.check_io()?;
        state.journal.controls.push((line, level));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn open(sim: &SimulatedSerial) -> Box<dyn PlatformPort> {
        sim.open(&SerialConfig::new("SIM0", 4800)).unwrap()
    }

    #[test]
    fn test_clones_share_the_device() {
        let sim = SimulatedSerial::new();
        let mut reader = open(&sim);
        let mut writer = reader.try_clone().unwrap();
        sim.set_responder(|req| req.iter().rev().copied().collect());

        writer.write_timeout(b"abc", Duration::ZERO).unwrap();
        let mut buf = [0u8; 8];
        let n = reader.read_timeout(&mut buf, Duration::ZERO).unwrap();
        assert_eq!(&buf[..n], b"cba");
        assert_eq!(sim.take_tx(), b"abc");
    }

    #[test]
    fn test_silent_open_hides_source() {
        let sim = SimulatedSerial::new();
        sim.set_source(|| b"$WIMDA\r".to_vec());
        sim.silent_opens(1);

        let mut mute = open(&sim);
        assert_eq!(mute.bytes_to_read().unwrap(), 0);
        drop(mute);

        let mut live = open(&sim);
        assert_eq!(live.bytes_to_read().unwrap(), 7);
        assert_eq!(sim.journal().closes, 1);
    }

    #[test]
    fn test_failing_opens_count_down() {
        let sim = SimulatedSerial::new();
        sim.failing_opens(1);
        let config = SerialConfig::new("SIM0", 4800);
        assert_eq!(
            sim.open(&config).err().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
        assert!(sim.open(&config).is_ok());
    }

    #[test]
    fn test_read_waits_for_pushed_bytes() {
        let sim = SimulatedSerial::new();
        let mut port = open(&sim);
        let pusher = sim.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            pusher.push_rx(b"x");
        });
        let mut buf = [0u8; 1];
        let n = port.read_timeout(&mut buf, Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(n, 1);
        assert_eq!(buf[0], b'x');
    }
}
