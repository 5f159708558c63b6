//! Acquisition loop
//!
//! Drives one instrument: read (or request) a line, decode it, append the
//! record, sleep, repeat until the cancellation token fires. The sleep must
//! stay shorter than the read timeout so every read starts with a fresh
//! window.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::datalog::{RecordFormat, RecordSink, SinkError};
use crate::protocol::{
    Command, CommandDecoder, ControlSample, DecodeError, Decoded, DecodedSample, LineDecoder,
    SentenceDecoder, WIMDA,
};
use crate::transport::platform::{NativeSerial, PlatformSerial};
use crate::transport::{
    sleep_unless_cancelled, LineReader, ReconnectSynchronizer, SerialConfig, SerialTransport,
    SyncOutcome, Timeout, TransportError, DEFAULT_MAX_LINE,
};

/// Port used when none is given
#[cfg(windows)]
pub const DEFAULT_PORT: &str = "COM6";
/// Port used when none is given
#[cfg(not(windows))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Read and write timeout of both instruments
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

const CR: &str = "\r";
const CR_LF: &str = "\r\n";

/// Hard failures of the acquisition loop
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// Serial link failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Output failure
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Config file unreadable
    #[error("Can't read config file {path}: {source}")]
    ConfigRead {
        /// Config file
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// Config file is not valid JSON for this config
    #[error("Can't parse config file {path}: {source}")]
    ConfigParse {
        /// Config file
        path: PathBuf,
        /// Cause
        #[source]
        source: serde_json::Error,
    },
}

/// Instrument protocol spoken on the link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Weather station streaming `$WIMDA` sentences
    #[default]
    Weather,
    /// Nozzle controller polled with `*PX0` / `*BX0`
    Nozzle,
}

impl Protocol {
    /// Baud rate the instrument ships with
    pub fn default_baud_rate(&self) -> u32 {
        match self {
            Protocol::Weather => 4800,
            Protocol::Nozzle => 38400,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Weather => f.write_str("weather"),
            Protocol::Nozzle => f.write_str("nozzle"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weather" | "wimda" => Ok(Protocol::Weather),
            "nozzle" | "weedit" => Ok(Protocol::Nozzle),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// Everything the loop needs besides the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Instrument protocol
    pub protocol: Protocol,
    /// Serial link settings
    pub serial: SerialConfig,
    /// Cap on a single response line
    pub max_line: usize,
    /// Terminator of protocol lines
    pub response_eol: String,
    /// Terminator of the extra line framing a `*BX0` reply
    pub extra_eol: String,
    /// Terminator written after each record
    pub record_eol: String,
    /// Pause after a productive iteration, in milliseconds
    pub sleep_ms: u64,
    /// Pause after an iteration that produced nothing, in milliseconds
    pub idle_sleep_ms: u64,
    /// Wait for the device to stream before the first read
    pub synchronize: bool,
}

impl AcquisitionConfig {
    /// Defaults for `protocol`
    pub fn for_protocol(protocol: Protocol) -> Self {
        let serial = SerialConfig::new(DEFAULT_PORT, protocol.default_baud_rate())
            .with_timeout(Timeout::simple(DEFAULT_TIMEOUT_MS));
        match protocol {
            Protocol::Weather => Self {
                protocol,
                serial,
                max_line: DEFAULT_MAX_LINE,
                response_eol: CR.to_string(),
                extra_eol: CR_LF.to_string(),
                record_eol: CR_LF.to_string(),
                sleep_ms: 500,
                idle_sleep_ms: 200,
                synchronize: true,
            },
            // The controller only talks when asked, so there is nothing to
            // synchronize on
            Protocol::Nozzle => Self {
                protocol,
                serial,
                max_line: DEFAULT_MAX_LINE,
                response_eol: CR.to_string(),
                extra_eol: CR_LF.to_string(),
                record_eol: CR.to_string(),
                sleep_ms: 500,
                idle_sleep_ms: 500,
                synchronize: false,
            },
        }
    }

    /// Load a JSON config. Missing fields take the defaults of the protocol
    /// the file names, or the weather defaults when it names none.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AcquisitionError> {
        Self::load(path.as_ref(), None)
    }

    /// Load a JSON config for `protocol`, whatever protocol the file names.
    /// Missing fields take that protocol's defaults.
    pub fn from_file_with_protocol(
        path: impl AsRef<Path>,
        protocol: Protocol,
    ) -> Result<Self, AcquisitionError> {
        Self::load(path.as_ref(), Some(protocol))
    }

    fn load(path: &Path, protocol: Option<Protocol>) -> Result<Self, AcquisitionError> {
        let text = fs::read_to_string(path).map_err(|source| AcquisitionError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, protocol).map_err(|source| AcquisitionError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `text` on the defaults of its protocol
    fn from_json(text: &str, protocol: Option<Protocol>) -> Result<Self, serde_json::Error> {
        let mut patch: Value = serde_json::from_str(text)?;
        let protocol = match protocol {
            Some(protocol) => protocol,
            None => match patch.get("protocol") {
                Some(named) => Protocol::deserialize(named)?,
                None => Protocol::default(),
            },
        };
        if let Value::Object(fields) = &mut patch {
            fields.insert("protocol".to_string(), serde_json::to_value(protocol)?);
        }

        let mut merged = serde_json::to_value(Self::for_protocol(protocol))?;
        overlay(&mut merged, patch);
        serde_json::from_value(merged)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<(), TransportError> {
        self.serial.validate()?;
        if self.max_line == 0 {
            return Err(TransportError::InvalidConfig(
                "max line size must be positive".to_string(),
            ));
        }
        if self.response_eol.is_empty() || self.extra_eol.is_empty() {
            return Err(TransportError::InvalidConfig(
                "end-of-line markers must not be empty".to_string(),
            ));
        }
        let read_timeout = u64::from(self.serial.timeout.read_constant);
        let longest_sleep = self.sleep_ms.max(self.idle_sleep_ms);
        if longest_sleep >= read_timeout {
            return Err(TransportError::InvalidConfig(format!(
                "sleep interval {} ms must be shorter than the read timeout {} ms",
                longest_sleep, read_timeout
            )));
        }
        Ok(())
    }
}

/// Recursively replace the fields of `base` present in `patch`
fn overlay(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                overlay(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self::for_protocol(Protocol::Weather)
    }
}

/// Counters kept by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AcquisitionStats {
    /// Non-empty protocol lines read
    pub lines: u64,
    /// Samples written to the sink
    pub samples: u64,
    /// Sentences of other types
    pub ignored: u64,
    /// Lines or characters that failed to decode
    pub decode_errors: u64,
}

/// What a processed line amounted to
enum LineOutcome {
    Sample,
    Nothing,
}

/// Acquisition loop over one transport and one sink
pub struct Acquisition<S: RecordSink> {
    config: AcquisitionConfig,
    transport: SerialTransport,
    sink: S,
    format: RecordFormat,
    sentence: SentenceDecoder,
    param: CommandDecoder,
    nozzle: CommandDecoder,
    stats: AcquisitionStats,
    shut_down: bool,
}

impl<S: RecordSink> Acquisition<S> {
    /// Loop over the native serial backend
    pub fn new(config: AcquisitionConfig, sink: S) -> Result<Self, AcquisitionError> {
        Self::with_platform(config, sink, Box::new(NativeSerial))
    }

    /// Loop over a specific platform backend
    pub fn with_platform(
        config: AcquisitionConfig,
        sink: S,
        platform: Box<dyn PlatformSerial>,
    ) -> Result<Self, AcquisitionError> {
        config.validate()?;
        let transport = SerialTransport::with_platform(config.serial.clone(), platform);
        Ok(Self {
            format: RecordFormat::new(config.record_eol.clone()),
            sentence: SentenceDecoder::new(WIMDA, config.response_eol.clone()),
            param: CommandDecoder::new(Command::ParamReport, config.response_eol.clone()),
            nozzle: CommandDecoder::new(Command::NozzleActivity, config.response_eol.clone()),
            config,
            transport,
            sink,
            stats: AcquisitionStats::default(),
            shut_down: false,
        })
    }

    /// Loop configuration
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Underlying transport
    pub fn transport(&self) -> &SerialTransport {
        &self.transport
    }

    /// Output sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Counters so far
    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    /// Open the port unless it already is and, if configured, wait for the
    /// device to stream. [`run`](Self::run) calls this itself.
    ///
    /// Returns false when cancelled while waiting.
    pub fn start(&mut self, cancel: &CancellationToken) -> Result<bool, AcquisitionError> {
        if !self.transport.is_open() {
            tracing::info!(
                "Opening port {} @ {} bps ({})",
                self.config.serial.port,
                self.config.serial.baud_rate,
                self.config.protocol
            );
            self.transport.open()?;
        }

        if self.config.synchronize {
            let outcome = ReconnectSynchronizer::new(&self.transport).synchronize(Some(cancel))?;
            if let SyncOutcome::Cancelled { .. } = outcome {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run until `cancel` fires or a hard failure occurs, then shut down.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<AcquisitionStats, AcquisitionError> {
        let result = self.run_loop(cancel);
        let closed = self.shutdown();
        result?;
        closed?;
        Ok(self.stats)
    }

    fn run_loop(&mut self, cancel: &CancellationToken) -> Result<(), AcquisitionError> {
        if !self.start(cancel)? {
            return Ok(());
        }
        tracing::info!("Import started");

        while !cancel.is_cancelled() {
            let pause = self.poll_once()?;
            if !sleep_unless_cancelled(pause, Some(cancel)) {
                break;
            }
        }
        Ok(())
    }

    /// One iteration of the loop; returns how long to pause afterwards
    pub fn poll_once(&mut self) -> Result<Duration, AcquisitionError> {
        let produced = match self.config.protocol {
            Protocol::Weather => self.poll_weather()?,
            Protocol::Nozzle => self.poll_nozzle()?,
        };
        let ms = match produced {
            LineOutcome::Sample => self.config.sleep_ms,
            LineOutcome::Nothing => self.config.idle_sleep_ms,
        };
        Ok(Duration::from_millis(ms))
    }

    fn read_line(&self, eol: &str) -> Result<String, TransportError> {
        let raw = LineReader::new(&self.transport).read_line(self.config.max_line, eol.as_bytes())?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    fn poll_weather(&mut self) -> Result<LineOutcome, AcquisitionError> {
        let line = self.read_line(&self.config.response_eol)?;
        if line.is_empty() {
            tracing::debug!("no data within the read timeout");
            return Ok(LineOutcome::Nothing);
        }
        let decoded = self.sentence.decode(&line);
        self.process(&line, decoded, "NMEA")
    }

    fn request(&self, command: Command) -> Result<bool, AcquisitionError> {
        let request = command.request();
        let written = self.transport.write(&request)?;
        if written < request.len() {
            tracing::warn!("{} request truncated ({} of {} bytes)", command, written, request.len());
        }
        Ok(written > 0)
    }

    fn poll_nozzle(&mut self) -> Result<LineOutcome, AcquisitionError> {
        let mut outcome = LineOutcome::Nothing;

        if self.request(Command::ParamReport)? {
            let line = self.read_line(&self.config.response_eol)?;
            let decoded = self.param.decode(&line);
            if let LineOutcome::Sample = self.process(&line, decoded, Command::ParamReport.id())? {
                outcome = LineOutcome::Sample;
            }
        }

        if self.request(Command::NozzleActivity)? {
            let _echo = self.read_line(&self.config.extra_eol)?;
            let line = self.read_line(&self.config.response_eol)?;
            let decoded = self.nozzle.decode(&line);
            if let LineOutcome::Sample = self.process(&line, decoded, Command::NozzleActivity.id())? {
                outcome = LineOutcome::Sample;
            }
        }

        let _trailer = self.read_line(&self.config.extra_eol)?;
        Ok(outcome)
    }

    fn process(
        &mut self,
        line: &str,
        decoded: Result<Decoded, DecodeError>,
        what: &str,
    ) -> Result<LineOutcome, AcquisitionError> {
        tracing::debug!("{} response [{}]", what, line.escape_debug());
        if !line.is_empty() {
            self.stats.lines += 1;
        }

        match decoded {
            Ok(Decoded::Sample(sample)) => {
                self.report_invalid(&sample, what);
                let records = self.format.render(&sample, &Local::now());
                self.sink.append(&records)?;
                self.stats.samples += 1;
                Ok(LineOutcome::Sample)
            }
            Ok(Decoded::Ignored(tag)) => {
                tracing::debug!("{}: ignoring sentence [{}]", what, tag);
                self.stats.ignored += 1;
                Ok(LineOutcome::Nothing)
            }
            Err(e) => {
                tracing::warn!("{}: {}, ignoring line", what, e);
                self.stats.decode_errors += 1;
                Ok(LineOutcome::Nothing)
            }
        }
    }

    fn report_invalid(&mut self, sample: &DecodedSample, what: &str) {
        if let DecodedSample::Control(ControlSample::NozzleReport { invalid, .. }) = sample {
            for e in invalid {
                tracing::error!("{}: {}", what, e);
            }
            self.stats.decode_errors += invalid.len() as u64;
        }
    }

    /// Flush the sink, then flush, purge and close the port.
    ///
    /// Runs once; later calls return immediately. Transport errors during
    /// shutdown are logged, a sink flush failure is returned.
    pub fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let flushed = self.sink.flush();
        if self.transport.is_open() {
            if let Err(e) = self.transport.flush() {
                tracing::warn!("shutdown: flush failed: {}", e);
            }
            if let Err(e) = self.transport.purge() {
                tracing::warn!("shutdown: purge failed: {}", e);
            }
        }
        self.transport.close();
        tracing::info!(
            "Import stopped: {} lines, {} samples, {} ignored, {} decode errors",
            self.stats.lines,
            self.stats.samples,
            self.stats.ignored,
            self.stats.decode_errors
        );
        flushed?;
        Ok(())
    }
}

impl<S: RecordSink> Drop for Acquisition<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("shutdown on drop failed: {}", e);
        }
    }
}
