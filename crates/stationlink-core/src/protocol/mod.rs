//! Instrument Protocols
//!
//! Stateless decoders for the two line protocols spoken by the supported
//! instruments:
//!
//! - a tagged, comma-delimited sentence format (`$WIMDA,...`) streamed by
//!   the weather station
//! - a command/response format (`*PX0:...`, `*BX0:...`) answered by the
//!   nozzle controller on request
//!
//! Decoders never fail the caller hard. A line either yields a sample, is
//! ignored because it belongs to another sentence type, or produces a
//! [`DecodeError`] that the caller logs before reading the next line.

mod command;
mod error;
mod sentence;

pub use command::{Command, CommandDecoder, DEFAULT_PARAM};
pub use error::DecodeError;
pub use sentence::{SentenceDecoder, MIN_FIELDS, WIMDA};

use serde::Serialize;

/// Value recorded for a field the instrument did not report
pub const ABSENT: f64 = -999.0;

/// One decoded meteorological reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeatherSample {
    /// Barometric pressure (bar)
    pub bar_pressure: Option<f64>,
    /// Air temperature (°C)
    pub air_temp: Option<f64>,
    /// Relative humidity (%)
    pub rel_humidity: Option<f64>,
    /// Wind direction, degrees true
    pub wind_dir_true: Option<f64>,
    /// Wind speed (m/s)
    pub wind_speed: Option<f64>,
}

impl WeatherSample {
    /// Fields in record order
    pub fn values(&self) -> [Option<f64>; 5] {
        [
            self.bar_pressure,
            self.air_temp,
            self.rel_humidity,
            self.wind_dir_true,
            self.wind_speed,
        ]
    }
}

/// State of one nozzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NozzleEntry {
    /// Offset from the boom centre
    pub position: i32,
    /// Whether the nozzle is spraying
    pub active: bool,
}

/// Replies from the nozzle controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControlSample {
    /// Variable parameters (`*PX0`)
    ParamReport {
        /// `X` parameter
        x: i32,
        /// `E` parameter
        e: i32,
        /// `F` parameter
        f: i32,
    },
    /// Nozzle activity (`*BX0`). `invalid` holds the characters that were
    /// skipped.
    NozzleReport {
        /// Valid nozzles, boom order
        entries: Vec<NozzleEntry>,
        /// Per-character decode failures
        #[serde(skip)]
        invalid: Vec<DecodeError>,
    },
}

/// A decoded line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecodedSample {
    /// Weather station reading
    Weather(WeatherSample),
    /// Nozzle controller reply
    Control(ControlSample),
}

/// Result of decoding a line that was well formed enough to classify
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The line carried a sample
    Sample(DecodedSample),
    /// The line belongs to another sentence type; carries its tag
    Ignored(String),
}

/// Decoder for one line protocol
pub trait LineDecoder {
    /// Decode one raw line, end-of-line marker optional
    fn decode(&self, line: &str) -> Result<Decoded, DecodeError>;
}
