//! Record layouts
//!
//! Every record is a `;`-separated line. Weather records end with the
//! epoch timestamp in milliseconds; controller records start with the local
//! date and time to the centisecond.

use chrono::{DateTime, TimeZone};
use std::fmt::{self, Write};

use crate::protocol::{ControlSample, DecodedSample, WeatherSample, ABSENT};

/// Field separator
pub const SEPARATOR: char = ';';

/// Renders decoded samples as output records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFormat {
    eol: String,
}

impl RecordFormat {
    /// Records terminated by `eol`
    pub fn new(eol: impl Into<String>) -> Self {
        Self { eol: eol.into() }
    }

    /// Record terminator
    pub fn eol(&self) -> &str {
        &self.eol
    }

    /// Render `sample` as one or more records stamped with `at`.
    ///
    /// A nozzle report yields one record per nozzle, so the result may hold
    /// several lines.
    pub fn render<Tz: TimeZone>(&self, sample: &DecodedSample, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        let mut out = String::new();
        match sample {
            DecodedSample::Weather(weather) => self.weather(&mut out, weather, at),
            DecodedSample::Control(ControlSample::ParamReport { x, e, f }) => {
                let _ = write!(out, "{};{};{};{}{}", stamp(at), x, e, f, self.eol);
            }
            DecodedSample::Control(ControlSample::NozzleReport { entries, .. }) => {
                let stamp = stamp(at);
                for entry in entries {
                    let _ = write!(
                        out,
                        "{};{};{}{}",
                        stamp,
                        entry.position,
                        u8::from(entry.active),
                        self.eol
                    );
                }
            }
        }
        out
    }

    fn weather<Tz: TimeZone>(&self, out: &mut String, sample: &WeatherSample, at: &DateTime<Tz>) {
        for value in sample.values() {
            let _ = write!(out, "{}{}", value.unwrap_or(ABSENT), SEPARATOR);
        }
        let _ = write!(out, "{}{}", at.timestamp_millis(), self.eol);
    }
}

/// `YYYY-MM-DD;HH:MM:SS.cc` in the timestamp's own zone
pub fn stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    let centis = (at.timestamp_subsec_millis() / 10).min(99);
    format!("{}.{:02}", at.format("%Y-%m-%d;%H:%M:%S"), centis)
}
