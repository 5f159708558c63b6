//! Sentence protocol
//!
//! ```text
//! $WIMDA,30.2269,I,1.0236,B,13.8,C,,,45.9,,2.3,C,80.6,T,69.7,M,1.2,N,0.6,M*53
//!        0       1 2      3 4    5 6 7 8   9 10 11 12 13 14 15 16 17 18 19
//! ```
//!
//! Indices count fields after the tag. The checksum after `*` stays glued to
//! the last field and is not checked.

use super::{Decoded, DecodeError, DecodedSample, LineDecoder, WeatherSample, ABSENT};
use crate::fields::{parse_or, remove_all, replace_first, split_fields};

/// Meteorological composite sentence
pub const WIMDA: &str = "WIMDA";

/// Fields required after the tag
pub const MIN_FIELDS: usize = 20;

const START_MARKER: char = '$';
const DATA_DELIMITER: char = ',';

const BAR_PRESSURE: usize = 2;
const AIR_TEMP: usize = 4;
const REL_HUMIDITY: usize = 8;
const WIND_DIR_TRUE: usize = 12;
const WIND_SPEED: usize = 18;

/// Decoder for `$TAG,f0,f1,...` sentences
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceDecoder {
    tag: String,
    eol: String,
}

impl SentenceDecoder {
    /// Decoder accepting `tag` sentences terminated by `eol`
    pub fn new(tag: impl Into<String>, eol: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            eol: eol.into(),
        }
    }

    /// WIMDA sentences terminated by a carriage return
    pub fn wimda() -> Self {
        Self::new(WIMDA, "\r")
    }

    /// Expected sentence tag
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

fn reading(fields: &[&str], index: usize) -> Option<f64> {
    let value = parse_or(fields[index], ABSENT);
    if value == ABSENT {
        None
    } else {
        Some(value)
    }
}

impl LineDecoder for SentenceDecoder {
    fn decode(&self, line: &str) -> Result<Decoded, DecodeError> {
        let line = remove_all(line, &self.eol);
        // The station sometimes doubles the start marker
        let line = replace_first(&line, "$$", "$").unwrap_or(line);

        let segments = split_fields(&line, START_MARKER);
        if segments.len() < 2 {
            return Err(DecodeError::MalformedLine);
        }

        let mut fields = split_fields(segments[1], DATA_DELIMITER);
        if fields.first().copied() != Some(self.tag.as_str()) {
            return Ok(Decoded::Ignored(
                fields.first().map(|t| t.to_string()).unwrap_or_default(),
            ));
        }
        fields.remove(0);

        if fields.len() < MIN_FIELDS {
            return Err(DecodeError::ColumnCountMismatch {
                expected: MIN_FIELDS,
                found: fields.len(),
            });
        }

        Ok(Decoded::Sample(DecodedSample::Weather(WeatherSample {
            bar_pressure: reading(&fields, BAR_PRESSURE),
            air_temp: reading(&fields, AIR_TEMP),
            rel_humidity: reading(&fields, REL_HUMIDITY),
            wind_dir_true: reading(&fields, WIND_DIR_TRUE),
            wind_speed: reading(&fields, WIND_SPEED),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LINE: &str = "$WIMDA,30.2269,I,1.0236,B,13.8,C,,,45.9,,2.3,C,80.6,T,69.7,M,1.2,N,0.6,M*53";

    fn weather(decoded: Decoded) -> WeatherSample {
        match decoded {
            Decoded::Sample(DecodedSample::Weather(sample)) => sample,
            other => panic!("expected a weather sample, got {:?}", other),
        }
    }

    #[test]
    fn test_fixed_indices() {
        let sample = weather(SentenceDecoder::wimda().decode(LINE).unwrap());
        assert_eq!(
            sample.values(),
            [Some(1.0236), Some(13.8), Some(45.9), Some(80.6), Some(0.6)]
        );
    }

    #[test]
    fn test_marker_and_prefix_stripped() {
        let decoder = SentenceDecoder::wimda();
        let noisy = format!("2016-08-27 10:20\t${}\r", LINE);
        assert_eq!(
            decoder.decode(&noisy).unwrap(),
            decoder.decode(LINE).unwrap()
        );
    }

    #[test]
    fn test_empty_fields_are_absent() {
        let line = format!("$WIMDA{}", ",".repeat(MIN_FIELDS + 1));
        let sample = weather(SentenceDecoder::wimda().decode(&line).unwrap());
        assert_eq!(sample, WeatherSample::default());
    }

    #[test]
    fn test_other_tag_ignored() {
        let decoded = SentenceDecoder::wimda()
            .decode("$GPGSA,A,3,12,5,29,24,21,2,25,20,31,,,,1.7,1.0,1.4*3D\r")
            .unwrap();
        assert_eq!(decoded, Decoded::Ignored("GPGSA".to_string()));
    }

    #[test]
    fn test_malformed() {
        let decoder = SentenceDecoder::wimda();
        assert_eq!(decoder.decode("WIMDA,1,2"), Err(DecodeError::MalformedLine));
        assert_eq!(decoder.decode(""), Err(DecodeError::MalformedLine));
        assert_eq!(decoder.decode("\r"), Err(DecodeError::MalformedLine));
    }

    #[test]
    fn test_short_sentence() {
        assert_eq!(
            SentenceDecoder::wimda().decode("$WIMDA,30.2,I,1.02,B\r"),
            Err(DecodeError::ColumnCountMismatch {
                expected: MIN_FIELDS,
                found: 4
            })
        );
    }
}
