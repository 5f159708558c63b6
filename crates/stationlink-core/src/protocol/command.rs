//! Command/response protocol
//!
//! The host writes `*PX0\r` or `*BX0\r`; the controller answers with the
//! command id, a colon and the payload:
//!
//! - `*PX0:X100,E100,F100`: variable parameters as letter-keyed tuples
//! - `*BX0:0101100...`: one `'0'`/`'1'` per nozzle across the boom

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ControlSample, Decoded, DecodeError, DecodedSample, LineDecoder, NozzleEntry};
use crate::fields::{parse_tuples, remove_all, split_fields, value_or};

/// Value used for a parameter the controller did not report
pub const DEFAULT_PARAM: i32 = 100;

/// Spacing between neighbouring nozzles
const NOZZLE_PITCH: i32 = 5;

const REQUEST_EOL: &str = "\r";

/// Requests understood by the nozzle controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Read variable parameters (`*PX0`)
    ParamReport,
    /// Read nozzle activity (`*BX0`)
    NozzleActivity,
}

impl Command {
    /// Command id as echoed in the response
    pub fn id(&self) -> &'static str {
        match self {
            Command::ParamReport => "*PX0",
            Command::NozzleActivity => "*BX0",
        }
    }

    /// Bytes to write to issue this request
    pub fn request(&self) -> Vec<u8> {
        format!("{}{}", self.id(), REQUEST_EOL).into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Decoder for the reply to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDecoder {
    command: Command,
    eol: String,
}

impl CommandDecoder {
    /// Decoder for replies to `command` terminated by `eol`
    pub fn new(command: Command, eol: impl Into<String>) -> Self {
        Self {
            command,
            eol: eol.into(),
        }
    }

    /// The command whose reply this decodes
    pub fn command(&self) -> Command {
        self.command
    }

    /// Strip the marker and split off the payload after the command id
    fn payload(&self, line: &str) -> Result<String, DecodeError> {
        let line = remove_all(line, &self.eol);
        let segments = split_fields(&line, ':');
        if segments.len() < 2 {
            return Err(DecodeError::MissingCommandId);
        }
        if segments[0] != self.command.id() {
            return Err(DecodeError::UnexpectedCommand {
                expected: self.command.id().to_string(),
                found: segments[0].to_string(),
            });
        }
        Ok(segments[1].to_string())
    }
}

fn param_report(payload: &str) -> ControlSample {
    let tuples = parse_tuples(payload, ',');
    ControlSample::ParamReport {
        x: value_or(&tuples, 'X', DEFAULT_PARAM),
        e: value_or(&tuples, 'E', DEFAULT_PARAM),
        f: value_or(&tuples, 'F', DEFAULT_PARAM),
    }
}

/// Position of nozzle `index` on a boom of `len` nozzles, centred on zero
fn nozzle_position(index: usize, len: usize) -> i32 {
    let centre = ((len as i32) + 1) / 2;
    ((index as i32) + 1 - centre) * NOZZLE_PITCH
}

fn nozzle_report(payload: &str) -> ControlSample {
    let len = payload.chars().count();
    let mut entries = Vec::with_capacity(len);
    let mut invalid = Vec::new();
    for (index, c) in payload.chars().enumerate() {
        let active = match c {
            '1' => true,
            '0' => false,
            found => {
                invalid.push(DecodeError::InvalidNozzleChar { index, found });
                continue;
            }
        };
        entries.push(NozzleEntry {
            position: nozzle_position(index, len),
            active,
        });
    }
    ControlSample::NozzleReport { entries, invalid }
}

impl LineDecoder for CommandDecoder {
    fn decode(&self, line: &str) -> Result<Decoded, DecodeError> {
        let payload = self.payload(line)?;
        let sample = match self.command {
            Command::ParamReport => param_report(&payload),
            Command::NozzleActivity => nozzle_report(&payload),
        };
        Ok(Decoded::Sample(DecodedSample::Control(sample)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn control(decoded: Decoded) -> ControlSample {
        match decoded {
            Decoded::Sample(DecodedSample::Control(sample)) => sample,
            other => panic!("expected a control sample, got {:?}", other),
        }
    }

    #[test]
    fn test_requests() {
        assert_eq!(Command::ParamReport.request(), b"*PX0\r");
        assert_eq!(Command::NozzleActivity.request(), b"*BX0\r");
        assert_eq!(Command::NozzleActivity.to_string(), "*BX0");
    }

    #[test]
    fn test_param_report() {
        let decoder = CommandDecoder::new(Command::ParamReport, "\r");
        assert_eq!(
            control(decoder.decode("*PX0:X100,E50,F0\r").unwrap()),
            ControlSample::ParamReport { x: 100, e: 50, f: 0 }
        );
        assert_eq!(
            control(decoder.decode("*PX0:E7").unwrap()),
            ControlSample::ParamReport {
                x: DEFAULT_PARAM,
                e: 7,
                f: DEFAULT_PARAM
            }
        );
    }

    #[test]
    fn test_nozzle_positions() {
        assert_eq!(nozzle_position(0, 5), -10);
        assert_eq!(nozzle_position(2, 5), 0);
        assert_eq!(nozzle_position(4, 5), 10);
        assert_eq!(nozzle_position(0, 4), -5);
        assert_eq!(nozzle_position(3, 4), 10);
    }

    #[test]
    fn test_bad_nozzle_char_is_skipped() {
        let decoder = CommandDecoder::new(Command::NozzleActivity, "\r");
        let sample = control(decoder.decode("*BX0:1x0\r").unwrap());
        assert_eq!(
            sample,
            ControlSample::NozzleReport {
                entries: vec![
                    NozzleEntry { position: -5, active: true },
                    NozzleEntry { position: 5, active: false },
                ],
                invalid: vec![DecodeError::InvalidNozzleChar { index: 1, found: 'x' }],
            }
        );
    }

    #[test]
    fn test_command_id_checks() {
        let decoder = CommandDecoder::new(Command::NozzleActivity, "\r");
        assert_eq!(decoder.decode("*BX0\r"), Err(DecodeError::MissingCommandId));
        assert_eq!(decoder.decode(""), Err(DecodeError::MissingCommandId));
        assert_eq!(
            decoder.decode("*PX0:X1"),
            Err(DecodeError::UnexpectedCommand {
                expected: "*BX0".to_string(),
                found: "*PX0".to_string()
            })
        );
    }
}
