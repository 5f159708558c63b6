//! Serial link configuration
//!
//! Line settings and the five-part timeout model applied to a transport.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{TransportError, DEFAULT_BAUD_RATE};

/// Read and write timeouts, all in milliseconds
///
/// The read deadline for a call requesting `n` bytes is
/// `read_constant + read_multiplier * n`; a gap longer than `inter_byte`
/// between two received bytes also ends the read. Setting `inter_byte` to
/// [`Timeout::MAX`] disables the gap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeout {
    /// Maximum gap between consecutive bytes
    pub inter_byte: u32,
    /// Constant part of the read deadline
    pub read_constant: u32,
    /// Per-requested-byte part of the read deadline
    pub read_multiplier: u32,
    /// Constant part of the write deadline
    pub write_constant: u32,
    /// Per-byte part of the write deadline
    pub write_multiplier: u32,
}

impl Timeout {
    /// Sentinel that disables the inter-byte check
    pub const MAX: u32 = u32::MAX;

    /// Create a timeout from its five components
    pub fn new(
        inter_byte: u32,
        read_constant: u32,
        read_multiplier: u32,
        write_constant: u32,
        write_multiplier: u32,
    ) -> Self {
        Self {
            inter_byte,
            read_constant,
            read_multiplier,
            write_constant,
            write_multiplier,
        }
    }

    /// Same constant for reads and writes, no multipliers, no gap check
    pub fn simple(millis: u32) -> Self {
        Self::new(Self::MAX, millis, 0, millis, 0)
    }

    /// Deadline for a read requesting `bytes`
    pub fn read_deadline(&self, bytes: usize) -> Duration {
        deadline(self.read_constant, self.read_multiplier, bytes)
    }

    /// Deadline for a write of `bytes`
    pub fn write_deadline(&self, bytes: usize) -> Duration {
        deadline(self.write_constant, self.write_multiplier, bytes)
    }

    /// Inter-byte gap limit, `None` when disabled
    pub fn inter_byte_gap(&self) -> Option<Duration> {
        if self.inter_byte == Self::MAX {
            None
        } else {
            Some(Duration::from_millis(self.inter_byte as u64))
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new(0, 0, 0, 0, 0)
    }
}

fn deadline(constant: u32, multiplier: u32, bytes: usize) -> Duration {
    let per_byte = (multiplier as u64).saturating_mul(bytes as u64);
    Duration::from_millis((constant as u64).saturating_add(per_byte))
}

/// Number of data bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteSize {
    /// 5 data bits
    Five,
    /// 6 data bits
    Six,
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
}

impl ByteSize {
    /// Bits per character
    pub fn bits(self) -> u8 {
        match self {
            ByteSize::Five => 5,
            ByteSize::Six => 6,
            ByteSize::Seven => 7,
            ByteSize::Eight => 8,
        }
    }
}

impl TryFrom<u8> for ByteSize {
    type Error = TransportError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(ByteSize::Five),
            6 => Ok(ByteSize::Six),
            7 => Ok(ByteSize::Seven),
            8 => Ok(ByteSize::Eight),
            other => Err(TransportError::InvalidConfig(format!(
                "byte size must be 5-8 bits, got {}",
                other
            ))),
        }
    }
}

/// Parity checking mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
    /// Parity bit always set
    Mark,
    /// Parity bit always clear
    Space,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    /// One stop bit
    One,
    /// One and a half stop bits
    OnePointFive,
    /// Two stop bits
    Two,
}

/// Flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    /// No flow control
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

/// Complete configuration of a serial link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port identifier (e.g. "/dev/ttyUSB0" or "COM6")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits
    pub byte_size: ByteSize,
    /// Parity
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
    /// Flow control
    pub flow_control: FlowControl,
    /// Read/write timeouts
    pub timeout: Timeout,
}

impl SerialConfig {
    /// 8N1 configuration for `port` at `baud_rate`
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// Builder-style timeout override
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the settings that can be rejected before touching the device
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "port identifier is empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfig(
                "baud rate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            byte_size: ByteSize::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeout: Timeout::default(),
        }
    }
}
