//! Serial Transport
//!
//! Byte-level access to an instrument on a serial link: connection
//! lifecycle, the timeout model, line framing and recovery of devices that
//! are attached but not yet streaming.

mod config;
mod connection;
mod error;
mod line;
pub mod platform;
pub mod serial;
pub mod sim;
mod sync;

pub use config::{ByteSize, FlowControl, Parity, SerialConfig, StopBits, Timeout};
pub use connection::{ConnectionState, LinkCounters, SerialTransport};
pub use error::TransportError;
pub use line::LineReader;
pub use platform::{NativeSerial, PlatformPort, PlatformSerial};
pub use serial::{list_ports, PortInfo};
pub use sim::SimulatedSerial;
pub use sync::{ReconnectSynchronizer, SyncOutcome};
pub(crate) use sync::sleep_unless_cancelled;

/// Baud rate used when none is configured
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Pause after configuring the device before further I/O, in milliseconds
pub const SETTLE_DELAY_MS: u64 = 20;

/// Default cap on a framed line
pub const DEFAULT_MAX_LINE: usize = 128;
