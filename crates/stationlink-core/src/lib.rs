//! # StationLink Core Library
//!
//! Serial telemetry acquisition for field instruments.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A serial transport with a five-part timeout model, independent read and
//!   write paths, and recovery of devices that are attached but silent
//! - Line framing under a size cap and per-byte deadlines
//! - Decoders for NMEA-style weather sentences and the nozzle controller's
//!   command/response protocol
//! - `;`-separated output records and an acquisition loop tying it together
//!
//! ## Supported Instruments
//!
//! - Weather stations emitting `$WIMDA` sentences
//! - Weedit nozzle controllers (`*PX0` / `*BX0`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use stationlink_core::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AcquisitionConfig::for_protocol(Protocol::Weather);
//! config.serial.port = "/dev/ttyUSB0".into();
//!
//! let sink = FileSink::open("out/WeatherStation.m")?;
//! let mut acquisition = Acquisition::new(config, sink)?;
//! let stats = acquisition.run(&CancellationToken::new())?;
//! println!("{} samples", stats.samples);
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod datalog;
pub mod demo;
pub mod fields;
pub mod protocol;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::acquisition::{
        Acquisition, AcquisitionConfig, AcquisitionError, AcquisitionStats, Protocol,
    };
    pub use crate::datalog::{FileSink, MemorySink, RecordFormat, RecordSink, SinkError};
    pub use crate::protocol::{
        Command, CommandDecoder, ControlSample, DecodeError, Decoded, DecodedSample, LineDecoder,
        NozzleEntry, SentenceDecoder, WeatherSample,
    };
    pub use crate::transport::{
        list_ports, ConnectionState, LineReader, PortInfo, ReconnectSynchronizer, SerialConfig,
        SerialTransport, SimulatedSerial, SyncOutcome, Timeout, TransportError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
