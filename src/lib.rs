//! Serial Line Library
//!
//! Turns a raw, byte-at-a-time serial stream into a buffered, line-delimited
//! data source with bounded-time regular expression waits.
//!
//! # Modules
//!
//! - `port`: Device transport abstraction (real `serialport` devices and mocks)
//! - `line`: Receive buffer, reader loop, line assembler and pattern wait
//! - `serial`: The `SerialLine` facade callers hold
//! - `config`: Configuration management with TOML support
//! - `logging`: `tracing` subscriber setup

pub mod config;
pub mod line;
pub mod logging;
pub mod port;
pub mod serial;

// Re-export commonly used types for convenience
pub use line::{PatternWait, PortStats, ReceiveBuffer, EOL_DEFAULT};
pub use port::{
    MockPortOpener, MockSerialPort, PortConfiguration, PortError, PortOpener, SerialPortAdapter,
    SyncSerialPort, SystemPortOpener, DEFAULT_READ_TIMEOUT,
};
pub use serial::{SerialLine, TransferOptions, DEFAULT_CHUNK_PAUSE, DEFAULT_CHUNK_SIZE};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
