//! Port abstraction layer for serial communication.
//!
//! `SerialPortAdapter` is the byte transport the reader loop and the facade
//! talk to; `PortOpener` configures and opens one. Both have a real
//! `serialport`-backed implementation and a mock for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockSerialPort};
pub use sync_port::*;
pub use traits::*;
