//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` is the Device Transport: a raw byte stream with
//! bounded-time reads. `PortOpener` is the Port Configuration step that
//! turns a device name, baud rate and read timeout into an open transport.
//! Both real serial ports and mocks implement them.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read timeout used when the caller does not ask for one.
///
/// The reader loop needs every transport read to return eventually so it
/// can notice that the port was closed.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration parameters for a serial port.
///
/// Frames are always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Upper bound for a single read call.
    pub timeout: Duration,
}

impl PortConfiguration {
    /// Build a configuration, falling back to [`DEFAULT_READ_TIMEOUT`] when
    /// no timeout (or a zero timeout) is given.
    pub fn new(baud_rate: u32, timeout: Option<Duration>) -> Self {
        let timeout = match timeout {
            Some(t) if !t.is_zero() => t,
            _ => DEFAULT_READ_TIMEOUT,
        };
        Self { baud_rate, timeout }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Reads block for at most the configured timeout. A read that times out
/// reports either `Ok(0)` or an error for which
/// [`PortError::is_timeout`] is true; both mean "nothing arrived".
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Set the read/write timeout for this port.
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Open a second handle onto the same device.
    ///
    /// The reader loop reads through its own handle so writes on the
    /// first handle never queue behind a blocked read.
    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Flush pending output and release the device.
    fn close(&mut self) -> Result<(), PortError>;
}

/// Port Configuration: opens a device and hands back a ready transport.
pub trait PortOpener: Send + Sync + std::fmt::Debug {
    /// Open `name` at `config.baud_rate` with reads bounded by `config.timeout`.
    fn open_port(
        &self,
        name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration() {
        let config = PortConfiguration::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_missing_timeout_falls_back_to_default() {
        let config = PortConfiguration::new(115200, None);
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.timeout, DEFAULT_READ_TIMEOUT);

        let config = PortConfiguration::new(115200, Some(Duration::ZERO));
        assert_eq!(config.timeout, DEFAULT_READ_TIMEOUT);
    }

    #[test]
    fn test_explicit_timeout_is_kept() {
        let config = PortConfiguration::new(57600, Some(Duration::from_millis(250)));
        assert_eq!(config.timeout, Duration::from_millis(250));
    }
}
