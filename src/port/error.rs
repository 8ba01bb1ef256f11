//! Port-specific error types.
//!
//! A single error enum covers the transport, the receive buffer and the
//! facade, so callers can match on one type regardless of which layer
//! produced the failure.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bounded wait elapsed without producing a result.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Attempted to open a port that's already open.
    #[error("Port is already open")]
    AlreadyOpen,

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// No complete line is buffered yet. Retry once more data arrives.
    #[error("No complete line buffered yet")]
    Incomplete,

    /// The receive buffer holds no bytes.
    #[error("Receive buffer is empty")]
    Empty,

    /// The pattern given to a wait did not compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// `true` for "not ready yet" buffer conditions that the caller should
    /// simply poll again for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Incomplete | Self::Empty)
    }

    /// `true` when the error only reports that a bounded read or wait ran
    /// out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortError::not_found("/dev/ttyUSB0");
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyUSB0");

        let err = PortError::config("Invalid baud rate");
        assert_eq!(err.to_string(), "Configuration error: Invalid baud rate");

        let err = PortError::AlreadyOpen;
        assert_eq!(err.to_string(), "Port is already open");

        assert_eq!(PortError::NotOpen.to_string(), "Port is not open");
    }

    #[test]
    fn test_timeout_error() {
        let duration = Duration::from_millis(500);
        let err = PortError::timeout(duration);
        assert!(err.to_string().contains("500ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_buffer_conditions_are_retryable() {
        assert!(PortError::Incomplete.is_retryable());
        assert!(PortError::Empty.is_retryable());
        assert!(!PortError::NotOpen.is_retryable());
        assert!(!PortError::timeout(Duration::from_millis(1)).is_retryable());
    }

    #[test]
    fn test_io_timeouts_are_recognised() {
        let timed_out = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        ));
        assert!(timed_out.is_timeout());

        let broken = PortError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device unplugged",
        ));
        assert!(!broken.is_timeout());
    }

    #[test]
    fn test_invalid_pattern_conversion() {
        let err: PortError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(matches!(err, PortError::InvalidPattern(_)));
        assert!(err.to_string().starts_with("Invalid pattern"));
    }
}
