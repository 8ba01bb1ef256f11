//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockPortOpener` that hands it out in
//! place of a real device. Clones share state, so a test can keep one
//! handle to feed data while the reader loop reads through another.

use super::error::PortError;
use super::traits::{PortConfiguration, PortOpener, SerialPortAdapter};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inner state of the mock port.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Expected write operations (for verification).
    expected_writes: VecDeque<Vec<u8>>,
    /// Whether the next operation should time out.
    should_timeout: bool,
    /// Error kind returned by the next read, simulating a failing device.
    read_failure: Option<std::io::ErrorKind>,
    /// Message returned as an error by the next `close`.
    close_failure: Option<String>,
    /// Configured read timeout.
    timeout: Duration,
    /// Set once `close` has been called on any handle.
    closed: bool,
    /// Number of `read_bytes` calls across all handles.
    read_calls: usize,
    /// Number of `write_bytes` calls across all handles.
    write_calls: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockPortState>,
    data_ready: Condvar,
}

/// In-memory stand-in for a serial device.
///
/// Supports queued replies, a write log with optional expected writes, and
/// injected timeouts or device failures. Reads block until data is queued
/// or the configured timeout elapses, in which case they return `Ok(0)`.
///
/// # Example
/// ```
/// use serial_line::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut modem = MockSerialPort::new("MOCK0");
/// modem.enqueue_read(b"OK\r\n");
///
/// let mut rx = [0u8; 8];
/// let n = modem.read_bytes(&mut rx).unwrap();
/// assert_eq!(&rx[..n], b"OK\r\n");
///
/// modem.write_bytes(b"ATZ\r\n").unwrap();
/// assert_eq!(modem.written_bytes(), b"ATZ\r\n");
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    shared: Arc<Shared>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let shared = Shared::default();
        shared.state.lock().timeout = Duration::from_millis(20);
        Self {
            name: name.into(),
            shared: Arc::new(shared),
        }
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    ///
    /// The bytes are added to the end of the read queue and any blocked
    /// reader is woken.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.data_ready.notify_all();
    }

    /// Expect a specific write operation.
    ///
    /// Use `verify_expectations()` to check that all expected writes occurred.
    pub fn expect_write(&self, data: &[u8]) {
        self.shared
            .state
            .lock()
            .expected_writes
            .push_back(data.to_vec());
    }

    /// Verify that all expected writes have occurred in order.
    pub fn verify_expectations(&self) -> Result<(), String> {
        let state = self.shared.state.lock();

        if !state.expected_writes.is_empty() {
            return Err(format!(
                "Expected {} more write(s), but none occurred",
                state.expected_writes.len()
            ));
        }

        Ok(())
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes concatenated in write order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.shared.state.lock().write_log.clear();
    }

    /// Set whether the next read/write operation should time out.
    pub fn set_should_timeout(&self, should_timeout: bool) {
        self.shared.state.lock().should_timeout = should_timeout;
    }

    /// Make the next read fail with an I/O error of the given kind.
    pub fn fail_next_read(&self, kind: std::io::ErrorKind) {
        let mut state = self.shared.state.lock();
        state.read_failure = Some(kind);
        self.shared.data_ready.notify_all();
    }

    /// Make the next `close` fail with the given message.
    pub fn fail_next_close(&self, message: impl Into<String>) {
        self.shared.state.lock().close_failure = Some(message.into());
    }

    /// Whether `close` has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of read calls made through any handle.
    pub fn read_calls(&self) -> usize {
        self.shared.state.lock().read_calls
    }

    /// Number of write calls made through any handle.
    pub fn write_calls(&self) -> usize {
        self.shared.state.lock().write_calls
    }

    /// Get the number of bytes still waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }

    fn reopen(&self) {
        self.shared.state.lock().closed = false;
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        state.write_calls += 1;

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        state.write_log.push(data.to_vec());

        if let Some(expected) = state.expected_writes.pop_front() {
            if expected != data {
                return Err(PortError::config(format!(
                    "Expected write: {:?}, got: {:?}",
                    expected, data
                )));
            }
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        state.read_calls += 1;

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let deadline = Instant::now() + state.timeout;
        loop {
            if let Some(kind) = state.read_failure.take() {
                return Err(PortError::Io(std::io::Error::new(kind, "mock read failure")));
            }
            if state.closed {
                return Ok(0);
            }
            if !state.read_queue.is_empty() {
                break;
            }
            if self
                .shared
                .data_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(0);
            }
        }

        let n = buffer.len().min(state.read_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.read_queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.shared.state.lock().timeout = timeout;
        Ok(())
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.data_ready.notify_all();
        match state.close_failure.take() {
            Some(message) => Err(PortError::Io(std::io::Error::other(message))),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Port opener that always hands out (a handle to) the same mock port.
#[derive(Debug, Clone)]
pub struct MockPortOpener {
    port: MockSerialPort,
    opened: Arc<Mutex<Vec<(String, PortConfiguration)>>>,
    fail_next: Arc<Mutex<Option<PortError>>>,
}

impl MockPortOpener {
    /// Create an opener serving `port`.
    pub fn new(port: MockSerialPort) -> Self {
        Self {
            port,
            opened: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// The mock port served by this opener.
    pub fn port(&self) -> &MockSerialPort {
        &self.port
    }

    /// Every `(name, configuration)` pair passed to `open_port` so far.
    pub fn opened(&self) -> Vec<(String, PortConfiguration)> {
        self.opened.lock().clone()
    }

    /// Make the next `open_port` call fail with `error`.
    pub fn fail_next_open(&self, error: PortError) {
        *self.fail_next.lock() = Some(error);
    }
}

impl PortOpener for MockPortOpener {
    fn open_port(
        &self,
        name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        self.opened.lock().push((name.to_string(), config.clone()));

        let mut port = self.port.clone();
        port.reopen();
        port.set_timeout(config.timeout)?;
        Ok(Box::new(port))
    }
}
