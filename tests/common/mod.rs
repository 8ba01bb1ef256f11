//! Shared test utilities for serial-line integration tests.
//!
//! This module provides common test infrastructure including:
//! - A `SerialLine` opened on a `MockSerialPort`
//! - Helpers to feed bytes from another thread after a delay
//! - Polling helpers with a deadline

#![allow(dead_code)]

use serial_line::{MockPortOpener, MockSerialPort, SerialLine, TransferOptions};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Read timeout for mock-backed ports; keeps `close()` fast.
pub const MOCK_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Device name passed to `open` in tests.
pub const MOCK_DEVICE: &str = "/dev/ttyMOCK0";

/// A closed `SerialLine` backed by a fresh mock port.
pub fn mock_line() -> (SerialLine, MockPortOpener) {
    let opener = MockPortOpener::new(MockSerialPort::new("MOCK0"));
    (SerialLine::with_opener(opener.clone()), opener)
}

/// A `SerialLine` opened on a mock port.
///
/// # Example
/// ```ignore
/// let (line, port) = open_mock_line();
/// port.enqueue_read(b"OK\r\n");
/// ```
pub fn open_mock_line() -> (SerialLine, MockSerialPort) {
    open_mock_line_with_transfer(TransferOptions::default())
}

/// Same as [`open_mock_line`] with custom file transfer pacing.
pub fn open_mock_line_with_transfer(transfer: TransferOptions) -> (SerialLine, MockSerialPort) {
    let (line, opener) = mock_line();
    let line = line.with_transfer_options(transfer);
    line.open(MOCK_DEVICE, 115200, Some(MOCK_READ_TIMEOUT))
        .expect("open mock port");
    (line, opener.port().clone())
}

/// Enqueue `data` on the mock port after `delay`, from another thread.
pub fn feed_after(port: &MockSerialPort, delay: Duration, data: &'static [u8]) -> JoinHandle<()> {
    let port = port.clone();
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        port.enqueue_read(data);
    })
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Block until at least `len` unread bytes are buffered.
pub fn wait_for_available(line: &SerialLine, len: usize) {
    assert!(
        wait_until(Duration::from_secs(2), || line.available() >= len),
        "expected {} buffered bytes, have {}",
        len,
        line.available()
    );
}
