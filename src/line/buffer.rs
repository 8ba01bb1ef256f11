//! Receive buffer shared between the reader loop and callers.
//!
//! Bytes are appended only by the reader loop and removed only from the
//! front by caller reads. The end-of-line byte lives here too, so every
//! line extraction uses whatever delimiter is configured at the moment of
//! the call.

use crate::port::PortError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

/// Default end-of-line byte (ASCII 10, LF).
pub const EOL_DEFAULT: u8 = b'\n';

/// Ordered, unbounded holding area for received bytes not yet consumed.
#[derive(Debug)]
pub struct ReceiveBuffer {
    bytes: Mutex<VecDeque<u8>>,
    eol: AtomicU8,
    /// Bumped after every append so waiters can sleep between lines.
    arrivals: watch::Sender<u64>,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveBuffer {
    /// Create an empty buffer delimiting lines on [`EOL_DEFAULT`].
    pub fn new() -> Self {
        Self::with_eol(EOL_DEFAULT)
    }

    /// Create an empty buffer delimiting lines on `eol`.
    pub fn with_eol(eol: u8) -> Self {
        let (arrivals, _) = watch::channel(0);
        Self {
            bytes: Mutex::new(VecDeque::with_capacity(256)),
            eol: AtomicU8::new(eol),
            arrivals,
        }
    }

    /// Add bytes to the tail. Never blocks beyond the internal lock.
    pub fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.bytes.lock().extend(data);
        self.wake();
    }

    /// Remove and return the oldest byte.
    pub fn read_byte(&self) -> Result<u8, PortError> {
        self.bytes.lock().pop_front().ok_or(PortError::Empty)
    }

    /// Remove and return the oldest complete line.
    ///
    /// The line runs up to and including the first end-of-line byte. The
    /// returned text has every CR, LF and end-of-line byte removed. When no
    /// end-of-line byte is buffered the call fails with
    /// [`PortError::Incomplete`] and leaves the buffer untouched.
    pub fn read_line(&self) -> Result<String, PortError> {
        let eol = self.eol();
        let mut bytes = self.bytes.lock();

        let (head, tail) = bytes.as_slices();
        let end = memchr::memchr(eol, head)
            .or_else(|| memchr::memchr(eol, tail).map(|i| head.len() + i))
            .ok_or(PortError::Incomplete)?;

        let raw: Vec<u8> = bytes.drain(..=end).collect();
        Ok(strip_line_endings(&raw, eol))
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.bytes.lock().is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&self) {
        self.bytes.lock().clear();
    }

    /// Current end-of-line byte.
    pub fn eol(&self) -> u8 {
        self.eol.load(Ordering::Acquire)
    }

    /// Change the end-of-line byte. Applies to the next extraction only.
    pub fn set_eol(&self, eol: u8) {
        self.eol.store(eol, Ordering::Release);
    }

    /// Subscribe to append notifications.
    ///
    /// The receiver starts with the current generation marked as seen, so
    /// `changed()` resolves on the first append after this call.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.arrivals.subscribe()
    }

    /// Wake every subscriber without appending, e.g. when the port closes.
    pub(crate) fn wake(&self) {
        self.arrivals.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

pub(crate) fn strip_line_endings(line: &[u8], eol: u8) -> String {
    let kept: Vec<u8> = line
        .iter()
        .copied()
        .filter(|&b| b != b'\r' && b != b'\n' && b != eol)
        .collect();
    String::from_utf8_lossy(&kept).into_owned()
}
