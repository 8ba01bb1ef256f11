//! Ingestion pipeline: receive buffer, reader loop, line assembler and
//! pattern wait.
//!
//! ```text
//! transport ──> reader loop ──┬──> ReceiveBuffer ──> read_line / read_byte / PatternWait
//!                             └──> relay channel ──> line assembler ──> line subscribers
//! ```
//!
//! All background pieces share one [`LinkState`]; its open flag is the
//! single source of truth for when they stop. If the reader loop dies on
//! a transport error, the error is parked there too and handed to every
//! read that finds nothing left to return.

pub mod assembler;
pub mod buffer;
pub(crate) mod reader;
pub mod wait;

pub use assembler::LineAssembler;
pub use buffer::{ReceiveBuffer, EOL_DEFAULT};
pub use wait::PatternWait;

use crate::port::PortError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Capacity of the reader-to-assembler byte relay.
///
/// When the assembler falls this far behind, the reader loop blocks on the
/// relay and ingestion stalls until the assembler catches up.
pub const RELAY_CAPACITY: usize = 4096;

/// Completed lines kept for slow line subscribers before they lag.
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// Traffic counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    pub bytes_received: u64,
    pub bytes_written: u64,
    pub lines_assembled: u64,
}

/// Transport error that ended the reader loop.
///
/// `PortError` is not `Clone`, so the kind and message are kept and a
/// fresh `io::Error` is built for each caller.
#[derive(Debug, Clone)]
struct ReaderFailure {
    kind: io::ErrorKind,
    message: String,
}

impl ReaderFailure {
    fn from_error(error: &PortError) -> Self {
        match error {
            PortError::Io(e) => Self {
                kind: e.kind(),
                message: e.to_string(),
            },
            other => Self {
                kind: io::ErrorKind::Other,
                message: other.to_string(),
            },
        }
    }

    fn to_error(&self) -> PortError {
        PortError::Io(io::Error::new(self.kind, self.message.clone()))
    }
}

/// State shared by the facade and every background task of a port.
#[derive(Debug)]
pub(crate) struct LinkState {
    open: AtomicBool,
    pub(crate) buffer: ReceiveBuffer,
    assembler: Mutex<LineAssembler>,
    /// Line channel of the current session; dropped when ingestion ends so
    /// subscribers see `Closed`.
    lines: Mutex<Option<broadcast::Sender<String>>>,
    failure: Mutex<Option<ReaderFailure>>,
    bytes_received: AtomicU64,
    bytes_written: AtomicU64,
    lines_assembled: AtomicU64,
}

impl LinkState {
    pub(crate) fn new() -> Self {
        let (lines, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);
        Self {
            open: AtomicBool::new(false),
            buffer: ReceiveBuffer::new(),
            assembler: Mutex::new(LineAssembler::new()),
            lines: Mutex::new(Some(lines)),
            failure: Mutex::new(None),
            bytes_received: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            lines_assembled: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
        if !open {
            self.lines.lock().take();
            // Pattern waits sleeping on the buffer must re-check the flag.
            self.buffer.wake();
        }
    }

    /// Record the error that stopped the reader loop and wake everyone
    /// waiting on new data.
    pub(crate) fn fail(&self, error: &PortError) {
        *self.failure.lock() = Some(ReaderFailure::from_error(error));
        self.lines.lock().take();
        self.buffer.wake();
    }

    /// The reader loop's fatal error, if it stopped on one.
    pub(crate) fn failure(&self) -> Option<PortError> {
        self.failure.lock().as_ref().map(ReaderFailure::to_error)
    }

    /// Next complete line; once none is buffered, the reader's fatal
    /// error takes the place of `Incomplete`.
    pub(crate) fn read_line(&self) -> Result<String, PortError> {
        match self.buffer.read_line() {
            Err(PortError::Incomplete) => Err(self.failure().unwrap_or(PortError::Incomplete)),
            other => other,
        }
    }

    /// Next byte; once the buffer is empty, the reader's fatal error takes
    /// the place of `Empty`.
    pub(crate) fn read_byte(&self) -> Result<u8, PortError> {
        match self.buffer.read_byte() {
            Err(PortError::Empty) => Err(self.failure().unwrap_or(PortError::Empty)),
            other => other,
        }
    }

    /// Forget everything left over from a previous session.
    pub(crate) fn reset(&self) {
        self.buffer.clear();
        self.assembler.lock().clear();
        *self.failure.lock() = None;
        *self.lines.lock() = Some(broadcast::channel(LINE_CHANNEL_CAPACITY).0);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.lines_assembled.store(0, Ordering::Relaxed);
    }

    /// Feed one relayed byte to the line assembler.
    pub(crate) fn assemble(&self, byte: u8) {
        let eol = self.buffer.eol();
        let completed = self.assembler.lock().push(byte, eol);
        if let Some(line) = completed {
            self.lines_assembled.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(line = %line, "assembled line");
            if let Some(lines) = self.lines.lock().as_ref() {
                // No subscribers is fine.
                let _ = lines.send(line);
            }
        }
    }

    pub(crate) fn partial_line(&self) -> String {
        self.assembler.lock().partial(self.buffer.eol())
    }

    /// Subscribe to the current session's lines. Once the session has
    /// ended the receiver is already closed.
    pub(crate) fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        match self.lines.lock().as_ref() {
            Some(lines) => lines.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    pub(crate) fn record_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> PortStats {
        PortStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            lines_assembled: self.lines_assembled.load(Ordering::Relaxed),
        }
    }
}
