//! Line assembler: tracks the current unterminated line as bytes are
//! relayed from the reader loop.
//!
//! This runs independently of the receive buffer's own line extraction.
//! Completed lines are published to subscribers for live display; the
//! receive buffer still holds every byte for caller reads.

use super::buffer::strip_line_endings;
use super::LinkState;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// How often an idle assembler re-checks the open flag.
const RELAY_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Working buffer for the line currently being received.
#[derive(Debug, Default)]
pub struct LineAssembler {
    line: Vec<u8>,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one byte. Returns the finished line when `byte` is the
    /// end-of-line byte, with CR/LF and the delimiter stripped.
    pub fn push(&mut self, byte: u8, eol: u8) -> Option<String> {
        if byte == eol {
            let line = strip_line_endings(&self.line, eol);
            self.line.clear();
            Some(line)
        } else {
            self.line.push(byte);
            None
        }
    }

    /// The unterminated line received so far, stripped the same way
    /// `push` strips a completed one.
    pub fn partial(&self, eol: u8) -> String {
        strip_line_endings(&self.line, eol)
    }

    pub fn clear(&mut self) {
        self.line.clear();
    }
}

/// Drain the relay until the port closes or the reader loop goes away.
pub(crate) fn run(relay: Receiver<u8>, link: Arc<LinkState>) {
    debug!("line assembler started");
    while link.is_open() {
        match relay.recv_timeout(RELAY_POLL_INTERVAL) {
            Ok(byte) => link.assemble(byte),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("line assembler stopped");
}
