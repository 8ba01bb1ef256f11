//! Bounded-time pattern search over incoming lines.
//!
//! A polling task extracts complete lines from the receive buffer and
//! tests each against the pattern. It races a timer: a match delivered
//! before the deadline wins, otherwise the wait fails with
//! [`PortError::Timeout`]. Lines that do not match are consumed.
//!
//! Between lines the polling task sleeps on the buffer's arrival signal
//! rather than spinning.

use super::LinkState;
use crate::port::PortError;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

/// A single pending pattern search: compiled pattern plus time budget.
#[derive(Debug, Clone)]
pub struct PatternWait {
    pattern: Regex,
    timeout: Duration,
}

impl PatternWait {
    /// Compile `pattern` for a wait of at most `timeout`.
    pub fn new(pattern: &str, timeout: Duration) -> Result<Self, PortError> {
        Ok(Self::from_regex(Regex::new(pattern)?, timeout))
    }

    /// Wait on an already compiled pattern.
    pub fn from_regex(pattern: Regex, timeout: Duration) -> Self {
        Self { pattern, timeout }
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Race the polling task against the timer.
    ///
    /// Returns the first match found. Fails with `Timeout` when the timer
    /// fires first, `NotOpen` when the port closes mid-wait, or with the
    /// transport error that stopped the reader loop.
    pub(crate) async fn run(self, link: Arc<LinkState>) -> Result<String, PortError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (found_tx, found_rx) = oneshot::channel();

        tokio::spawn(poll_lines(
            link,
            self.pattern,
            Arc::clone(&cancelled),
            found_tx,
        ));

        tokio::select! {
            biased;
            found = found_rx => found.unwrap_or(Err(PortError::NotOpen)),
            _ = tokio::time::sleep(self.timeout) => {
                cancelled.store(true, Ordering::Release);
                Err(PortError::timeout(self.timeout))
            }
        }
    }
}

async fn poll_lines(
    link: Arc<LinkState>,
    pattern: Regex,
    cancelled: Arc<AtomicBool>,
    mut found: oneshot::Sender<Result<String, PortError>>,
) {
    let mut arrivals = link.buffer.subscribe();

    while !cancelled.load(Ordering::Acquire) && link.is_open() {
        match link.read_line() {
            Ok(line) => {
                if let Some(m) = pattern.find(&line) {
                    trace!("pattern {} matched {:?}", pattern, m.as_str());
                    // The waiter may already have timed out; the match is dropped then.
                    let _ = found.send(Ok(m.as_str().to_string()));
                    return;
                }
                trace!("line {:?} did not match {}", line, pattern);
            }
            Err(e) if !e.is_retryable() => {
                let _ = found.send(Err(e));
                return;
            }
            Err(_) => {
                tokio::select! {
                    changed = arrivals.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = found.closed() => return,
                }
            }
        }
    }
}
