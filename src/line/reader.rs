//! Reader loop: pulls raw bytes from the transport into the receive
//! buffer and the assembler relay.

use super::LinkState;
use crate::port::SerialPortAdapter;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use tracing::{debug, error};

/// Bytes requested from the transport per read call.
const READ_CHUNK: usize = 256;

/// Run until the port closes, the relay is gone, or the transport fails.
///
/// A transport failure while open is recorded on the link, so callers get
/// the error once they have drained what was buffered before it.
///
/// Every transport read is bounded by the port's read timeout, so the open
/// flag is re-checked at least that often. The flag is checked again before
/// each relay send so nothing is relayed once the port is closed.
pub(crate) fn run(
    mut transport: Box<dyn SerialPortAdapter>,
    link: Arc<LinkState>,
    relay: SyncSender<u8>,
) {
    let port_name = transport.name().to_string();
    debug!("reader loop started on {}", port_name);

    let mut rx_buf = [0u8; READ_CHUNK];
    'ingest: while link.is_open() {
        let n = match transport.read_bytes(&mut rx_buf) {
            Ok(n) => n,
            Err(e) if e.is_timeout() => 0,
            Err(e) => {
                if link.is_open() {
                    error!("read from {} failed, stopping reader loop: {}", port_name, e);
                    link.fail(&e);
                }
                break;
            }
        };
        if n == 0 {
            continue;
        }

        let received = &rx_buf[..n];
        link.buffer.append(received);
        link.record_received(n);

        for &byte in received {
            if !link.is_open() || relay.send(byte).is_err() {
                break 'ingest;
            }
        }
    }

    debug!("reader loop on {} stopped", port_name);
}
