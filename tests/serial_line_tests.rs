//! End-to-end behaviour of `SerialLine` over a mock transport.
//!
//! Bytes are injected with `MockSerialPort::enqueue_read` and travel through
//! the real reader loop, receive buffer and line assembler.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serial_line::{PortError, TransferOptions};
use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn test_closed_handle_rejects_io_without_touching_transport() {
    let (line, opener) = mock_line();
    let port = opener.port().clone();

    assert!(matches!(line.write(b"AT"), Err(PortError::NotOpen)));
    assert!(matches!(line.print("AT"), Err(PortError::NotOpen)));
    assert!(matches!(line.println("AT"), Err(PortError::NotOpen)));
    assert!(matches!(line.read_byte(), Err(PortError::NotOpen)));
    assert!(matches!(line.read_line(), Err(PortError::NotOpen)));
    assert_eq!(port.write_calls(), 0);
    assert_eq!(port.read_calls(), 0);
    assert_eq!(line.available(), 0);
}

#[test]
fn test_bytes_are_read_back_in_arrival_order() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"ab");
    port.enqueue_read(b"cd");
    wait_for_available(&line, 4);

    let bytes: Vec<u8> = (0..4).map(|_| line.read_byte().unwrap()).collect();
    assert_eq!(bytes, b"abcd");
    assert!(matches!(line.read_byte(), Err(PortError::Empty)));
}

#[test]
fn test_crlf_line_then_incomplete_tail() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"abc\r\ndef");
    wait_for_available(&line, 8);

    assert_eq!(line.read_line().unwrap(), "abc");
    assert_eq!(line.available(), 3);
    assert!(matches!(line.read_line(), Err(PortError::Incomplete)));
    assert!(matches!(line.read_line(), Err(PortError::Incomplete)));
    assert_eq!(line.available(), 3);

    port.enqueue_read(b"\n");
    wait_for_available(&line, 4);
    assert_eq!(line.read_line().unwrap(), "def");
    assert_eq!(line.available(), 0);
}

#[test]
fn test_set_eol_applies_to_buffered_bytes() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"one;two\n");
    wait_for_available(&line, 8);

    line.set_eol(b';');
    assert_eq!(line.read_line().unwrap(), "one");
    assert!(matches!(line.read_line(), Err(PortError::Incomplete)));

    line.set_eol(b'\n');
    assert_eq!(line.read_line().unwrap(), "two");
}

#[test]
fn test_concurrent_readers_see_each_line_once() {
    let (line, port) = open_mock_line();
    let line = Arc::new(line);
    for i in 0..50 {
        port.enqueue_read(format!("line {i}\n").as_bytes());
    }
    assert!(wait_until(Duration::from_secs(2), || line.available() >= 390));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let line = Arc::clone(&line);
            std::thread::spawn(move || {
                let mut got = Vec::new();
                while let Ok(text) = line.read_line() {
                    got.push(text);
                }
                got
            })
        })
        .collect();

    let mut all: Vec<String> = readers
        .into_iter()
        .flat_map(|r| r.join().unwrap())
        .collect();
    all.sort_by_key(|text| text[5..].parse::<u32>().unwrap());

    let expected: Vec<String> = (0..50).map(|i| format!("line {i}")).collect();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn test_wait_resolves_when_match_arrives() {
    let (line, port) = open_mock_line();
    let feeder = feed_after(&port, Duration::from_millis(50), b"booting\r\nOK\r\n");

    let start = Instant::now();
    let found = line
        .wait_for_regex_timeout("OK", Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(found, "OK");
    assert!(start.elapsed() < Duration::from_millis(400));
    // The non-matching line was consumed by the wait.
    assert!(matches!(line.read_line(), Err(PortError::Incomplete)));
    feeder.join().unwrap();
}

#[tokio::test]
async fn test_wait_returns_only_the_matched_text() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"+CSQ: 17,99\r\n");

    let found = line
        .wait_for_regex_timeout(r"\d+,\d+", Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(found, "17,99");
}

#[tokio::test]
async fn test_wait_times_out_and_leaves_later_lines_alone() {
    let (line, port) = open_mock_line();

    let start = Instant::now();
    let result = line
        .wait_for_regex_timeout("READY", Duration::from_millis(50))
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(PortError::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(400));

    // Let the polling task observe the timeout before new data shows up.
    tokio::time::sleep(Duration::from_millis(20)).await;
    port.enqueue_read(b"READY\n");
    wait_for_available(&line, 6);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(line.read_line().unwrap(), "READY");
}

#[tokio::test]
async fn test_wait_on_closed_port_fails_fast() {
    let (line, _opener) = mock_line();

    let result = line
        .wait_for_regex_timeout("OK", Duration::from_secs(5))
        .await;
    assert!(matches!(result, Err(PortError::NotOpen)));
}

#[tokio::test]
async fn test_wait_rejects_invalid_pattern() {
    let (line, _port) = open_mock_line();

    let result = line
        .wait_for_regex_timeout("(unclosed", Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(PortError::InvalidPattern(_))));
}

#[tokio::test]
async fn test_close_interrupts_wait() {
    let (line, _port) = open_mock_line();
    let line = Arc::new(line);

    let closer = {
        let line = Arc::clone(&line);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            line.close()
        })
    };

    let start = Instant::now();
    let result = line
        .wait_for_regex_timeout("never", Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(PortError::NotOpen)));
    assert!(start.elapsed() < Duration::from_secs(2));
    closer.join().unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_for_precompiled_pattern() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"temp=21.5C\n");

    let pattern = regex::Regex::new(r"\d+\.\d").unwrap();
    let found = line
        .wait_for_match(&pattern, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(found, "21.5");
}

#[test]
fn test_reopen_discards_previous_session() {
    let (line, opener) = mock_line();
    let port = opener.port().clone();

    line.open(MOCK_DEVICE, 9600, Some(MOCK_READ_TIMEOUT)).unwrap();
    port.enqueue_read(b"stale");
    wait_for_available(&line, 5);
    line.println("hi").unwrap();
    line.close().unwrap();

    // Unread bytes survive close until the next open.
    assert_eq!(line.available(), 5);

    line.open(MOCK_DEVICE, 19200, None).unwrap();
    assert_eq!(line.available(), 0);
    assert_eq!(line.stats().bytes_written, 0);
    assert_eq!(line.baud_rate(), Some(19200));

    let opened = opener.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0].1.timeout, MOCK_READ_TIMEOUT);
    assert_eq!(opened[1].1.timeout, serial_line::DEFAULT_READ_TIMEOUT);
}

#[test]
fn test_line_subscription_and_partial_line() {
    let (line, port) = open_mock_line();
    let mut lines = line.subscribe_lines();

    port.enqueue_read(b"first\r\nsec");
    assert!(wait_until(Duration::from_secs(2), || line.partial_line() == "sec"));

    assert_eq!(lines.try_recv().unwrap(), "first");
    assert_eq!(line.stats().lines_assembled, 1);
    // Subscribers do not consume the buffer.
    assert_eq!(line.read_line().unwrap(), "first");
}

#[test]
fn test_stats_track_traffic() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"12345\n");
    line.write(b"abc").unwrap();
    line.print("de").unwrap();

    assert!(wait_until(Duration::from_secs(2), || line.stats().lines_assembled == 1));
    let stats = line.stats();
    assert_eq!(stats.bytes_received, 6);
    assert_eq!(stats.bytes_written, 5);
}

#[test]
fn test_send_file_writes_paced_chunks() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"0123456789").unwrap();

    let (line, port) = open_mock_line_with_transfer(TransferOptions {
        chunk_size: 4,
        chunk_pause: Duration::from_millis(10),
    });
    line.println("AT+UPLOAD").unwrap();
    port.clear_write_log();

    let start = Instant::now();
    let sent = line.send_file(file.path()).unwrap();

    assert_eq!(sent, 10);
    assert!(start.elapsed() >= Duration::from_millis(20));
    assert_eq!(
        port.get_write_log(),
        vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]
    );
}

#[test]
fn test_send_file_errors() {
    let (closed, _opener) = mock_line();
    assert!(matches!(
        closed.send_file("/nonexistent/firmware.bin"),
        Err(PortError::NotOpen)
    ));

    let (line, port) = open_mock_line();
    assert!(matches!(
        line.send_file("/nonexistent/firmware.bin"),
        Err(PortError::Io(_))
    ));
    assert_eq!(port.write_calls(), 0);
}

#[test]
fn test_transport_failure_reaches_readers() {
    let (line, port) = open_mock_line();
    port.enqueue_read(b"before\npart");
    wait_for_available(&line, 11);

    port.fail_next_read(std::io::ErrorKind::BrokenPipe);
    std::thread::sleep(Duration::from_millis(50));
    port.enqueue_read(b"after\n");
    std::thread::sleep(Duration::from_millis(50));
    // Nothing after the failure is ingested.
    assert_eq!(port.available_bytes(), 6);

    // Data received before the failure comes first, then the error.
    assert_eq!(line.read_line().unwrap(), "before");
    match line.read_line() {
        Err(PortError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
        other => panic!("expected BrokenPipe, got {:?}", other),
    }
    let tail: Vec<u8> = (0..4).map(|_| line.read_byte().unwrap()).collect();
    assert_eq!(tail, b"part");
    assert!(matches!(line.read_byte(), Err(PortError::Io(_))));

    // The handle still needs an explicit close; a reopen starts clean.
    assert!(line.is_open());
    line.close().unwrap();
    line.open(MOCK_DEVICE, 115200, Some(MOCK_READ_TIMEOUT)).unwrap();
    wait_for_available(&line, 6);
    assert_eq!(line.read_line().unwrap(), "after");
    assert!(matches!(line.read_line(), Err(PortError::Incomplete)));
}

#[tokio::test]
async fn test_wait_reports_transport_failure_instead_of_timeout() {
    let (line, port) = open_mock_line();
    port.fail_next_read(std::io::ErrorKind::BrokenPipe);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let result = line
        .wait_for_regex_timeout("OK", Duration::from_millis(200))
        .await;

    match result {
        Err(PortError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
        other => panic!("expected BrokenPipe, got {:?}", other),
    }
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[test]
fn test_line_subscription_closes_on_transport_failure() {
    let (line, port) = open_mock_line();
    let mut lines = line.subscribe_lines();

    port.enqueue_read(b"last words\n");
    assert!(wait_until(Duration::from_secs(2), || line.stats().lines_assembled == 1));
    port.fail_next_read(std::io::ErrorKind::NotConnected);

    let closed = wait_until(Duration::from_secs(2), || {
        matches!(
            lines.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Closed)
        )
    });
    assert!(closed);
}

#[test]
fn test_transient_read_timeout_keeps_ingesting() {
    let (line, port) = open_mock_line();
    port.set_should_timeout(true);
    std::thread::sleep(Duration::from_millis(30));

    port.enqueue_read(b"+CSQ: 20,0\r\n");
    wait_for_available(&line, 12);
    assert_eq!(line.read_line().unwrap(), "+CSQ: 20,0");
}

#[test]
fn test_println_framing_follows_eol() {
    let (line, port) = open_mock_line();
    port.expect_write(b"AT\r\n");
    port.expect_write(b"AT+CFUN=1\r;");

    line.println("AT").unwrap();
    line.set_eol(b';');
    line.println(&format!("AT+CFUN={}", 1)).unwrap();
    port.verify_expectations().unwrap();

    // An unexpected frame is rejected by the mock and surfaces as an error.
    port.expect_write(b"ATH\r;");
    assert!(line.println("ATZ").is_err());
}
