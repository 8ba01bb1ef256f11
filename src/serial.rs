//! Port facade: the handle callers hold for one serial connection.
//!
//! `SerialLine` owns the open/closed lifecycle. Opening starts the reader
//! loop and the line assembler on their own threads; closing stops and
//! joins both before returning, so at most one of each is alive per handle.
//! Writes go straight to the transport; reads come from the receive buffer.
//!
//! # Example
//! ```no_run
//! use serial_line::SerialLine;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), serial_line::PortError> {
//! let port = SerialLine::new();
//! port.open("/dev/ttyUSB0", 115200, Some(Duration::from_millis(100)))?;
//! port.println("AT")?;
//! let reply = port.wait_for_regex_timeout("OK|ERROR", Duration::from_secs(1)).await?;
//! println!("modem said {reply}");
//! port.close()?;
//! # Ok(())
//! # }
//! ```

use crate::line::{self, LinkState, PatternWait, PortStats, RELAY_CAPACITY};
use crate::port::{PortConfiguration, PortError, PortOpener, SerialPortAdapter, SystemPortOpener};
use parking_lot::Mutex;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Default number of bytes written per chunk by [`SerialLine::send_file`].
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default pause between chunks written by [`SerialLine::send_file`].
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(100);

/// How [`SerialLine::send_file`] paces a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_pause: DEFAULT_CHUNK_PAUSE,
        }
    }
}

/// Everything that exists only while the port is open.
#[derive(Debug)]
struct Session {
    name: String,
    baud_rate: u32,
    transport: Box<dyn SerialPortAdapter>,
    reader: Option<JoinHandle<()>>,
    assembler: Option<JoinHandle<()>>,
}

impl Session {
    fn join_workers(&mut self) {
        for (role, handle) in [
            ("reader loop", self.reader.take()),
            ("line assembler", self.assembler.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    warn!("{} for {} panicked", role, self.name);
                }
            }
        }
    }
}

/// A line- and pattern-oriented serial connection.
#[derive(Debug)]
pub struct SerialLine {
    opener: Box<dyn PortOpener>,
    link: Arc<LinkState>,
    session: Mutex<Option<Session>>,
    transfer: TransferOptions,
}

impl Default for SerialLine {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLine {
    /// A closed handle that opens real devices.
    pub fn new() -> Self {
        Self::with_opener(SystemPortOpener)
    }

    /// A closed handle that opens ports through `opener`.
    pub fn with_opener(opener: impl PortOpener + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            link: Arc::new(LinkState::new()),
            session: Mutex::new(None),
            transfer: TransferOptions::default(),
        }
    }

    /// Use `transfer` for subsequent [`send_file`](Self::send_file) calls.
    pub fn with_transfer_options(mut self, transfer: TransferOptions) -> Self {
        self.transfer = transfer;
        self
    }

    /// Open `name` at `baud_rate` and start ingesting.
    ///
    /// `timeout` bounds each transport read; `None` uses
    /// [`DEFAULT_READ_TIMEOUT`](crate::port::DEFAULT_READ_TIMEOUT).
    /// Anything left in the receive buffer from an earlier session is
    /// discarded.
    ///
    /// # Errors
    ///
    /// - `PortError::AlreadyOpen` if this handle is already open
    /// - any transport error raised while opening the device
    pub fn open(&self, name: &str, baud_rate: u32, timeout: Option<Duration>) -> Result<(), PortError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(PortError::AlreadyOpen);
        }

        let config = PortConfiguration::new(baud_rate, timeout);
        let mut transport = self.opener.open_port(name, &config)?;
        let reader_port = match transport.try_clone_adapter() {
            Ok(port) => port,
            Err(e) => {
                let _ = transport.close();
                return Err(e);
            }
        };

        self.link.reset();
        self.link.set_open(true);

        let (relay_tx, relay_rx) = std::sync::mpsc::sync_channel(RELAY_CAPACITY);

        let link = Arc::clone(&self.link);
        let reader = std::thread::Builder::new()
            .name("serial-reader".to_string())
            .spawn(move || line::reader::run(reader_port, link, relay_tx));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                self.link.set_open(false);
                let _ = transport.close();
                return Err(e.into());
            }
        };

        let link = Arc::clone(&self.link);
        let assembler = std::thread::Builder::new()
            .name("serial-assembler".to_string())
            .spawn(move || line::assembler::run(relay_rx, link));
        let assembler = match assembler {
            Ok(handle) => handle,
            Err(e) => {
                self.link.set_open(false);
                let _ = transport.close();
                let _ = reader.join();
                return Err(e.into());
            }
        };

        info!("opened {} at {} baud (read timeout {:?})", name, baud_rate, config.timeout);
        *session = Some(Session {
            name: name.to_string(),
            baud_rate,
            transport,
            reader: Some(reader),
            assembler: Some(assembler),
        });
        Ok(())
    }

    /// Stop the background tasks and close the transport.
    ///
    /// Closing a closed handle is a no-op. Returns once the reader loop and
    /// line assembler have exited, which takes at most one read timeout.
    pub fn close(&self) -> Result<(), PortError> {
        let mut guard = self.session.lock();
        let Some(mut session) = guard.take() else {
            return Ok(());
        };

        self.link.set_open(false);
        let result = session.transport.close();
        session.join_workers();

        match &result {
            Ok(()) => info!("closed {}", session.name),
            Err(e) => warn!("closed {} with error: {}", session.name, e),
        }
        result
    }

    /// `true` between a successful `open` and the next `close`.
    pub fn is_open(&self) -> bool {
        self.link.is_open()
    }

    /// Device name of the open port.
    pub fn name(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.name.clone())
    }

    /// Baud rate of the open port.
    pub fn baud_rate(&self) -> Option<u32> {
        self.session.lock().as_ref().map(|s| s.baud_rate)
    }

    /// Write raw bytes in a single transport call.
    ///
    /// Returns the number of bytes the transport accepted.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        let mut session = self.session.lock();
        let session = session.as_mut().ok_or(PortError::NotOpen)?;
        let n = session.transport.write_bytes(data)?;
        self.link.record_written(n);
        Ok(n)
    }

    /// Write all of `data`, retrying short writes.
    fn write_all(&self, mut data: &[u8]) -> Result<(), PortError> {
        let mut session = self.session.lock();
        let session = session.as_mut().ok_or(PortError::NotOpen)?;
        while !data.is_empty() {
            let n = session.transport.write_bytes(data)?;
            if n == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
            self.link.record_written(n);
            data = &data[n..];
        }
        Ok(())
    }

    /// Send text as-is.
    pub fn print(&self, text: &str) -> Result<(), PortError> {
        self.write_all(text.as_bytes())
    }

    /// Send text followed by CR and the end-of-line byte.
    pub fn println(&self, text: &str) -> Result<(), PortError> {
        let mut data = Vec::with_capacity(text.len() + 2);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\r');
        data.push(self.link.buffer.eol());
        self.write_all(&data)
    }

    /// Send formatted text; pair with `format_args!`.
    ///
    /// ```no_run
    /// # fn f(port: &serial_line::SerialLine) -> Result<(), serial_line::PortError> {
    /// port.printf(format_args!("AT+BAUD={}\r\n", 115200))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn printf(&self, args: std::fmt::Arguments<'_>) -> Result<(), PortError> {
        match args.as_str() {
            Some(text) => self.print(text),
            None => self.print(&args.to_string()),
        }
    }

    /// Stream a file to the port in paced chunks.
    ///
    /// Returns the number of bytes written. No transfer protocol is spoken;
    /// the receiving side sees the raw file contents.
    pub fn send_file(&self, path: impl AsRef<Path>) -> Result<usize, PortError> {
        if !self.is_open() {
            return Err(PortError::NotOpen);
        }
        let path = path.as_ref();
        let contents = std::fs::read(path)?;
        let chunk_size = self.transfer.chunk_size.max(1);

        let mut sent = 0;
        for (i, chunk) in contents.chunks(chunk_size).enumerate() {
            if i > 0 && !self.transfer.chunk_pause.is_zero() {
                std::thread::sleep(self.transfer.chunk_pause);
            }
            self.write_all(chunk)?;
            sent += chunk.len();
        }

        info!("sent {} ({} bytes)", path.display(), sent);
        Ok(sent)
    }

    /// Remove and return the oldest received byte.
    ///
    /// Fails with `PortError::Empty` when nothing is buffered, or with the
    /// transport error that stopped ingestion once the buffer has drained.
    pub fn read_byte(&self) -> Result<u8, PortError> {
        self.ensure_open()?;
        self.link.read_byte()
    }

    /// Remove and return the oldest complete line, EOL and CR stripped.
    ///
    /// Fails with `PortError::Incomplete` until a full line is buffered.
    /// If the device failed, every complete line received before the
    /// failure is still returned first, then the transport error.
    pub fn read_line(&self) -> Result<String, PortError> {
        self.ensure_open()?;
        self.link.read_line()
    }

    /// Wait up to `timeout` for a line matching `pattern`.
    ///
    /// Returns the first match within the first matching line. Lines read
    /// while waiting are consumed whether or not they match.
    ///
    /// # Errors
    ///
    /// - `PortError::NotOpen` if the port is closed, or closes mid-wait
    /// - `PortError::InvalidPattern` if `pattern` does not compile
    /// - `PortError::Timeout` if nothing matched in time
    /// - the transport error, if the device fails before a match
    pub async fn wait_for_regex_timeout(
        &self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<String, PortError> {
        self.ensure_open()?;
        PatternWait::new(pattern, timeout)?
            .run(Arc::clone(&self.link))
            .await
    }

    /// Like [`wait_for_regex_timeout`](Self::wait_for_regex_timeout) with a
    /// precompiled pattern.
    pub async fn wait_for_match(&self, pattern: &Regex, timeout: Duration) -> Result<String, PortError> {
        self.wait(&PatternWait::from_regex(pattern.clone(), timeout))
            .await
    }

    /// Run a prepared [`PatternWait`]. It can be reused for later waits.
    pub async fn wait(&self, wait: &PatternWait) -> Result<String, PortError> {
        self.ensure_open()?;
        wait.clone().run(Arc::clone(&self.link)).await
    }

    /// Number of received bytes not yet consumed.
    pub fn available(&self) -> usize {
        self.link.buffer.len()
    }

    /// Change the end-of-line byte for later line reads and `println`.
    pub fn set_eol(&self, eol: u8) {
        self.link.buffer.set_eol(eol);
    }

    /// The end-of-line byte currently in effect.
    pub fn eol(&self) -> u8 {
        self.link.buffer.eol()
    }

    /// Receive every line the assembler completes from now on.
    ///
    /// Subscribing does not consume anything from the receive buffer. The
    /// receiver reports `Closed` when the port closes or the device fails.
    pub fn subscribe_lines(&self) -> broadcast::Receiver<String> {
        self.link.subscribe_lines()
    }

    /// The line currently being received, without its terminator.
    pub fn partial_line(&self) -> String {
        self.link.partial_line()
    }

    /// Traffic counters since the last `open`.
    pub fn stats(&self) -> PortStats {
        self.link.stats()
    }

    fn ensure_open(&self) -> Result<(), PortError> {
        if self.link.is_open() {
            Ok(())
        } else {
            Err(PortError::NotOpen)
        }
    }
}

impl Drop for SerialLine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("error closing serial port on drop: {}", e);
        }
    }
}
