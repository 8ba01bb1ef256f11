use chrono::Local;
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::json;
use serial_line::config::{Config, ConfigLoader};
use serial_line::{logging, PatternWait, PortError, SerialLine, TransferOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serial-line",
    version,
    about = "Read lines from a serial device, wait for patterns, send text and files.",
    long_about = "Treats a serial device as a line-delimited data source. Incoming bytes are buffered by a background reader; lines can be monitored live or matched against a regular expression within a time limit."
)]
struct Args {
    /// Configuration file to use instead of the normal lookup.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct PortArgs {
    /// Device path, or an alias from [serial.port_aliases].
    #[arg(short, long)]
    port: String,

    /// Baud rate. Defaults to serial.default_baud.
    #[arg(short, long)]
    baud: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every received line until Ctrl+C.
    Monitor {
        #[command(flatten)]
        port: PortArgs,

        /// Prefix each line with the local time it was read.
        #[arg(long)]
        timestamps: bool,
    },
    /// Wait for a line matching a regular expression.
    ///
    /// Exits 0 on a match and 1 on timeout.
    Wait {
        #[command(flatten)]
        port: PortArgs,

        /// Regular expression to look for.
        #[arg(long)]
        pattern: String,

        /// Give up after this many milliseconds. Defaults to wait.default_timeout_ms.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Line to send before waiting, e.g. a command whose reply is awaited.
        #[arg(long)]
        send: Option<String>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Send one line of text.
    Send {
        #[command(flatten)]
        port: PortArgs,

        text: String,

        /// Send the text without appending CR and the end-of-line byte.
        #[arg(long)]
        raw: bool,
    },
    /// Send the raw contents of a file.
    SendFile {
        #[command(flatten)]
        port: PortArgs,

        path: PathBuf,
    },
}

/// Exit status for errors other than a wait timing out.
const EXIT_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => ConfigLoader::load()?.into_config(),
    };
    logging::init(&config.logging)?;

    let port = SerialLine::new().with_transfer_options(TransferOptions::from(&config.transfer));
    port.set_eol(config.serial.eol_byte()?);

    match args.command {
        Command::Monitor {
            port: port_args,
            timestamps,
        } => {
            open(&port, &port_args, &config)?;
            let outcome = monitor(&port, timestamps).await;
            port.close()?;
            outcome?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Wait {
            port: port_args,
            pattern,
            timeout_ms,
            send,
            json,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.wait.default_timeout());
            // Reject a bad pattern before touching the device.
            let wait = PatternWait::new(&pattern, timeout)?;

            open(&port, &port_args, &config)?;
            if let Some(text) = send {
                port.println(&text)?;
            }

            let started = Instant::now();
            let outcome = port.wait(&wait).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            port.close()?;

            match outcome {
                Ok(found) => {
                    if json {
                        println!(
                            "{}",
                            json!({ "status": "matched", "match": found, "elapsed_ms": elapsed_ms })
                        );
                    } else {
                        println!("{found}");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(PortError::Timeout(_)) => {
                    if json {
                        println!(
                            "{}",
                            json!({
                                "status": "timeout",
                                "pattern": wait.pattern().as_str(),
                                "timeout_ms": wait.timeout().as_millis() as u64,
                            })
                        );
                    } else {
                        eprintln!(
                            "no line matched {:?} within {:?}",
                            wait.pattern().as_str(),
                            wait.timeout()
                        );
                    }
                    Ok(ExitCode::from(1))
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Send {
            port: port_args,
            text,
            raw,
        } => {
            open(&port, &port_args, &config)?;
            if raw {
                port.print(&text)?;
            } else {
                port.println(&text)?;
            }
            port.close()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::SendFile {
            port: port_args,
            path,
        } => {
            open(&port, &port_args, &config)?;
            let sent = port.send_file(&path)?;
            port.close()?;
            println!("sent {} bytes from {}", sent, path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open(port: &SerialLine, args: &PortArgs, config: &Config) -> Result<(), PortError> {
    let name = config.serial.resolve_port(&args.port);
    let baud = args.baud.unwrap_or(config.serial.default_baud);
    port.open(&name, baud, Some(config.serial.read_timeout()))
}

/// Print buffered lines as the assembler reports them, until shutdown or
/// until the device fails.
async fn monitor(port: &SerialLine, timestamps: bool) -> Result<(), PortError> {
    let mut completed = port.subscribe_lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            event = completed.recv() => {
                // The buffer holds every line, so draining it also covers lag.
                if let Err(e) = print_buffered_lines(port, timestamps) {
                    break Err(e);
                }
                if matches!(event, Err(RecvError::Closed)) {
                    break Ok(());
                }
            }
            _ = &mut shutdown => break Ok(()),
        }
    };

    let stats = port.stats();
    info!(
        "monitor stopped: {} bytes received, {} lines",
        stats.bytes_received, stats.lines_assembled
    );
    outcome
}

fn print_buffered_lines(port: &SerialLine, timestamps: bool) -> Result<(), PortError> {
    loop {
        match port.read_line() {
            Ok(line) if timestamps => {
                println!("[{}] {}", Local::now().format("%H:%M:%S%.3f"), line)
            }
            Ok(line) => println!("{line}"),
            Err(e) if e.is_retryable() => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down");
}
