//! grbl-link binary entry point.
//!
//! Usage: grbl-link --port /dev/ttyUSB0 [--baud 115200] [--trace]
//!
//! Commands are read from stdin, one per line (see `control::OperatorInput`).
//! Link events are printed to stdout as JSON lines, logs go to stderr.

use std::time::Duration;

use clap::Parser;
use grbl_link::control::{feed_stdin, write_stdout_line, StdoutSink};
use grbl_link::transport::{available_ports, open_serial};
use grbl_link::{spawn_link, GrblError, LinkConfig, Result};
use tokio::task::JoinError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Drive a Grbl controller over a serial port.
#[derive(Parser, Debug)]
#[command(name = "grbl-link")]
#[command(about = "Flow-controlled command link to a Grbl CNC controller")]
struct Args {
    /// Serial port Grbl is attached to.
    #[arg(long, env = "GRBL_PORT", required_unless_present = "list_ports")]
    port: Option<String>,

    /// Serial speed.
    #[arg(long, env = "GRBL_BAUD", default_value = "115200")]
    baud: u32,

    /// Seconds without acknowledgment before the queue is cleared.
    #[arg(long, env = "GRBL_STALL_TIMEOUT_SECS", default_value = "60")]
    stall_timeout_secs: u64,

    /// Also print the raw traffic in both directions.
    #[arg(long)]
    trace: bool,

    /// List serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn join_result(result: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    result.map_err(|e| GrblError::Io(std::io::Error::other(e)))?
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.list_ports {
        for port in available_ports()? {
            write_stdout_line(&port)?;
        }
        return Ok(());
    }

    let port = args
        .port
        .ok_or_else(|| GrblError::TransportOpen("no serial port given".to_string()))?;

    let mut config = LinkConfig::from_env();
    config.baud_rate = args.baud;
    config.stall_timeout = Duration::from_secs(args.stall_timeout_secs);

    info!(
        port = %port,
        baud = config.baud_rate,
        stall_timeout_secs = config.stall_timeout.as_secs(),
        "Opening serial port"
    );
    let stream = open_serial(&port, config.baud_rate)?;

    let sink = StdoutSink::new().with_traces(args.trace);
    let (handle, mut task) = spawn_link(stream, config, sink);

    let stdin = feed_stdin(&handle);
    tokio::pin!(stdin);
    let mut stdin_open = true;

    loop {
        tokio::select! {
            result = &mut task => {
                let result = join_result(result);
                if let Err(ref e) = result {
                    error!(error = %e, "Link exited with error");
                }
                return result;
            }
            result = &mut stdin, if stdin_open => {
                stdin_open = false;
                match result {
                    Ok(()) => info!("stdin closed, link keeps running until Ctrl-C"),
                    Err(e) => warn!(error = %e, "Stopped reading stdin"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, exiting...");
                break;
            }
        }
    }

    handle.abort().await?;
    join_result(task.await)
}
