//! Serial port transport.
//!
//! Grbl talks 8 data bits, 1 stop bit, no parity, no flow control.
//!
//! # Example
//!
//! ```ignore
//! use grbl_link::transport::open_serial;
//!
//! let port = open_serial("/dev/ttyUSB0", 115_200)?;
//! ```

use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{GrblError, Result};

/// Open `path` at `baud_rate`, 8N1.
///
/// Must be called from within a tokio runtime.
pub fn open_serial(path: &str, baud_rate: u32) -> Result<SerialStream> {
    tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| GrblError::TransportOpen(format!("{}: {}", path, e)))
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| GrblError::TransportOpen(e.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
