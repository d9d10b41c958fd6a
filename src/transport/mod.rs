//! Byte-level transports the driver can speak Firmata over.

mod serial;
mod tcp;

use std::time::Duration;

pub use serial::SerialTransport;
pub use tcp::TcpTransport;

use crate::errors::Error;

/// A raw byte pipe to a board. Implementors own the actual I/O primitive
/// (a serial port, a TCP socket, ...); everything above this layer only
/// ever sees bytes.
pub trait Transport: Send {
    fn open(&mut self) -> Result<(), Error>;
    fn close(&mut self) -> Result<(), Error>;
    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error>;
    /// Blocking read of a single byte, bounded by the transport's configured
    /// timeout. Used by the Receiver worker, which is the only caller
    /// allowed to block on I/O.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8, Error>;
    /// Duplicates the underlying OS handle so reads and writes can proceed
    /// from different threads without contending on one lock. Must be
    /// called after `open`.
    fn try_clone(&self) -> Result<Box<dyn Transport>, Error>;
}

/// Lists the serial ports worth probing during auto-detection: anything the
/// OS reports as a USB serial device. Mirrors `serialport::available_ports`,
/// filtered to USB ports since auto-detection has no use for e.g. Bluetooth
/// RFCOMM ports that happen to be enumerated.
pub fn candidate_serial_ports() -> Result<Vec<String>, Error> {
    let ports = serialport::available_ports().map_err(Error::from)?;
    Ok(ports
        .into_iter()
        .filter(|p| matches!(p.port_type, serialport::SerialPortType::UsbPort(_)))
        .map(|p| p.port_name)
        .collect())
}
