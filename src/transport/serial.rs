use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::errors::{Error, ProtocolError};
use crate::transport::Transport;

/// A [`Transport`] backed by a physical or virtual serial port, via the
/// [serialport](https://crates.io/crates/serialport) crate.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    io: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            io: None,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), Error> {
        let connection = serialport::new(self.port_name.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_secs(1))
            .open()?;
        self.io = Some(connection);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.io = None;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.io
            .as_mut()
            .ok_or(ProtocolError::NotInitialized)?
            .write_all(buf)?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, Error> {
        let io = self.io.as_mut().ok_or(ProtocolError::NotInitialized)?;
        io.set_timeout(timeout)?;
        let mut byte = [0u8; 1];
        io.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, Error> {
        let io = self.io.as_ref().ok_or(ProtocolError::NotInitialized)?;
        let cloned = io.try_clone()?;
        Ok(Box::new(SerialTransport {
            port_name: self.port_name.clone(),
            baud_rate: self.baud_rate,
            io: Some(cloned),
        }))
    }
}
