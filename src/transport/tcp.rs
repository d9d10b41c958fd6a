use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::errors::{Error, ProtocolError};
use crate::transport::Transport;

/// A [`Transport`] backed by a TCP connection, for boards that bridge
/// Firmata over WiFi (e.g. an ESP8266/ESP32 running FirmataExpress).
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<(), Error> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.stream = None;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.stream
            .as_mut()
            .ok_or(ProtocolError::NotInitialized)?
            .write_all(buf)?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8, Error> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::NotInitialized)?;
        stream.set_read_timeout(Some(timeout))?;
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>, Error> {
        let stream = self.stream.as_ref().ok_or(ProtocolError::NotInitialized)?;
        let cloned = stream.try_clone()?;
        Ok(Box::new(TcpTransport {
            host: self.host.clone(),
            port: self.port,
            stream: Some(cloned),
        }))
    }
}
