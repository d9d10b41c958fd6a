use log::error;
use snafu::Snafu;

pub use crate::errors::Error::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Protocol error: {source}.
    ProtocolError { source: ProtocolError },
    /// Hardware error: {source}.
    HardwareError { source: HardwareError },
    /// Unknown error: {info}.
    Unknown { info: String },
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        error!("std::io error {:?}", error);
        let info = match error.kind() {
            std::io::ErrorKind::NotFound => String::from("board not found or already in use"),
            std::io::ErrorKind::PermissionDenied => String::from("board connection lost"),
            std::io::ErrorKind::TimedOut => String::from("timed out waiting for a reply"),
            _ => error.to_string(),
        };
        Self::ProtocolError {
            source: ProtocolError::IoException { info },
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(error: serialport::Error) -> Self {
        error!("serialport error {:?}", error);
        Self::ProtocolError {
            source: ProtocolError::IoException {
                info: error.to_string(),
            },
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(value: ProtocolError) -> Self {
        Self::ProtocolError { source: value }
    }
}

impl From<HardwareError> for Error {
    fn from(value: HardwareError) -> Self {
        Self::HardwareError { source: value }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProtocolError {
    /// {info}
    IoException { info: String },
    /// Could not find a board on any candidate port (instance id {instance_id})
    DiscoveryFailed { instance_id: u8 },
    /// Board did not report its firmware name/version within the startup window
    FirmwareUnavailable,
    /// Board reports Firmata protocol {major}.{minor}, which this driver does not support
    FirmwareVersionMismatch { major: u8, minor: u8 },
    /// Connection has not been initialized
    NotInitialized,
    /// Not enough bytes received - '{operation}' expected {expected} bytes, {received} received
    MessageTooShort {
        operation: &'static str,
        expected: usize,
        received: usize,
    },
    /// Unexpected data received
    UnexpectedData,
    /// Timed out waiting for a reply to '{operation}'
    ReplyTimeout { operation: &'static str },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum HardwareError {
    /// Pin ({pin}) not compatible with mode ({mode})
    IncompatibleMode { pin: u8, mode: u8 },
    /// Unknown pin {pin}
    UnknownPin { pin: u8 },
    /// Invalid argument: {info}
    InvalidArgument { info: String },
    /// DHT sensor on pin {pin} reported error code {code}
    DhtSensorError { pin: u8, code: i32 },
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_error_display() {
        let protocol_error = Error::from(ProtocolError::NotInitialized);
        assert_eq!(
            format!("{}", protocol_error),
            "Protocol error: Connection has not been initialized."
        );

        let hardware_error = Error::from(HardwareError::IncompatibleMode { pin: 3, mode: 4 });
        assert_eq!(
            format!("{}", hardware_error),
            "Hardware error: Pin (3) not compatible with mode (4)."
        );

        let unknown_error = Unknown {
            info: "some unknown error".to_string(),
        };
        assert_eq!(
            format!("{}", unknown_error),
            "Unknown error: some unknown error."
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: Error = io_error.into();
        assert_eq!(
            format!("{}", error),
            "Protocol error: board not found or already in use."
        );
    }

    #[test]
    fn test_from_hardware_error() {
        let hardware_error = HardwareError::UnknownPin { pin: 42 };
        let error: Error = hardware_error.into();
        assert_eq!(format!("{}", error), "Hardware error: Unknown pin 42.");
    }

    #[test]
    fn test_discovery_failed_display() {
        let error = Error::from(ProtocolError::DiscoveryFailed { instance_id: 1 });
        assert_eq!(
            format!("{}", error),
            "Protocol error: Could not find a board on any candidate port (instance id 1)."
        );
    }
}
