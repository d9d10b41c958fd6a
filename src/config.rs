use std::time::Duration;

use crate::constants::{DEFAULT_ARDUINO_WAIT_SECS, DEFAULT_REPLY_TIMEOUT_MS};

/// How the driver should reach the board.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Open a specific serial device at the given baud rate.
    Serial { port: String, baud_rate: u32 },
    /// Probe every serial candidate on the machine for a board that answers
    /// the `ARE_YOU_THERE` handshake with a matching instance id.
    AutoDetect { baud_rate: u32 },
    /// Connect to a board reachable over TCP/IP (e.g. an ESP8266 running
    /// FirmataExpress over WiFi).
    Tcp { host: String, port: u16 },
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::AutoDetect { baud_rate: 115_200 }
    }
}

/// Construction options for [`crate::board::Board`].
///
/// Mirrors every knob the original driver exposes on its constructor,
/// gathered into one struct instead of a long parameter list.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub endpoint: Endpoint,
    /// Instance id sent/expected during the `ARE_YOU_THERE` handshake.
    pub instance_id: u8,
    /// How long to wait after opening the transport before probing it,
    /// to give the microcontroller's bootloader time to reset and boot
    /// the sketch.
    pub arduino_wait: Duration,
    /// Bound on query/reply rendezvous operations (firmware, capability,
    /// analog-mapping, pin-state queries).
    pub reply_timeout: Duration,
    /// Whether a keep-alive worker thread should ping the board
    /// periodically once the handshake completes.
    pub keep_alive_interval: Option<Duration>,
    /// If a write fails, whether the driver should tear down its background
    /// workers before surfacing the error, rather than leaving them running
    /// against a transport it knows is broken.
    pub shutdown_on_exception: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            instance_id: 1,
            arduino_wait: Duration::from_secs(DEFAULT_ARDUINO_WAIT_SECS),
            reply_timeout: Duration::from_millis(DEFAULT_REPLY_TIMEOUT_MS),
            keep_alive_interval: Some(Duration::from_secs(1)),
            shutdown_on_exception: true,
        }
    }
}

impl BoardConfig {
    pub fn with_serial_port(mut self, port: impl Into<String>, baud_rate: u32) -> Self {
        self.endpoint = Endpoint::Serial {
            port: port.into(),
            baud_rate,
        };
        self
    }

    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.endpoint = Endpoint::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    pub fn with_instance_id(mut self, instance_id: u8) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn with_arduino_wait(mut self, wait: Duration) -> Self {
        self.arduino_wait = wait;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }

    pub fn with_shutdown_on_exception(mut self, shutdown_on_exception: bool) -> Self {
        self.shutdown_on_exception = shutdown_on_exception;
        self
    }
}
