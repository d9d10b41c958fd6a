//! State tables shared between the public API and the background workers.
//!
//! Each table lives behind its own `parking_lot` lock so that updating one
//! pin's value never blocks a caller interested in a different table, and
//! so a slow callback on one table cannot stall the Reporter from making
//! progress on another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::constants::PINS_PER_PORT;
use crate::errors::{Error, ProtocolError};

pub type DigitalCallback = Arc<dyn Fn(u8, u8) + Send + Sync>;
pub type AnalogCallback = Arc<dyn Fn(u8, u16) + Send + Sync>;
pub type I2cCallback = Arc<dyn Fn(u8, &[u16]) + Send + Sync>;
pub type SonarCallback = Arc<dyn Fn(u8, u16) + Send + Sync>;
/// Invoked with `(pin, humidity, temperature)`. Either reading may be one of
/// the DHT error sentinels (-1, -2, -3) instead of a real measurement.
pub type DhtCallback = Arc<dyn Fn(u8, f64, f64) + Send + Sync>;

pub struct DigitalPinState {
    pub value: u8,
    pub pull_up: bool,
    pub last_change: Instant,
    pub callback: Option<DigitalCallback>,
}

pub struct AnalogPinState {
    pub value: u16,
    pub differential: u16,
    pub last_change: Instant,
    pub callback: Option<AnalogCallback>,
}

pub struct I2cDeviceState {
    pub data: Vec<u16>,
    pub last_change: Instant,
    pub callback: Option<I2cCallback>,
}

pub struct SonarState {
    pub distance: u16,
    pub last_change: Instant,
    pub callback: Option<SonarCallback>,
}

pub struct DhtRegistration {
    pub sensor_type: u8,
    pub differential: f64,
    pub last_humidity: f64,
    pub last_temperature: f64,
    pub callback: Option<DhtCallback>,
}

/// A pin's advertised capability: supported mode ids paired with their
/// reported analog/PWM resolution in bits.
#[derive(Debug, Clone, Default)]
pub struct PinCapability {
    pub supported_modes: Vec<(u8, u8)>,
}

/// Per-digital-port cache of the last byte written, so that writing one pin
/// doesn't clobber its seven neighbors on the same port.
#[derive(Default)]
pub struct PortOutputCache {
    ports: Mutex<HashMap<u8, u8>>,
}

impl PortOutputCache {
    pub fn set_pin(&self, pin: u8, value: bool) -> (u8, u8) {
        let port = pin / PINS_PER_PORT;
        let offset = pin % PINS_PER_PORT;
        let mut ports = self.ports.lock();
        let byte = ports.entry(port).or_insert(0);
        if value {
            *byte |= 1 << offset;
        } else {
            *byte &= !(1 << offset);
        }
        (port, *byte)
    }
}

/// Identifies which in-flight query a reply is being rendezvoused for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Version,
    Firmware,
    Capability,
    AnalogMapping,
    PinState(u8),
}

/// Bounded rendezvous point between the calling thread (which issues a
/// query and waits) and the Reporter (which fulfills the matching slot once
/// the board replies).
pub struct QueryReplyTable<T> {
    slots: Mutex<HashMap<QueryKind, Option<T>>>,
    condvar: Condvar,
}

impl<T> Default for QueryReplyTable<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            condvar: Condvar::new(),
        }
    }
}

impl<T: Clone> QueryReplyTable<T> {
    /// Clears any stale reply and marks the slot as awaited, per the
    /// decision that every query clears its slot before being issued (not
    /// just pin-state queries).
    pub fn arm(&self, kind: QueryKind) {
        self.slots.lock().insert(kind, None);
    }

    pub fn fulfill(&self, kind: QueryKind, value: T) {
        let mut slots = self.slots.lock();
        slots.insert(kind, Some(value));
        self.condvar.notify_all();
    }

    pub fn wait(&self, kind: QueryKind, timeout: Duration) -> Result<T, Error> {
        let mut slots = self.slots.lock();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(Some(value)) = slots.get(&kind) {
                return Ok(value.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::from(ProtocolError::ReplyTimeout {
                    operation: "query reply",
                }));
            }
            let result = self.condvar.wait_for(&mut slots, remaining);
            if result.timed_out() {
                return Err(Error::from(ProtocolError::ReplyTimeout {
                    operation: "query reply",
                }));
            }
        }
    }
}

/// All shared state a [`crate::board::Board`] and its workers reach through.
#[derive(Default)]
pub struct BoardState {
    pub digital_pins: RwLock<HashMap<u8, DigitalPinState>>,
    pub analog_pins: RwLock<HashMap<u8, AnalogPinState>>,
    pub i2c_devices: RwLock<HashMap<u8, I2cDeviceState>>,
    pub sonar_devices: RwLock<HashMap<u8, SonarState>>,
    pub dht_registrations: RwLock<HashMap<u8, DhtRegistration>>,
    pub capabilities: RwLock<HashMap<u8, PinCapability>>,
    /// Maps an analog channel number (as used on the wire) to its digital
    /// pin number, as reported by `ANALOG_MAPPING_RESPONSE`.
    pub analog_channel_to_pin: RwLock<HashMap<u8, u8>>,
    pub port_output_cache: PortOutputCache,
    pub firmware_name: RwLock<String>,
    pub firmware_version: RwLock<(u8, u8)>,
    pub protocol_version: RwLock<(u8, u8)>,

    /// Number of digital pins reported by the last `ANALOG_MAPPING_RESPONSE`
    /// (one entry per byte in that payload).
    pub digital_pin_count: RwLock<usize>,
    /// Number of analog-capable pins (non-`NON_ANALOG_PIN` entries) reported
    /// by the last `ANALOG_MAPPING_RESPONSE`.
    pub analog_pin_count: RwLock<usize>,

    /// Rendezvous slot for `REPORT_VERSION` replies: `(major, minor)`.
    pub version_reply: QueryReplyTable<(u8, u8)>,
    /// Rendezvous slot for `REPORT_FIRMWARE` replies: `(major, minor, name)`.
    pub firmware_reply: QueryReplyTable<(u8, u8, String)>,
    /// Rendezvous slot for `CAPABILITY_RESPONSE`; carries a clone of the
    /// parsed per-pin capability map.
    pub capability_reply: QueryReplyTable<HashMap<u8, PinCapability>>,
    /// Rendezvous slot for `ANALOG_MAPPING_RESPONSE`; carries the raw
    /// per-digital-pin analog map bytes (`NON_ANALOG_PIN` = not analog).
    pub analog_mapping_reply: QueryReplyTable<Vec<u8>>,
    /// Rendezvous slots for `PIN_STATE_RESPONSE`, keyed per pin: `(pin, mode, value)`.
    pub pin_state_reply: QueryReplyTable<(u8, u8, u32)>,
}

impl BoardState {
    /// `digital_pin_count - analog_pin_count`, fixed once the analog-mapping
    /// handshake completes and never changed afterwards.
    pub fn first_analog_pin(&self) -> usize {
        self.digital_pin_count
            .read()
            .saturating_sub(*self.analog_pin_count.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_port_output_cache_coalesces_pins() {
        let cache = PortOutputCache::default();
        let (port, byte) = cache.set_pin(13, true);
        assert_eq!(port, 1);
        assert_eq!(byte, 0b0010_0000);
        let (port, byte) = cache.set_pin(8, true);
        assert_eq!(port, 1);
        assert_eq!(byte, 0b0010_0001);
    }

    #[test]
    fn test_query_reply_table_wait_times_out() {
        let table: QueryReplyTable<u8> = QueryReplyTable::default();
        table.arm(QueryKind::Firmware);
        let result = table.wait(QueryKind::Firmware, Duration::from_millis(20));
        assert!(result.is_err());
    }

    #[test]
    fn test_query_reply_table_wakes_waiter() {
        let table = Arc::new(QueryReplyTable::<u8>::default());
        table.arm(QueryKind::Capability);
        let writer = table.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.fulfill(QueryKind::Capability, 42);
        });
        let value = table
            .wait(QueryKind::Capability, Duration::from_secs(1))
            .unwrap();
        assert_eq!(value, 42);
        handle.join().unwrap();
    }
}
