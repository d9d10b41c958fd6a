//! Interprets tokenized [`Frame`]s, updates the relevant state table, and
//! hands back whatever user callback should be invoked as a result.
//!
//! Handlers never call a callback themselves: they return it (with its
//! arguments) to the caller, which invokes it only after every lock taken
//! while updating state has been released. This keeps a slow or panicking
//! callback from ever stalling the Reporter loop while it holds a table
//! lock.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace, warn};

use crate::codec::{decode_u14, decode_u7_stream, Frame};
use crate::constants::*;
use crate::state::{BoardState, QueryKind};

/// A callback ready to be invoked, detached from any lock.
pub enum CallbackInvocation {
    Digital {
        callback: crate::state::DigitalCallback,
        pin: u8,
        value: u8,
    },
    Analog {
        callback: crate::state::AnalogCallback,
        pin: u8,
        value: u16,
    },
    I2c {
        callback: crate::state::I2cCallback,
        address: u8,
        data: Vec<u16>,
    },
    Sonar {
        callback: crate::state::SonarCallback,
        pin: u8,
        distance: u16,
    },
    Dht {
        callback: crate::state::DhtCallback,
        pin: u8,
        humidity: f64,
        temperature: f64,
    },
}

impl CallbackInvocation {
    pub fn invoke(self) {
        match self {
            CallbackInvocation::Digital {
                callback,
                pin,
                value,
            } => callback(pin, value),
            CallbackInvocation::Analog {
                callback,
                pin,
                value,
            } => callback(pin, value),
            CallbackInvocation::I2c {
                callback,
                address,
                data,
            } => callback(address, &data),
            CallbackInvocation::Sonar {
                callback,
                pin,
                distance,
            } => callback(pin, distance),
            CallbackInvocation::Dht {
                callback,
                pin,
                humidity,
                temperature,
            } => callback(pin, humidity, temperature),
        }
    }
}

pub struct Dispatcher {
    state: Arc<BoardState>,
}

impl Dispatcher {
    pub fn new(state: Arc<BoardState>) -> Self {
        Self { state }
    }

    /// Interprets one frame, updates state, and returns every callback the
    /// caller should invoke once it has released every lock. A single
    /// digital port message may carry changes for more than one pin, hence
    /// the `Vec` rather than a single optional callback.
    pub fn dispatch(&self, frame: Frame) -> Vec<CallbackInvocation> {
        match frame {
            Frame::ProtocolVersion { major, minor } => {
                *self.state.protocol_version.write() = (major, minor);
                trace!("protocol version {}.{}", major, minor);
                self.state.version_reply.fulfill(QueryKind::Version, (major, minor));
                Vec::new()
            }
            Frame::Channel { status, lsb, msb } => match status & 0xF0 {
                ANALOG_MESSAGE => self.handle_analog_message(status, lsb, msb).into_iter().collect(),
                DIGITAL_MESSAGE => self.handle_digital_message(status, lsb, msb),
                _ => {
                    warn!("unexpected channel status byte {:#04X}", status);
                    Vec::new()
                }
            },
            Frame::Sysex { command, body } => self.handle_sysex(command, &body).into_iter().collect(),
        }
    }

    /// The channel in an `ANALOG_MESSAGE` status byte is the analog ordinal
    /// (A0, A1, ...), the same index `set_pin_mode_analog_input` registers
    /// state under -- not the underlying digital pin number.
    fn handle_analog_message(&self, status: u8, lsb: u8, msb: u8) -> Option<CallbackInvocation> {
        let pin = status & 0x0F;
        let value = decode_u14(lsb, msb);
        trace!("analog pin {} = {}", pin, value);

        let mut pins = self.state.analog_pins.write();
        let entry = pins.entry(pin).or_insert_with(|| crate::state::AnalogPinState {
            value,
            differential: 0,
            last_change: Instant::now(),
            callback: None,
        });
        let previous = entry.value;
        let delta = value.abs_diff(previous);
        entry.value = value;
        entry.last_change = Instant::now();
        if delta < entry.differential {
            return None;
        }
        entry
            .callback
            .clone()
            .map(|callback| CallbackInvocation::Analog {
                callback,
                pin,
                value,
            })
    }

    fn handle_digital_message(&self, status: u8, lsb: u8, msb: u8) -> Vec<CallbackInvocation> {
        let port = status & 0x0F;
        let bits = decode_u14(lsb, msb);
        trace!("digital port {} = {:#04X}", port, bits);

        let mut invocations = Vec::new();
        let mut pins = self.state.digital_pins.write();
        for offset in 0..PINS_PER_PORT {
            let pin = port * PINS_PER_PORT + offset;
            let Some(state) = pins.get_mut(&pin) else {
                continue;
            };
            let bit = ((bits >> offset) & 0x01) as u8;
            if bit != state.value {
                state.value = bit;
                state.last_change = Instant::now();
                if let Some(callback) = state.callback.clone() {
                    invocations.push(CallbackInvocation::Digital {
                        callback,
                        pin,
                        value: bit,
                    });
                }
            }
        }
        invocations
    }

    fn handle_sysex(&self, command: u8, body: &[u8]) -> Option<CallbackInvocation> {
        match command {
            REPORT_FIRMWARE => self.handle_firmware_report(body),
            STRING_DATA => self.handle_string_data(body),
            CAPABILITY_RESPONSE => self.handle_capability_response(body),
            ANALOG_MAPPING_RESPONSE => self.handle_analog_mapping_response(body),
            PIN_STATE_RESPONSE => self.handle_pin_state_response(body),
            I2C_REPLY => self.handle_i2c_reply(body),
            SONAR_DATA => self.handle_sonar_data(body),
            DHT_DATA => self.handle_dht_data(body),
            I_AM_HERE => self.handle_i_am_here(body),
            _ => {
                trace!("unhandled sysex command {:#04X}", command);
                None
            }
        }
    }

    fn handle_firmware_report(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if body.len() < 2 {
            warn!("truncated REPORT_FIRMWARE message");
            return None;
        }
        let major = body[0];
        let minor = body[1];
        let name: String = body[2..]
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| decode_u14(pair[0], pair[1]) as u8 as char)
            .collect();
        *self.state.firmware_version.write() = (major, minor);
        *self.state.firmware_name.write() = name.clone();
        debug!("firmware report: {}.{} {}", major, minor, name);
        self.state
            .firmware_reply
            .fulfill(QueryKind::Firmware, (major, minor, name));
        None
    }

    fn handle_string_data(&self, body: &[u8]) -> Option<CallbackInvocation> {
        let text: String = body
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| decode_u14(pair[0], pair[1]) as u8 as char)
            .collect();
        log::info!("string data from board: {}", text);
        None
    }

    fn handle_capability_response(&self, body: &[u8]) -> Option<CallbackInvocation> {
        let mut capabilities = self.state.capabilities.write();
        capabilities.clear();
        let mut pin = 0u8;
        let mut modes = Vec::new();
        let mut i = 0;
        while i < body.len() {
            if body[i] == SYSEX_REALTIME {
                capabilities.insert(
                    pin,
                    crate::state::PinCapability {
                        supported_modes: std::mem::take(&mut modes),
                    },
                );
                pin += 1;
                i += 1;
                continue;
            }
            if i + 1 >= body.len() {
                break;
            }
            modes.push((body[i], body[i + 1]));
            i += 2;
        }
        debug!("capability response: {} pins", capabilities.len());
        let snapshot = capabilities.clone();
        drop(capabilities);
        self.state
            .capability_reply
            .fulfill(QueryKind::Capability, snapshot);
        None
    }

    fn handle_analog_mapping_response(&self, body: &[u8]) -> Option<CallbackInvocation> {
        let mut map = self.state.analog_channel_to_pin.write();
        map.clear();
        for (pin, &channel) in body.iter().enumerate() {
            if channel != NON_ANALOG_PIN {
                map.insert(channel, pin as u8);
            }
        }
        *self.state.digital_pin_count.write() = body.len();
        *self.state.analog_pin_count.write() = map.len();
        debug!(
            "analog mapping response: {} digital pins, {} analog pins",
            body.len(),
            map.len()
        );
        drop(map);
        self.state
            .analog_mapping_reply
            .fulfill(QueryKind::AnalogMapping, body.to_vec());
        None
    }

    fn handle_pin_state_response(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if body.len() < 2 {
            warn!("truncated PIN_STATE_RESPONSE message");
            return None;
        }
        let pin = body[0];
        let mode = body[1];
        let value = decode_u7_stream(&body[2..]);
        debug!("pin state response: pin {} mode {} value {}", pin, mode, value);
        self.state
            .pin_state_reply
            .fulfill(QueryKind::PinState(pin), (pin, mode, value));
        None
    }

    fn handle_i2c_reply(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if body.len() < 4 {
            warn!("truncated I2C_REPLY message");
            return None;
        }
        let address = body[0];
        let data: Vec<u16> = body[4..]
            .chunks(2)
            .filter(|chunk| chunk.len() == 2)
            .map(|chunk| decode_u14(chunk[0], chunk[1]))
            .collect();
        trace!("i2c reply from {:#04X}: {:?}", address, data);

        let mut devices = self.state.i2c_devices.write();
        let entry = devices
            .entry(address)
            .or_insert_with(|| crate::state::I2cDeviceState {
                data: Vec::new(),
                last_change: Instant::now(),
                callback: None,
            });
        entry.data = data.clone();
        entry.last_change = Instant::now();
        entry
            .callback
            .clone()
            .map(|callback| CallbackInvocation::I2c {
                callback,
                address,
                data,
            })
    }

    fn handle_sonar_data(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if body.len() < 3 {
            warn!("truncated SONAR_DATA message");
            return None;
        }
        let pin = body[0];
        let distance = decode_u14(body[1], body[2]);
        trace!("sonar pin {} = {}cm", pin, distance);

        let mut devices = self.state.sonar_devices.write();
        let entry = devices
            .entry(pin)
            .or_insert_with(|| crate::state::SonarState {
                distance,
                last_change: Instant::now(),
                callback: None,
            });
        entry.distance = distance;
        entry.last_change = Instant::now();
        entry
            .callback
            .clone()
            .map(|callback| CallbackInvocation::Sonar {
                callback,
                pin,
                distance,
            })
    }

    /// Payload: `[pin, sensor_type, b2, b3, b4, b5, sign_flag, error_status,
    /// config_flag, config_value]`. A nonzero `error_status` overrides the
    /// reading entirely with the matching sentinel (config/checksum/timeout).
    fn handle_dht_data(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if body.len() < 8 {
            warn!("truncated DHT_DATA message");
            return None;
        }
        let pin = body[0];
        let sensor_type = body[1];
        let b2 = body[2];
        let b3 = body[3];
        let b4 = body[4];
        let b5 = body[5];
        let sign_flag = body[6];
        let error_status = body[7];

        let (humidity, temperature) = if error_status != 0 {
            let sentinel = -(error_status as f64);
            (sentinel, sentinel)
        } else {
            match sensor_type {
                DHT22 | DHT21 | AM2301 => {
                    let humidity = (b2 as u32 * 256 + b3 as u32) as f64 / 10.0;
                    let mut temperature = ((b4 & 0x7F) as u32 * 256 + b5 as u32) as f64 / 10.0;
                    if sign_flag != 0 {
                        temperature = -temperature;
                    }
                    (humidity, temperature)
                }
                _ => {
                    // DHT11 / DHT12.
                    let humidity = b2 as f64 + (b3 as f64) / 10.0;
                    let mut temperature = b4 as f64 + (b5 as f64) / 10.0;
                    if sign_flag != 0 {
                        temperature = -temperature;
                    }
                    (humidity, temperature)
                }
            }
        };
        trace!(
            "dht pin {} humidity {} temperature {}",
            pin,
            humidity,
            temperature
        );

        let mut registrations = self.state.dht_registrations.write();
        let Some(registration) = registrations.get_mut(&pin) else {
            return None;
        };
        let humidity_delta = (humidity - registration.last_humidity).abs();
        let temperature_delta = (temperature - registration.last_temperature).abs();
        registration.last_humidity = humidity;
        registration.last_temperature = temperature;
        if humidity_delta < registration.differential && temperature_delta < registration.differential {
            return None;
        }
        registration
            .callback
            .clone()
            .map(|callback| CallbackInvocation::Dht {
                callback,
                pin,
                humidity,
                temperature,
            })
    }

    fn handle_i_am_here(&self, body: &[u8]) -> Option<CallbackInvocation> {
        if let Some(&instance_id) = body.first() {
            trace!("I_AM_HERE instance {}", instance_id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_u14;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::Mutex;

    fn dispatcher() -> (Dispatcher, Arc<BoardState>) {
        let state = Arc::new(BoardState::default());
        (Dispatcher::new(state.clone()), state)
    }

    #[test]
    fn test_analog_message_updates_state_and_fires_callback() {
        let (dispatcher, state) = dispatcher();
        let seen = Arc::new(AtomicU16::new(0));
        {
            let seen = seen.clone();
            state.analog_pins.write().insert(
                0,
                crate::state::AnalogPinState {
                    value: 0,
                    differential: 0,
                    last_change: Instant::now(),
                    callback: Some(Arc::new(move |_pin, value| seen.store(value, Ordering::SeqCst))),
                },
            );
        }
        let (lsb, msb) = encode_u14(42);
        let invocation = dispatcher.dispatch(Frame::Channel {
            status: ANALOG_MESSAGE,
            lsb,
            msb,
        });
        invocation.into_iter().next().unwrap().invoke();
        assert_eq!(seen.load(Ordering::SeqCst), 42);
        assert_eq!(state.analog_pins.read().get(&0).unwrap().value, 42);
    }

    #[test]
    fn test_digital_message_updates_one_pin() {
        let (dispatcher, state) = dispatcher();
        state.digital_pins.write().insert(
            5,
            crate::state::DigitalPinState {
                value: 0,
                pull_up: false,
                last_change: Instant::now(),
                callback: None,
            },
        );
        // Port 0 spans pins 0..8; set bit 5.
        let invocation = dispatcher.dispatch(Frame::Channel {
            status: DIGITAL_MESSAGE,
            lsb: 0b0010_0000,
            msb: 0,
        });
        assert!(invocation.is_empty());
        assert_eq!(state.digital_pins.read().get(&5).unwrap().value, 1);
    }

    #[test]
    fn test_capability_response_parses_pins() {
        let (dispatcher, state) = dispatcher();
        // Pin 0: INPUT(res 1), OUTPUT(res 1); pin 1: ANALOG(res 10).
        let body = vec![0, 1, 1, 1, SYSEX_REALTIME, 2, 10, SYSEX_REALTIME];
        dispatcher.dispatch(Frame::Sysex {
            command: CAPABILITY_RESPONSE,
            body,
        });
        let capabilities = state.capabilities.read();
        assert_eq!(capabilities.len(), 2);
        assert_eq!(capabilities.get(&0).unwrap().supported_modes, vec![(0, 1), (1, 1)]);
        assert_eq!(capabilities.get(&1).unwrap().supported_modes, vec![(2, 10)]);
    }

    #[test]
    fn test_firmware_report_fulfills_reply_slot() {
        let (dispatcher, state) = dispatcher();
        state.firmware_reply.arm(QueryKind::Firmware);
        let name: Vec<u8> = "StandardFirmata".bytes().flat_map(|b| [b, 0]).collect();
        let mut body = vec![2, 5];
        body.extend(name);
        dispatcher.dispatch(Frame::Sysex {
            command: REPORT_FIRMWARE,
            body,
        });
        let (major, minor, name) = state
            .firmware_reply
            .wait(QueryKind::Firmware, std::time::Duration::from_millis(10))
            .unwrap();
        assert_eq!((major, minor), (2, 5));
        assert_eq!(name, "StandardFirmata");
    }

    #[test]
    fn test_dht_data_decodes_sentinel_error() {
        let (dispatcher, state) = dispatcher();
        state.dht_registrations.write().insert(
            4,
            crate::state::DhtRegistration {
                sensor_type: DHT22,
                differential: 0.0,
                last_humidity: 0.0,
                last_temperature: 0.0,
                callback: None,
            },
        );
        // sensor_type, b2..b5, sign_flag=0, error_status=3 (timeout).
        let invocation = dispatcher.dispatch(Frame::Sysex {
            command: DHT_DATA,
            body: vec![4, DHT22, 0, 0, 0, 0, 0, 3, 0, 0],
        });
        assert!(invocation.is_empty());
        let registration = state.dht_registrations.read();
        let registration = registration.get(&4).unwrap();
        assert_eq!(registration.last_humidity, -3.0);
        assert_eq!(registration.last_temperature, -3.0);
    }

    #[test]
    fn test_dht_data_decodes_dht22_reading() {
        let (dispatcher, state) = dispatcher();
        let seen = Arc::new(Mutex::new((0.0f64, 0.0f64)));
        {
            let seen = seen.clone();
            state.dht_registrations.write().insert(
                4,
                crate::state::DhtRegistration {
                    sensor_type: DHT22,
                    differential: 0.0,
                    last_humidity: 0.0,
                    last_temperature: 0.0,
                    callback: Some(Arc::new(move |_pin, h, t| *seen.lock().unwrap() = (h, t))),
                },
            );
        }
        // humidity = (2*256+88)/10.0 = 60.0, temperature = (1*256+12)/10.0 = 26.8, negated.
        let invocation = dispatcher.dispatch(Frame::Sysex {
            command: DHT_DATA,
            body: vec![4, DHT22, 2, 88, 1, 12, 1, 0, 0, 0],
        });
        invocation.into_iter().next().unwrap().invoke();
        let (humidity, temperature) = *seen.lock().unwrap();
        assert_eq!(humidity, 60.0);
        assert_eq!(temperature, -26.8);
    }

    #[test]
    fn test_dht_data_fires_on_either_field_crossing_differential_alone() {
        let (dispatcher, state) = dispatcher();
        let seen = Arc::new(AtomicU16::new(0));
        {
            let seen = seen.clone();
            state.dht_registrations.write().insert(
                4,
                crate::state::DhtRegistration {
                    sensor_type: DHT11,
                    differential: 2.0,
                    last_humidity: 40.0,
                    last_temperature: 20.0,
                    callback: Some(Arc::new(move |_pin, h, _t| seen.store(h as u16, Ordering::SeqCst))),
                },
            );
        }
        // humidity moves by 5 (>= differential), temperature stays put: must still fire.
        // humidity = 45 + 0/10.0 = 45.0, temperature = 20 + 0/10.0 = 20.0 (unchanged).
        let invocation = dispatcher.dispatch(Frame::Sysex {
            command: DHT_DATA,
            body: vec![4, DHT11, 45, 0, 20, 0, 0, 0, 0, 0],
        });
        assert!(!invocation.is_empty());
        invocation.into_iter().next().unwrap().invoke();
        assert_eq!(seen.load(Ordering::SeqCst), 45);
    }

    #[test]
    fn test_dht_data_suppresses_when_neither_field_crosses_differential() {
        let (dispatcher, state) = dispatcher();
        state.dht_registrations.write().insert(
            4,
            crate::state::DhtRegistration {
                sensor_type: DHT11,
                differential: 5.0,
                last_humidity: 40.0,
                last_temperature: 20.0,
                callback: None,
            },
        );
        // humidity moves by 3 and temperature by 3: each alone stays under the
        // differential of 5, so no callback should fire even though their sum
        // (6) would cross it.
        let invocation = dispatcher.dispatch(Frame::Sysex {
            command: DHT_DATA,
            body: vec![4, DHT11, 43, 0, 23, 0, 0, 0, 0, 0],
        });
        assert!(invocation.is_empty());
    }

    #[test]
    fn test_dht_data_decodes_dht11_reading() {
        let (dispatcher, state) = dispatcher();
        state.dht_registrations.write().insert(
            7,
            crate::state::DhtRegistration {
                sensor_type: DHT11,
                differential: 0.0,
                last_humidity: 0.0,
                last_temperature: 0.0,
                callback: None,
            },
        );
        // humidity = 45 + 0/10.0 = 45.0, temperature = 21 + 5/10.0 = 21.5.
        dispatcher.dispatch(Frame::Sysex {
            command: DHT_DATA,
            body: vec![7, DHT11, 45, 0, 21, 5, 0, 0, 0, 0],
        });
        let registration = state.dht_registrations.read();
        let registration = registration.get(&7).unwrap();
        assert_eq!(registration.last_humidity, 45.0);
        assert_eq!(registration.last_temperature, 21.5);
    }

    #[test]
    fn test_analog_mapping_response_sets_pin_counts() {
        let (dispatcher, state) = dispatcher();
        // 4 digital pins total, pins 0 and 1 are non-analog, 2 and 3 map to channels 0 and 1.
        dispatcher.dispatch(Frame::Sysex {
            command: ANALOG_MAPPING_RESPONSE,
            body: vec![NON_ANALOG_PIN, NON_ANALOG_PIN, 0, 1],
        });
        assert_eq!(*state.digital_pin_count.read(), 4);
        assert_eq!(*state.analog_pin_count.read(), 2);
        assert_eq!(state.first_analog_pin(), 2);
    }
}
