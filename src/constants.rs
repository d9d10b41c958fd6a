//! Firmata wire protocol constants.
//!
//! Values mirror the Firmata protocol specification and the extensions
//! shipped by FirmataExpress (sonar, tone, DHT, stepper, keep-alive).

// ########################################
// Protocol version

pub const PROTOCOL_MAJOR_VERSION: u8 = 2;
pub const PROTOCOL_MINOR_VERSION: u8 = 5;

// ########################################
// Message command bytes (0x80-0xFF)

/// Send data for a digital port (collection of 8 pins).
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM).
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable/disable analog input reporting by pin #.
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable/disable digital input reporting by port pair.
pub const REPORT_DIGITAL: u8 = 0xD0;
/// Upper bound of the digital message command range.
pub const DIGITAL_MESSAGE_BOUND: u8 = 0x9F;
/// Upper bound of the analog message command range.
pub const ANALOG_MESSAGE_BOUND: u8 = 0xEF;
/// Set a pin to INPUT/OUTPUT/PWM/etc.
pub const SET_PIN_MODE: u8 = 0xF4;
/// Set the value of an individual digital pin.
pub const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
/// Report protocol version.
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset board state.
pub const SYSTEM_RESET: u8 = 0xFF;
/// Start a SysEx message.
pub const START_SYSEX: u8 = 0xF0;
/// End a SysEx message.
pub const END_SYSEX: u8 = 0xF7;

// ########################################
// SysEx command bytes (0x00-0x7F)

pub const SERVO_CONFIG: u8 = 0x70;
pub const STRING_DATA: u8 = 0x71;
pub const STEPPER_DATA: u8 = 0x72;
pub const ONEWIRE_DATA: u8 = 0x73;
pub const SHIFT_DATA: u8 = 0x75;
pub const I2C_REQUEST: u8 = 0x76;
pub const I2C_REPLY: u8 = 0x77;
pub const I2C_CONFIG: u8 = 0x78;
pub const REPORT_FIRMWARE: u8 = 0x79;
pub const SAMPLING_INTERVAL: u8 = 0x7A;
pub const EXTENDED_ANALOG: u8 = 0x6F;
pub const PIN_STATE_QUERY: u8 = 0x6D;
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
pub const CAPABILITY_QUERY: u8 = 0x6B;
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;

// FirmataExpress extensions.
pub const SONAR_CONFIG: u8 = 0x62;
pub const SONAR_DATA: u8 = 0x63;
pub const TONE_DATA: u8 = 0x5F;
pub const DHT_CONFIG: u8 = 0x64;
pub const DHT_DATA: u8 = 0x65;
pub const KEEP_ALIVE: u8 = 0x66;
pub const ARE_YOU_THERE: u8 = 0x67;
pub const I_AM_HERE: u8 = 0x68;

/// Marks the boundary between pins inside a `CAPABILITY_RESPONSE` payload.
/// Numerically identical to `NON_ANALOG_PIN` but distinct in meaning.
pub const SYSEX_REALTIME: u8 = 0x7F;

// Tone sub-commands (inside TONE_DATA).
pub const TONE_TONE: u8 = 0x00;
pub const TONE_NO_TONE: u8 = 0x01;

// ########################################
// I2C mode sub-byte (inside I2C_REQUEST), final values as sent on the wire.

pub const I2C_WRITE: u8 = 0x00;
pub const I2C_READ: u8 = 0x08;
pub const I2C_READ_CONTINUOUSLY: u8 = 0x10;
pub const I2C_STOP_READING: u8 = 0x18;
pub const I2C_END_TX_MASK: u8 = 0x40;

/// Sentinel marking a pin as non-analog in an `ANALOG_MAPPING_RESPONSE` byte.
pub const NON_ANALOG_PIN: u8 = 0x7F;

// ########################################
// Stepper sub-commands

pub const STEPPER_CONFIGURE: u8 = 0x00;
pub const STEPPER_STEP: u8 = 0x01;

// ########################################
// Pin modes

pub const INPUT: u8 = 0x00;
pub const OUTPUT: u8 = 0x01;
pub const ANALOG: u8 = 0x02;
pub const PWM: u8 = 0x03;
pub const SERVO: u8 = 0x04;
pub const I2C: u8 = 0x06;
pub const STEPPER: u8 = 0x08;
pub const PULLUP: u8 = 0x0B;
pub const SONAR: u8 = 0x0C;
pub const TONE: u8 = 0x0D;
pub const DHT: u8 = 0x0F;

// ########################################
// DHT sensor types
//
// Values match the DHTStable Arduino library's sensor-type numbering used
// by FirmataExpress sketches (the literal decimal values callers pass, e.g.
// `sensor_type=22`). AM2301 is a rebadged DHT21 and shares its code.

pub const DHT11: u8 = 11;
pub const DHT12: u8 = 12;
pub const DHT22: u8 = 22;
pub const DHT21: u8 = 21;
pub const AM2301: u8 = 21;

/// Error sentinel values a DHT read can report instead of a reading.
pub const DHT_CONFIG_ERROR: i32 = -1;
pub const DHT_CHECKSUM_ERROR: i32 = -2;
pub const DHT_TIMEOUT_ERROR: i32 = -3;

// ########################################
// Misc limits

/// Max number of concurrently active sonar (HC-SR04) devices.
pub const MAX_SONAR_DEVICES: usize = 6;
/// Number of pins grouped into one digital "port" for REPORT_DIGITAL / DIGITAL_MESSAGE.
pub const PINS_PER_PORT: u8 = 8;
/// Default bound for query/reply rendezvous operations.
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 4_000;
/// Default wait after opening the transport before probing for a board
/// (time for the microcontroller's bootloader to reset and the sketch to boot).
pub const DEFAULT_ARDUINO_WAIT_SECS: u64 = 4;
