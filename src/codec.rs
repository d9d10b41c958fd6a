//! Byte-level framing and 7-bit value encoding for the Firmata wire format.
//!
//! [`FrameReader`] is a pure state machine: it owns no transport and performs
//! no I/O. It is fed one byte at a time (by the Receiver worker, by a test,
//! or by anything else holding bytes) and emits a [`Frame`] whenever a
//! complete message has accumulated. This keeps the tokenizer unit-testable
//! without a transport and keeps blocking I/O confined to the transport
//! layer, per the driver's concurrency model.

use crate::constants::{
    ANALOG_MESSAGE, ANALOG_MESSAGE_BOUND, DIGITAL_MESSAGE, DIGITAL_MESSAGE_BOUND, END_SYSEX,
    REPORT_VERSION, START_SYSEX,
};

/// A fully decoded, but not yet interpreted, wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `0xF9 major minor`
    ProtocolVersion { major: u8, minor: u8 },
    /// `0x90|0xE0 | channel`, two 7-bit data bytes.
    Channel { status: u8, lsb: u8, msb: u8 },
    /// `0xF0 command ...body... 0xF7`. `body` excludes the command byte and
    /// the trailing `END_SYSEX`.
    Sysex { command: u8, body: Vec<u8> },
}

#[derive(Debug)]
enum ReaderState {
    Idle,
    Channel { status: u8, lsb: Option<u8> },
    AwaitVersionMajor,
    AwaitVersionMinor { major: u8 },
    Sysex { command: Option<u8>, body: Vec<u8> },
}

/// Tokenizes a raw byte stream into [`Frame`]s.
#[derive(Debug)]
pub struct FrameReader {
    state: ReaderState,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            state: ReaderState::Idle,
        }
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte into the reader. Returns `Some(frame)` when that byte
    /// completed a message.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match &mut self.state {
            ReaderState::Idle => self.start(byte),
            ReaderState::Channel { status, lsb } => {
                if lsb.is_none() {
                    *lsb = Some(byte);
                    None
                } else {
                    let frame = Frame::Channel {
                        status: *status,
                        lsb: lsb.unwrap(),
                        msb: byte,
                    };
                    self.state = ReaderState::Idle;
                    Some(frame)
                }
            }
            ReaderState::AwaitVersionMajor => {
                self.state = ReaderState::AwaitVersionMinor { major: byte };
                None
            }
            ReaderState::AwaitVersionMinor { major } => {
                let frame = Frame::ProtocolVersion {
                    major: *major,
                    minor: byte,
                };
                self.state = ReaderState::Idle;
                Some(frame)
            }
            ReaderState::Sysex { command, body } => {
                if command.is_none() {
                    *command = Some(byte);
                    None
                } else if byte == END_SYSEX {
                    let frame = Frame::Sysex {
                        command: command.unwrap(),
                        body: std::mem::take(body),
                    };
                    self.state = ReaderState::Idle;
                    Some(frame)
                } else {
                    body.push(byte);
                    None
                }
            }
        }
    }

    fn start(&mut self, byte: u8) -> Option<Frame> {
        match byte {
            REPORT_VERSION => {
                self.state = ReaderState::AwaitVersionMajor;
                None
            }
            START_SYSEX => {
                self.state = ReaderState::Sysex {
                    command: None,
                    body: Vec::new(),
                };
                None
            }
            DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND | ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => {
                self.state = ReaderState::Channel {
                    status: byte,
                    lsb: None,
                };
                None
            }
            // Unexpected byte outside a frame: ignored, stays idle.
            _ => None,
        }
    }
}

/// Decodes a little-endian 14-bit value from two 7-bit bytes.
pub fn decode_u14(lsb: u8, msb: u8) -> u16 {
    (lsb as u16 & 0x7F) | ((msb as u16 & 0x7F) << 7)
}

/// Encodes a 14-bit value into two 7-bit bytes, least-significant first.
pub fn encode_u14(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

/// Decodes a little-endian value spanning an arbitrary number of 7-bit bytes.
pub fn decode_u7_stream(bytes: &[u8]) -> u32 {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= (*byte as u32 & 0x7F) << (7 * i);
    }
    value
}

/// Encodes an arbitrary-width value into 7-bit bytes, least-significant first.
/// `byte_count` is the number of 7-bit bytes to emit.
pub fn encode_u7_stream(mut value: u32, byte_count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(byte_count);
    for _ in 0..byte_count {
        out.push((value & 0x7F) as u8);
        value >>= 7;
    }
    out
}
