//! A host-side driver for the Firmata serial protocol.
//!
//! This crate talks to a microcontroller running a Firmata sketch (or a
//! FirmataExpress-derived one) over a serial port or TCP socket, and exposes
//! its pins, sensors and actuators as a plain synchronous Rust API.
//!
//! # Getting started
//!
//! ```no_run
//! use firmata_host::{Board, BoardConfig};
//!
//! let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;
//! board.set_pin_mode_digital_output(13)?;
//! board.digital_write(13, true)?;
//! # Ok::<(), firmata_host::Error>(())
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates the `serialport` crate's
//!   _libudev_ feature, required on Linux for serial port listing.
//! - **mocks** -- Exposes [`mocks::MockTransport`] outside of tests, useful
//!   for exercising downstream code without a real board attached.

pub mod board;
pub mod codec;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod errors;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod state;
pub mod transport;

pub use board::Board;
pub use config::{BoardConfig, Endpoint};
pub use errors::Error;
