//! Reports distance from an HC-SR04 ultrasonic rangefinder wired to a
//! trigger/echo pin pair.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const TRIGGER_PIN: u8 = 7;
const ECHO_PIN: u8 = 8;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_sonar(
        TRIGGER_PIN,
        ECHO_PIN,
        30_000,
        Some(Arc::new(|pin, distance| {
            println!("sonar {} -> {} cm", pin, distance);
        })),
    )?;

    sleep(Duration::from_secs(10));

    board.shutdown()
}
