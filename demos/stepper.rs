//! Configures a two-wire stepper motor and drives it forward then backward.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const STEPS_PER_REVOLUTION: u16 = 200;
const STEPPER_PINS: [u8; 2] = [4, 5];

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_stepper(STEPS_PER_REVOLUTION, &STEPPER_PINS)?;

    board.stepper_write(10, 200)?;
    sleep(Duration::from_secs(3));
    board.stepper_write(10, -200)?;
    sleep(Duration::from_secs(3));

    board.shutdown()
}
