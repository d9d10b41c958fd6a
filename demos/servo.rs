//! Sweeps a servo on pin 9 between its configured end stops.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const SERVO_PIN: u8 = 9;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_servo(SERVO_PIN, 544, 2400)?;

    for _ in 0..3 {
        board.servo_write(SERVO_PIN, 0)?;
        sleep(Duration::from_secs(1));
        board.servo_write(SERVO_PIN, 180)?;
        sleep(Duration::from_secs(1));
    }

    board.shutdown()
}
