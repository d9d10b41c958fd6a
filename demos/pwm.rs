//! Fades an LED connected to a PWM-capable pin up and down.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const PWM_PIN: u8 = 9;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_pwm_output(PWM_PIN)?;

    for value in (0u16..=255).step_by(5) {
        board.pwm_write(PWM_PIN, value)?;
        sleep(Duration::from_millis(30));
    }
    for value in (0u16..=255).step_by(5).rev() {
        board.pwm_write(PWM_PIN, value)?;
        sleep(Duration::from_millis(30));
    }

    board.shutdown()
}
