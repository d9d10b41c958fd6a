//! Toggles pin 13 (the onboard LED on most Arduino boards) four times, one
//! second apart, then shuts down cleanly.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const LED_PIN: u8 = 13;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_digital_output(LED_PIN)?;

    for _ in 0..4 {
        println!("ON");
        board.digital_write(LED_PIN, true)?;
        sleep(Duration::from_secs(1));
        println!("OFF");
        board.digital_write(LED_PIN, false)?;
        sleep(Duration::from_secs(1));
    }

    board.shutdown()
}
