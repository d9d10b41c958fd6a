//! Plays a short beep on a piezo buzzer, then a continuous tone that is
//! silenced after a second.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const TONE_PIN: u8 = 3;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_tone(TONE_PIN)?;

    board.play_tone(TONE_PIN, 440, 500)?;
    sleep(Duration::from_secs(1));

    board.play_tone_continuously(TONE_PIN, 880)?;
    sleep(Duration::from_secs(1));
    board.play_tone_off(TONE_PIN)?;

    board.shutdown()
}
