//! Reports analog pin A0 every time it changes by more than the configured
//! differential, for ten seconds.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const ANALOG_PIN: u8 = 0;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_analog_input(
        ANALOG_PIN,
        1,
        Some(std::sync::Arc::new(|pin, value| {
            println!("analog pin {} -> {}", pin, value);
        })),
    )?;

    sleep(Duration::from_secs(10));

    board.shutdown()
}
