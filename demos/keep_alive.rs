//! Enables the background keep-alive worker and leaves the board idle,
//! relying on `KEEP_ALIVE` SysEx messages to hold the connection open.

use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(
        BoardConfig::default()
            .with_serial_port("/dev/ttyACM0", 57_600)
            .with_keep_alive(Duration::from_secs(2)),
    )?;

    sleep(Duration::from_secs(20));

    board.shutdown()
}
