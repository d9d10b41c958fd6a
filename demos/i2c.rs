//! Reads six bytes starting at register 0x32 from an I2C device at address
//! 0x53 (an ADXL345 accelerometer's X/Y/Z data registers), once per second.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use firmata_host::{Board, BoardConfig};

const DEVICE_ADDRESS: u8 = 0x53;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_i2c(0)?;

    let callback: firmata_host::state::I2cCallback = Arc::new(|address, data| {
        println!("i2c {:#04x}: {:?}", address, data);
    });

    for _ in 0..10 {
        board.i2c_read(DEVICE_ADDRESS, Some(0x32), 6, Some(callback.clone()))?;
        sleep(Duration::from_secs(1));
    }

    board.shutdown()
}
