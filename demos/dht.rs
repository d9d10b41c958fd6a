//! Reads temperature and humidity from a DHT22 sensor on pin 2 every five
//! seconds.

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use firmata_host::board::DhtSensorType;
use firmata_host::{Board, BoardConfig};

const DHT_PIN: u8 = 2;

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    board.set_pin_mode_dht(
        DHT_PIN,
        DhtSensorType::Dht22,
        1.0,
        Some(Arc::new(|pin, humidity, temperature| {
            println!("dht pin {}: {:.1}% RH, {:.1}C", pin, humidity, temperature);
        })),
    )?;

    for _ in 0..12 {
        sleep(Duration::from_secs(5));
        if let Some((humidity, temperature, _)) = board.dht_read(DHT_PIN) {
            println!("cached: {:.1}% RH, {:.1}C", humidity, temperature);
        }
    }

    board.shutdown()
}
