//! Queries the board's capability and analog-mapping reports and prints the
//! pin layout it reveals.

use firmata_host::{Board, BoardConfig};

fn main() -> Result<(), firmata_host::Error> {
    env_logger::init();
    let mut board = Board::open(BoardConfig::default().with_serial_port("/dev/ttyACM0", 57_600))?;

    let capabilities = board.get_capability_report()?;
    for (pin, capability) in &capabilities {
        println!("pin {}: modes {:?}", pin, capability.supported_modes);
    }

    let analog_map = board.get_analog_map()?;
    println!("analog map: {:?}", analog_map);
    println!("first analog pin: {}", board.first_analog_pin());

    let (major, minor, name) = board.get_firmware_version()?;
    println!("firmware: {}.{} {}", major, minor, name);

    board.shutdown()
}
