//! Dump CAN traffic from a CombiAdapter
//!
//! Opens the adapter at 500 kbit/s and prints every received frame until
//! interrupted.

use combi_usb::{AdapterConfig, CombiAdapter};

fn main() -> combi_usb::Result<()> {
    env_logger::init();

    if !combi_usb::probe() {
        println!("No CombiAdapter found");
        return Ok(());
    }

    let config = AdapterConfig::new(500)
        .with_print_version(true)
        .with_on_error(|err| eprintln!("transport: {}", err))
        .with_on_message(|msg| println!("{}", msg));

    let mut adapter = CombiAdapter::new(config);
    adapter.init()?;
    println!("Listening... press Ctrl-C to stop");

    for frame in adapter.receiver().iter() {
        println!("RX  {}", frame);
    }

    adapter.close()
}
