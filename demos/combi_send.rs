//! Send a single diagnostic frame through a CombiAdapter
//!
//! Transmits an OBD-II "start diagnostic session" request on 0x7E0 and
//! prints the responses that arrive within a short window.

use std::time::Duration;

use combi_usb::{AdapterConfig, CanFrame, CombiAdapter};

fn main() -> combi_usb::Result<()> {
    env_logger::init();

    if !combi_usb::probe() {
        println!("No CombiAdapter found");
        return Ok(());
    }

    let mut adapter = CombiAdapter::new(AdapterConfig::new(500));
    adapter.init()?;

    adapter
        .sender()
        .send(CanFrame::outgoing(0x7E0, &[0x02, 0x10, 0x01]))
        .ok();

    let receiver = adapter.receiver();
    while let Ok(frame) = receiver.recv_timeout(Duration::from_millis(500)) {
        println!("RX  {}", frame);
    }

    adapter.close()
}
