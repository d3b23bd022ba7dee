//! CombiAdapter USB transport driver
//!
//! This crate provides a Rust driver for the CombiAdapter, a USB-attached
//! CAN bus interface used by automotive diagnostic tooling. It speaks the
//! adapter's proprietary command/length/payload/terminator protocol over
//! USB bulk endpoints and exposes plain CAN frames through bounded queues.
//!
//! # Features
//!
//! - Incremental protocol parsing that tolerates USB reads landing at
//!   arbitrary offsets relative to message boundaries
//! - Acknowledgment-driven flow control (at most one transmitted frame in
//!   flight)
//! - Three background tasks per open session: USB reader, frame parser and
//!   transmit pump, all stopped through a single shutdown signal
//! - Best-effort teardown of partially initialized sessions
//!
//! # Example
//!
//! ```no_run
//! use combi_usb::{AdapterConfig, CanFrame, CombiAdapter};
//!
//! fn main() -> combi_usb::Result<()> {
//!     // Check for the device before committing to a session
//!     if !combi_usb::probe() {
//!         println!("No CombiAdapter found");
//!         return Ok(());
//!     }
//!
//!     let config = AdapterConfig::new(500)
//!         .with_print_version(true)
//!         .with_on_error(|err| eprintln!("transport: {}", err));
//!
//!     let mut adapter = CombiAdapter::new(config);
//!     adapter.init()?;
//!
//!     // Queue a frame for transmission
//!     adapter
//!         .sender()
//!         .send(CanFrame::outgoing(0x7E0, &[0x02, 0x10, 0x01]))
//!         .ok();
//!
//!     // Read decoded frames
//!     for frame in adapter.receiver().iter().take(10) {
//!         println!("RX  {}", frame);
//!     }
//!
//!     adapter.close()
//! }
//! ```
//!
//! # Supported devices
//!
//! - CombiAdapter (VID: 0xFFFF, PID: 0x0005)

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod gate;
pub mod packet;
pub mod ring;

mod parser;
mod pump;

// Re-export main types at crate root
pub use config::{AdapterConfig, ErrorHook, MessageHook};
pub use constants::{
    CMD_OPEN, CMD_RX_FRAME, CMD_SET_BITRATE, CMD_TX_FRAME, CMD_VERSION, COMBI_PID, COMBI_VID,
};
pub use device::{probe, CombiAdapter};
pub use error::{CombiError, Result};
pub use frame::{CanFrame, Direction};
pub use gate::TxGate;
pub use packet::CombiPacket;
pub use ring::RingBuffer;
