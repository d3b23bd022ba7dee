//! Incremental protocol frame parser
//!
//! USB bulk reads land at arbitrary offsets: a chunk may end in the middle
//! of a length field, a payload, anywhere. The parser consumes the ring
//! buffer through a small state machine (command → length → payload →
//! terminator → dispatch) and never assumes a message arrives in one piece.
//! Because the framing is length-prefixed, a malformed message never costs
//! synchronization: the parser skips exactly the declared payload size and
//! resumes at the next command byte.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, trace, warn};

use crate::config::ErrorHook;
use crate::constants::{
    CMD_OPEN, CMD_RX_FRAME, CMD_TX_FRAME, CMD_VERSION, POLL_INTERVAL, TERMINATOR,
};
use crate::frame::CanFrame;
use crate::gate::TxGate;
use crate::packet::decode_rx_payload;
use crate::ring::RingBuffer;

pub(crate) struct FrameParser {
    ring: Arc<RingBuffer>,
    gate: Arc<TxGate>,
    inbound: Sender<CanFrame>,
    shutdown: Arc<AtomicBool>,
    on_error: ErrorHook,
}

impl FrameParser {
    pub(crate) fn new(
        ring: Arc<RingBuffer>,
        gate: Arc<TxGate>,
        inbound: Sender<CanFrame>,
        shutdown: Arc<AtomicBool>,
        on_error: ErrorHook,
    ) -> Self {
        Self {
            ring,
            gate,
            inbound,
            shutdown,
            on_error,
        }
    }

    /// Run the parse loop until the shutdown flag is set
    pub(crate) fn run(&self) {
        while !self.is_shutdown() {
            let Some(cmd) = self.next_byte() else { return };

            // The length field may not have arrived with the command byte.
            // RxFrame needs the 2 length bytes; everything else waits for
            // one extra byte to absorb the device's timing quirks.
            let margin = if cmd == CMD_RX_FRAME { 2 } else { 3 };
            if !self.wait_buffered(margin) {
                return;
            }

            let mut len_bytes = [0u8; 2];
            self.ring.read(&mut len_bytes);
            let len = u16::from_be_bytes(len_bytes) as usize;

            // Inbound frame payloads are data-dependent in size; hold off
            // until payload and terminator are fully buffered.
            if cmd == CMD_RX_FRAME && !self.wait_buffered(len + 1) {
                return;
            }

            let mut payload = vec![0u8; len];
            if !self.read_exact(&mut payload) {
                return;
            }
            let Some(term) = self.next_byte() else { return };
            if term != TERMINATOR {
                debug!("unexpected terminator {:02X} after cmd {:02X}", term, cmd);
            }

            self.dispatch(cmd, payload, term);
        }
    }

    fn dispatch(&self, cmd: u8, payload: Vec<u8>, term: u8) {
        match cmd {
            CMD_RX_FRAME => match decode_rx_payload(&payload) {
                Ok(frame) => {
                    trace!("rx {}", frame);
                    self.deliver(frame);
                }
                Err(err) => (self.on_error)(err),
            },
            // Acknowledgment of the previously transmitted frame; the
            // drain may race with a slot that was never filled.
            CMD_TX_FRAME => {
                self.gate.try_release();
            }
            // Correlated with prior synchronous requests that read the
            // endpoint directly; nothing to dispatch here.
            CMD_VERSION | CMD_OPEN => {}
            _ => {
                warn!(
                    "unknown cmd: {:02X}, len: {}, data: {:02X?}, term: {:02X}",
                    cmd,
                    payload.len(),
                    payload,
                    term
                );
            }
        }
    }

    /// Block until the inbound queue accepts the frame; backpressure toward
    /// the external consumer is intentional
    fn deliver(&self, mut frame: CanFrame) {
        while !self.is_shutdown() {
            match self.inbound.send_timeout(frame, POLL_INTERVAL) {
                Ok(()) => return,
                Err(crossbeam_channel::SendTimeoutError::Timeout(f)) => frame = f,
                Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    fn next_byte(&self) -> Option<u8> {
        loop {
            if let Some(byte) = self.ring.read_byte() {
                return Some(byte);
            }
            if self.is_shutdown() {
                return None;
            }
            self.ring.wait_readable(1, POLL_INTERVAL);
        }
    }

    fn wait_buffered(&self, min: usize) -> bool {
        while !self.ring.wait_readable(min, POLL_INTERVAL) {
            if self.is_shutdown() {
                return false;
            }
        }
        true
    }

    fn read_exact(&self, buf: &mut [u8]) -> bool {
        let mut filled = 0;
        while filled < buf.len() {
            filled += self.ring.read(&mut buf[filled..]);
            if filled == buf.len() {
                break;
            }
            if self.is_shutdown() {
                return false;
            }
            self.ring.wait_readable(1, POLL_INTERVAL);
        }
        true
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}
