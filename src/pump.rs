//! Transmit pump
//!
//! Consumes the outbound frame queue and writes encoded transmit packets to
//! the device, one at a time. The firmware tolerates a single frame in
//! flight, so every write first fills the flow-control gate and the next
//! write waits until the frame parser has drained it on acknowledgment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::trace;

use crate::config::ErrorHook;
use crate::constants::POLL_INTERVAL;
use crate::error::{CombiError, Result};
use crate::frame::CanFrame;
use crate::gate::TxGate;
use crate::packet::encode_tx_frame;

pub(crate) struct TxPump {
    outbound: Receiver<CanFrame>,
    gate: Arc<TxGate>,
    shutdown: Arc<AtomicBool>,
    on_error: ErrorHook,
}

impl TxPump {
    pub(crate) fn new(
        outbound: Receiver<CanFrame>,
        gate: Arc<TxGate>,
        shutdown: Arc<AtomicBool>,
        on_error: ErrorHook,
    ) -> Self {
        Self {
            outbound,
            gate,
            shutdown,
            on_error,
        }
    }

    /// Run the pump loop until the shutdown flag is set
    ///
    /// `write` performs one bulk transfer and returns the byte count the
    /// endpoint accepted.
    pub(crate) fn run<W>(&self, mut write: W)
    where
        W: FnMut(&[u8]) -> Result<usize>,
    {
        while !self.is_shutdown() {
            let frame = match self.outbound.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            };

            // At most one unacknowledged frame: wait for the previous
            // acknowledgment before touching the wire.
            loop {
                if self.is_shutdown() {
                    return;
                }
                if self.gate.acquire_timeout(POLL_INTERVAL) {
                    break;
                }
            }

            let packet = encode_tx_frame(&frame);
            trace!("tx {}", frame);
            match write(&packet) {
                Ok(n) if n == packet.len() => {}
                Ok(n) => {
                    (self.on_error)(CombiError::ShortWrite {
                        expected: packet.len(),
                        actual: n,
                    });
                    // No acknowledgment will come for a frame the device
                    // never accepted; free the slot.
                    self.gate.try_release();
                }
                Err(err) => {
                    (self.on_error)(err);
                    self.gate.try_release();
                }
            }
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn spawn_pump<W>(
        write: W,
    ) -> (
        crossbeam_channel::Sender<CanFrame>,
        Arc<TxGate>,
        Arc<AtomicBool>,
        std::thread::JoinHandle<()>,
    )
    where
        W: FnMut(&[u8]) -> Result<usize> + Send + 'static,
    {
        let (tx, rx) = bounded(10);
        let gate = Arc::new(TxGate::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pump = TxPump::new(
            rx,
            Arc::clone(&gate),
            Arc::clone(&shutdown),
            Arc::new(|_| {}),
        );
        let task = std::thread::spawn(move || pump.run(write));
        (tx, gate, shutdown, task)
    }

    #[test]
    fn test_writes_encoded_packet() {
        let written: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);
        let (tx, gate, shutdown, task) = spawn_pump(move |bytes| {
            sink.lock().push(bytes.to_vec());
            Ok(bytes.len())
        });

        tx.send(CanFrame::outgoing(0x7E0, &[0x02, 0x10, 0x01])).unwrap();
        for _ in 0..500 {
            if !written.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        shutdown.store(true, Ordering::Relaxed);
        task.join().unwrap();

        let written = written.lock();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0][..3], [0x83, 0x00, 0x0F]);
        assert_eq!(written[0].len(), 19);
        assert!(gate.is_filled());
    }

    #[test]
    fn test_at_most_one_in_flight() {
        let written: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);
        let (tx, gate, shutdown, task) = spawn_pump(move |bytes| {
            sink.lock().push(bytes.to_vec());
            Ok(bytes.len())
        });

        for i in 0..3u8 {
            tx.send(CanFrame::outgoing(0x7E0, &[i])).unwrap();
        }

        // Acknowledge each write in submission order; the next frame must
        // not hit the wire before the previous acknowledgment.
        for expected in 0..3usize {
            for _ in 0..500 {
                if written.lock().len() > expected {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(written.lock().len(), expected + 1);
            // Held back until the acknowledgment drains the gate
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(written.lock().len(), expected + 1);
            gate.try_release();
        }

        shutdown.store(true, Ordering::Relaxed);
        task.join().unwrap();

        let written = written.lock();
        for (i, packet) in written.iter().enumerate() {
            assert_eq!(packet[7], i as u8);
        }
    }

    #[test]
    fn test_write_failure_is_nonfatal_and_frees_gate() {
        let written: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);
        let attempts = Arc::new(AtomicBool::new(false));
        let first = Arc::clone(&attempts);
        let (tx, gate, shutdown, task) = spawn_pump(move |bytes| {
            if !first.swap(true, Ordering::SeqCst) {
                return Err(CombiError::BulkTransfer(rusb::Error::Pipe));
            }
            sink.lock().push(bytes.to_vec());
            Ok(bytes.len())
        });

        tx.send(CanFrame::outgoing(0x100, &[0x01])).unwrap();
        tx.send(CanFrame::outgoing(0x200, &[0x02])).unwrap();

        // The failed first write must release the gate so the second frame
        // still goes out.
        for _ in 0..500 {
            if !written.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(written.lock().len(), 1);
        assert_eq!(written.lock()[0][3], 0x00);
        assert_eq!(written.lock()[0][4], 0x02);
        assert!(gate.is_filled());

        shutdown.store(true, Ordering::Relaxed);
        task.join().unwrap();
    }
}
