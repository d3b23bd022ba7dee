//! Transmit flow-control gate
//!
//! The adapter firmware acknowledges every transmitted frame with a
//! `TxFrame`-coded message and tolerates only one frame in flight. The gate
//! is the single-slot token enforcing that: the transmit pump fills the
//! slot immediately before writing a frame, the frame parser drains it when
//! the acknowledgment arrives. Created empty.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Single-slot token limiting unacknowledged transmitted frames to one
pub struct TxGate {
    /// True while a transmitted frame awaits its acknowledgment
    filled: Mutex<bool>,
    drained: Condvar,
}

impl TxGate {
    /// Create an empty gate
    pub fn new() -> Self {
        Self {
            filled: Mutex::new(false),
            drained: Condvar::new(),
        }
    }

    /// Fill the slot, waiting up to `timeout` for it to be free
    ///
    /// Returns whether the slot was acquired. The wait is bounded so the
    /// caller can re-check its shutdown flag between attempts.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut filled = self.filled.lock();
        if *filled {
            self.drained.wait_for(&mut filled, timeout);
            if *filled {
                return false;
            }
        }
        *filled = true;
        true
    }

    /// Drain the slot if it is filled
    ///
    /// Non-blocking; returns whether a slot was actually drained. Draining
    /// an empty gate is a no-op since an acknowledgment may race with a
    /// slot that was never filled.
    pub fn try_release(&self) -> bool {
        let mut filled = self.filled.lock();
        let was_filled = *filled;
        *filled = false;
        drop(filled);
        if was_filled {
            self.drained.notify_one();
        }
        was_filled
    }

    /// Whether a transmitted frame is currently awaiting acknowledgment
    pub fn is_filled(&self) -> bool {
        *self.filled.lock()
    }
}

impl Default for TxGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_starts_empty() {
        let gate = TxGate::new();
        assert!(!gate.is_filled());
        assert!(gate.acquire_timeout(Duration::from_millis(1)));
        assert!(gate.is_filled());
    }

    #[test]
    fn test_at_most_one_slot() {
        let gate = TxGate::new();
        assert!(gate.acquire_timeout(Duration::from_millis(1)));
        assert!(!gate.acquire_timeout(Duration::from_millis(5)));
        assert!(gate.try_release());
        assert!(gate.acquire_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_release_empty_is_noop() {
        let gate = TxGate::new();
        assert!(!gate.try_release());
        assert!(!gate.is_filled());
    }

    #[test]
    fn test_acquire_wakes_on_release() {
        let gate = Arc::new(TxGate::new());
        assert!(gate.acquire_timeout(Duration::from_millis(1)));
        let acker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                gate.try_release();
            })
        };
        let mut acquired = false;
        for _ in 0..200 {
            if gate.acquire_timeout(Duration::from_millis(5)) {
                acquired = true;
                break;
            }
        }
        acker.join().unwrap();
        assert!(acquired);
    }
}
