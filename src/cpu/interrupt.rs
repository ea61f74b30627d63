//! Interrupt manager: a FIFO queue of pending comparison results.
//!
//! `CMP` pushes a signed compare result (-1/0/+1) onto the tail; each
//! conditional-jump signal pops at most one entry from the head. The queue
//! is cleared wholesale on program reload.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterruptManager {
    queue: VecDeque<i32>,
}

impl InterruptManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending code to the FIFO tail.
    pub fn request(&mut self, code: i32) {
        self.queue.push_back(code);
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Pop the oldest pending code, if any. This is the consumption path
    /// used by the conditional-jump signals.
    pub fn take(&mut self) -> Option<i32> {
        self.queue.pop_front()
    }

    /// Drain and report every pending code. Diagnostic sink only; has no
    /// further effect on CPU state.
    pub fn process(&mut self) -> Vec<i32> {
        let drained: Vec<i32> = self.queue.drain(..).collect();
        for code in &drained {
            debug!(target: "interrupt", code = *code, "processing pending interrupt");
        }
        drained
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_fifo() {
        let mut ints = InterruptManager::new();
        ints.request(-1);
        ints.request(0);
        ints.request(1);
        assert_eq!(ints.take(), Some(-1));
        assert_eq!(ints.take(), Some(0));
        assert_eq!(ints.take(), Some(1));
        assert_eq!(ints.take(), None);
    }

    #[test]
    fn process_drains_everything() {
        let mut ints = InterruptManager::new();
        ints.request(0);
        ints.request(5);
        assert_eq!(ints.process(), vec![0, 5]);
        assert!(!ints.has_pending());
    }

    #[test]
    fn clear_discards_pending() {
        let mut ints = InterruptManager::new();
        ints.request(1);
        ints.clear();
        assert!(!ints.has_pending());
        assert_eq!(ints.pending(), 0);
    }
}
