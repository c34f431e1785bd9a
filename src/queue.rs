// src/queue.rs
//
// Fixed-capacity FIFO buffer for one priority class. The queue enforces
// capacity only; drop and inbound accounting lives in the companion tracker
// entry and is maintained by the caller that observes the insert outcome.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::messages::DataPacket;
use crate::types::Percentage;

/// Capacity violation on insert. Recoverable: the caller drops the packet,
/// bumps the drop counter and continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueError {
    Full { capacity: usize },
}

/// Bounded FIFO buffer for one priority class (index = priority).
#[derive(Debug, Clone)]
pub struct BoundedDataQueue {
    buf: VecDeque<DataPacket>,
    capacity: usize,
}

impl BoundedDataQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a packet, taking ownership. Fails with `QueueError::Full` when
    /// the queue is at capacity; the packet is returned to the caller via
    /// the drop path (it is consumed here either way, the caller keeps its
    /// own accounting).
    pub fn insert(&mut self, packet: DataPacket) -> Result<(), QueueError> {
        if self.buf.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.buf.push_back(packet);
        Ok(())
    }

    /// Remove and return up to `n` packets in FIFO order. Underflow is not
    /// an error: fewer than `n` packets are returned if the queue runs dry.
    pub fn pop_n(&mut self, n: usize) -> Vec<DataPacket> {
        let take = n.min(self.buf.len());
        self.buf.drain(..take).collect()
    }

    /// Occupancy as a percentage of capacity. A zero-capacity queue is
    /// always full by convention.
    pub fn occupancy_percentage(&self) -> Percentage {
        if self.capacity == 0 {
            return 100.0;
        }
        self.buf.len() as f64 * 100.0 / self.capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(id: u64) -> DataPacket {
        DataPacket {
            msg_id: id,
            size_bits: 800,
            queued_at_ms: 0,
        }
    }

    #[test]
    fn insert_beyond_capacity_fails_and_leaves_length_unchanged() {
        let mut q = BoundedDataQueue::new(3);
        for i in 0..3 {
            q.insert(packet(i)).unwrap();
        }
        assert_eq!(q.len(), 3);

        let err = q.insert(packet(3)).unwrap_err();
        assert_eq!(err, QueueError::Full { capacity: 3 });
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn pop_n_is_fifo_and_tolerates_underflow() {
        let mut q = BoundedDataQueue::new(10);
        for i in 0..4 {
            q.insert(packet(i)).unwrap();
        }

        let first = q.pop_n(2);
        assert_eq!(
            first.iter().map(|p| p.msg_id).collect::<Vec<_>>(),
            vec![0, 1]
        );

        // Asking for more than remains returns only what is there.
        let rest = q.pop_n(10);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].msg_id, 2);
        assert!(q.is_empty());

        assert!(q.pop_n(1).is_empty());
    }

    #[test]
    fn occupancy_percentage_tracks_length() {
        let mut q = BoundedDataQueue::new(4);
        assert_eq!(q.occupancy_percentage(), 0.0);
        q.insert(packet(0)).unwrap();
        assert_eq!(q.occupancy_percentage(), 25.0);
        q.insert(packet(1)).unwrap();
        q.insert(packet(2)).unwrap();
        q.insert(packet(3)).unwrap();
        assert_eq!(q.occupancy_percentage(), 100.0);
    }

    #[test]
    fn zero_capacity_queue_is_always_full() {
        let mut q = BoundedDataQueue::new(0);
        assert_eq!(q.occupancy_percentage(), 100.0);
        assert!(q.insert(packet(0)).is_err());
    }
}
