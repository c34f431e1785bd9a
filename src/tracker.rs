// src/tracker.rs
//
// Controller-side aggregation of per-queue occupancy and loss counters.
//
// Queues live on the far side of a message boundary and report deltas via
// QueueStateUpdate; the tracker folds those deltas into cumulative counters
// that the reward path samples on demand. Sampling resets the drop/inbound
// counters; the drop high-water mark persists and serves as the packet-loss
// normalization bound.

use serde::{Deserialize, Serialize};

use crate::messages::QueueStateUpdate;
use crate::types::Percentage;

/// Aggregated state of one priority queue as seen by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QueueState {
    /// Last reported occupancy percentage.
    pub occupancy_percentage: Percentage,
    /// Packets dropped since the last reward sample.
    pub pkt_drop_cnt: u64,
    /// Packets arrived since the last reward sample.
    pub pkt_inbound_cnt: u64,
    /// Highest drop count ever observed at a sample point.
    pub max_pkt_drop_cnt: u64,
}

/// A point-in-time sample taken by the reward path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueSample {
    pub occupancy_percentage: Percentage,
    pub dropped: u64,
    pub inbound: u64,
    pub max_dropped: u64,
}

/// One `QueueState` entry per configured priority queue, created at node
/// initialization and living for the node's lifetime.
#[derive(Debug, Clone)]
pub struct QueueStateTracker {
    states: Vec<QueueState>,
}

impl QueueStateTracker {
    pub fn new(num_queues: usize) -> Self {
        Self {
            states: vec![QueueState::default(); num_queues],
        }
    }

    pub fn num_queues(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, queue: usize) -> Option<&QueueState> {
        self.states.get(queue)
    }

    /// Fold a queue-side delta update into the entry: occupancy overwrites,
    /// drop/inbound accumulate, and the drop high-water mark advances.
    pub fn apply_update(&mut self, queue: usize, update: &QueueStateUpdate) {
        let Some(s) = self.states.get_mut(queue) else {
            return;
        };
        s.occupancy_percentage = update.buffer_pop_percentage;
        s.pkt_drop_cnt += update.num_of_dropped;
        s.pkt_inbound_cnt += update.num_of_inbound;
        s.max_pkt_drop_cnt = s.max_pkt_drop_cnt.max(s.pkt_drop_cnt);
    }

    /// Occupancy percentages in queue-index order, for the observation.
    pub fn occupancy_snapshot(&self) -> Vec<Percentage> {
        self.states
            .iter()
            .map(|s| s.occupancy_percentage)
            .collect()
    }

    /// Read the cumulative counters for `queue` and reset drop/inbound.
    /// The high-water mark persists across samples.
    pub fn take_sample(&mut self, queue: usize) -> QueueSample {
        let Some(s) = self.states.get_mut(queue) else {
            return QueueSample {
                occupancy_percentage: 0.0,
                dropped: 0,
                inbound: 0,
                max_dropped: 0,
            };
        };
        let sample = QueueSample {
            occupancy_percentage: s.occupancy_percentage,
            dropped: s.pkt_drop_cnt,
            inbound: s.pkt_inbound_cnt,
            max_dropped: s.max_pkt_drop_cnt,
        };
        s.pkt_drop_cnt = 0;
        s.pkt_inbound_cnt = 0;
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(pop: f64, dropped: u64, inbound: u64) -> QueueStateUpdate {
        QueueStateUpdate {
            buffer_pop_percentage: pop,
            num_of_dropped: dropped,
            num_of_inbound: inbound,
        }
    }

    #[test]
    fn updates_accumulate_between_samples() {
        let mut t = QueueStateTracker::new(2);
        t.apply_update(0, &update(25.0, 1, 3));
        t.apply_update(0, &update(50.0, 2, 4));

        let s = t.state(0).unwrap();
        assert_eq!(s.occupancy_percentage, 50.0);
        assert_eq!(s.pkt_drop_cnt, 3);
        assert_eq!(s.pkt_inbound_cnt, 7);
    }

    #[test]
    fn sample_resets_counters_but_keeps_high_water() {
        let mut t = QueueStateTracker::new(1);
        t.apply_update(0, &update(75.0, 5, 10));

        let sample = t.take_sample(0);
        assert_eq!(sample.dropped, 5);
        assert_eq!(sample.inbound, 10);
        assert_eq!(sample.max_dropped, 5);

        let s = t.state(0).unwrap();
        assert_eq!(s.pkt_drop_cnt, 0);
        assert_eq!(s.pkt_inbound_cnt, 0);
        assert_eq!(s.max_pkt_drop_cnt, 5);

        // A smaller later burst does not lower the high-water mark.
        t.apply_update(0, &update(10.0, 2, 2));
        let sample = t.take_sample(0);
        assert_eq!(sample.dropped, 2);
        assert_eq!(sample.max_dropped, 5);
    }

    #[test]
    fn occupancy_snapshot_is_index_ordered() {
        let mut t = QueueStateTracker::new(3);
        t.apply_update(0, &update(10.0, 0, 0));
        t.apply_update(2, &update(30.0, 0, 0));
        assert_eq!(t.occupancy_snapshot(), vec![10.0, 0.0, 30.0]);
    }

    #[test]
    fn out_of_range_queue_is_ignored() {
        let mut t = QueueStateTracker::new(1);
        t.apply_update(5, &update(99.0, 9, 9));
        assert_eq!(t.state(0).unwrap().pkt_drop_cnt, 0);
    }
}
