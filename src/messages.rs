// src/messages.rs
//
// Wire schemas exchanged at the node boundary: the decision agent on one
// side, the queue modules on the other. These are transient request/response
// payloads: the receiver consumes them and they are not reused across
// cycles (unlike the long-lived timer slots in `types`).

use serde::{Deserialize, Serialize};

use crate::types::{Percentage, SimTimeMs};

/// Sampled node state shipped to the agent with every action request.
///
/// Field order of `queue_pop_percentage` is the queue/priority index order
/// and is stable across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStateSnapshot {
    /// Battery charge as a percentage of capacity.
    pub energy_percentage: Percentage,
    /// Last observed charge rate as a percentage of the charger capacity.
    pub charge_rate_percentage: Percentage,
    /// Occupancy percentage per priority queue, ordered by queue index.
    pub queue_pop_percentage: Vec<Percentage>,
}

/// Request for a decision, carrying the sampled state and the reward earned
/// by the previously executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub state: NodeStateSnapshot,
    pub reward: f64,
}

/// Power source the agent selects for a send action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerSourceChoice {
    Battery,
    Wired,
}

/// The agent's decision for one ask-action cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// true = drain and transmit buffered data, false = stay idle.
    pub send_message: bool,
    /// Preferred power source for the transmission cost.
    pub select_power_source: PowerSourceChoice,
    /// Index of the queue to drain.
    pub queue: usize,
    /// Number of buffered messages to transmit.
    pub msg_to_send: usize,
}

impl ActionResponse {
    /// Decision that keeps the node idle for this cycle.
    pub fn idle() -> Self {
        Self {
            send_message: false,
            select_power_source: PowerSourceChoice::Battery,
            queue: 0,
            msg_to_send: 0,
        }
    }

    /// Decision to drain `n` messages from `queue` on the given source.
    pub fn send(queue: usize, n: usize, source: PowerSourceChoice) -> Self {
        Self {
            send_message: true,
            select_power_source: source,
            queue,
            msg_to_send: n,
        }
    }
}

/// One buffered data unit.
///
/// Ownership is explicit: inserting a packet into a queue moves it, so the
/// queue's lifetime is independent of the producer's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPacket {
    /// Producer-assigned message id.
    pub msg_id: u64,
    /// Payload size in bits.
    pub size_bits: u64,
    /// Simulated time at which the packet entered the queue.
    pub queued_at_ms: SimTimeMs,
}

/// Request to fetch up to `data_n` packets from a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDataRequest {
    pub data_n: usize,
}

/// Counters a queue reports whenever its state may have changed.
///
/// Drop/inbound counts are deltas since the queue's previous update; the
/// tracker on the controller side accumulates them between reward samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStateUpdate {
    pub buffer_pop_percentage: Percentage,
    pub num_of_dropped: u64,
    pub num_of_inbound: u64,
}

/// Response to a `QueueDataRequest`: the fetched packets (possibly fewer
/// than requested) plus a fresh state update for the serviced queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDataResponse {
    /// Index of the queue that was serviced.
    pub queue: usize,
    /// Fetched packets in FIFO order.
    pub data: Vec<DataPacket>,
    /// State sampled right after the fetch.
    pub state_update: QueueStateUpdate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_response_constructors() {
        let idle = ActionResponse::idle();
        assert!(!idle.send_message);
        assert_eq!(idle.msg_to_send, 0);

        let send = ActionResponse::send(2, 5, PowerSourceChoice::Wired);
        assert!(send.send_message);
        assert_eq!(send.queue, 2);
        assert_eq!(send.msg_to_send, 5);
        assert_eq!(send.select_power_source, PowerSourceChoice::Wired);
    }

    #[test]
    fn action_request_round_trips_through_json() {
        let req = ActionRequest {
            state: NodeStateSnapshot {
                energy_percentage: 80.0,
                charge_rate_percentage: 12.5,
                queue_pop_percentage: vec![0.0, 50.0, 100.0],
            },
            reward: -0.25,
        };
        let json = serde_json::to_string(&req).unwrap();
        let parsed: ActionRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, parsed);
    }
}
