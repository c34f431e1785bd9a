// src/agent.rs
//
// Decision agent seam. The real decision maker is an external collaborator;
// the trait pins down its request/response contract and the two built-in
// implementations give the harness a baseline to run against:
//
// - ThresholdAgent: sends when data is buffered, preferring the battery
//   while it holds enough charge (the heuristic baseline)
// - IdleAgent: never sends (lower-bound reference)
//
// An agent is a pure request/response function: same request, same internal
// state, same answer. Nothing is shared with the node between calls.

use crate::messages::{ActionRequest, ActionResponse, PowerSourceChoice};
use crate::types::Percentage;

pub const THRESHOLD_AGENT_VERSION: &str = "threshold-v1";
pub const IDLE_AGENT_VERSION: &str = "idle-v1";

/// Interface of decision agents.
pub trait Agent {
    /// Unique version string for this agent implementation.
    fn version(&self) -> &str;

    /// Turn a state+reward observation into an action decision.
    fn decide(&mut self, request: &ActionRequest) -> ActionResponse;
}

/// Heuristic baseline: drain the fullest queue whenever anything is
/// buffered, on battery power while the charge percentage stays above a
/// floor, on wired power below it.
#[derive(Debug, Clone)]
pub struct ThresholdAgent {
    /// Battery charge percentage below which sends switch to wired power.
    pub battery_floor_pct: Percentage,
    /// Messages to drain per send decision.
    pub burst: usize,
}

impl ThresholdAgent {
    pub fn new(battery_floor_pct: Percentage, burst: usize) -> Self {
        Self {
            battery_floor_pct,
            burst: burst.max(1),
        }
    }
}

impl Agent for ThresholdAgent {
    fn version(&self) -> &str {
        THRESHOLD_AGENT_VERSION
    }

    fn decide(&mut self, request: &ActionRequest) -> ActionResponse {
        let state = &request.state;

        // Fullest queue wins; ties break toward the lower index so the
        // decision stays deterministic.
        let mut best: Option<(usize, Percentage)> = None;
        for (idx, &pop) in state.queue_pop_percentage.iter().enumerate() {
            if pop > 0.0 && best.map(|(_, b)| pop > b).unwrap_or(true) {
                best = Some((idx, pop));
            }
        }

        let Some((queue, _)) = best else {
            return ActionResponse::idle();
        };

        let source = if state.energy_percentage >= self.battery_floor_pct {
            PowerSourceChoice::Battery
        } else {
            PowerSourceChoice::Wired
        };

        ActionResponse::send(queue, self.burst, source)
    }
}

/// Never sends. Useful as the do-nothing reference when comparing shaped
/// rewards across agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleAgent;

impl Agent for IdleAgent {
    fn version(&self) -> &str {
        IDLE_AGENT_VERSION
    }

    fn decide(&mut self, _request: &ActionRequest) -> ActionResponse {
        ActionResponse::idle()
    }
}
