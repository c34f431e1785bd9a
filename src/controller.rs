// src/controller.rs
//
// The node's action loop: a single-flight state machine that samples node
// state, asks the external agent for a decision, executes it, and computes
// the shaped reward for the next request.
//
// The controller is pure at its boundary: events go in, commands come out.
// The surrounding scheduler (the sim harness, or any other host) delivers
// timer fires and response messages and executes the emitted commands. No
// I/O happens here besides telemetry sinking and warn lines for dropped
// messages.
//
// Phases:
//   Idle              = waiting for the ask-action timer
//   AwaitingAgent     = request sent, waiting for the decision
//   AwaitingQueueData = decision was "send", waiting for the fetched data
//
// Only one ask-action cycle is ever in flight: the ask timer is rearmed at
// the terminal reward computation of the cycle it started, never before.
// The charge-battery timer is orthogonal and never touches the phase.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::energy::{ConsumptionBreakdown, EnergyLedger};
use crate::messages::{
    ActionRequest, ActionResponse, NodeStateSnapshot, QueueDataRequest, QueueDataResponse,
    QueueStateUpdate,
};
use crate::power::{PowerSource, TxEnergyModel};
use crate::reward::{
    symbols, Normalizer, RewardEngine, RewardError, SYM_COST_PER_MWH, SYM_DROPPED,
    SYM_ENERGY_MWH, SYM_OCCUPANCY_PCT, TERM_ENERGY_COST, TERM_PACKET_DROP,
    TERM_QUEUE_OCCUPANCY,
};
use crate::telemetry::{ChargeRecord, CycleOutcome, CycleRecord, CycleSink};
use crate::tracker::QueueStateTracker;
use crate::types::{Percentage, PowerSourceKind, SimTimeMs, TimerKind};

/// Where the controller is within the ask-action cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    Idle,
    AwaitingAgent,
    AwaitingQueueData { queue: usize },
}

/// Events delivered to the controller by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Timer(TimerKind),
    AgentResponse(ActionResponse),
    QueueData(QueueDataResponse),
    /// A queue reported a state change (arrival or drop).
    QueueStateChanged {
        queue: usize,
        update: QueueStateUpdate,
    },
}

/// Commands the controller asks the scheduler to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SendActionRequest(ActionRequest),
    SendQueueDataRequest {
        queue: usize,
        request: QueueDataRequest,
    },
    /// Arm (or reschedule, idempotently) a timer slot.
    ArmTimer { kind: TimerKind, delta_ms: SimTimeMs },
}

/// Fatal controller failures a supervisor should log and restart from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerError {
    Reward(RewardError),
}

impl From<RewardError> for ControllerError {
    fn from(e: RewardError) -> Self {
        ControllerError::Reward(e)
    }
}

/// The action-loop state machine for one node.
pub struct Controller<'a, S: CycleSink> {
    cfg: &'a Config,
    phase: CyclePhase,
    ledger: EnergyLedger,
    charger: PowerSource,
    tx_model: TxEnergyModel,
    tracker: QueueStateTracker,
    engine: RewardEngine,
    sink: S,
    /// Reward earned by the previously executed action; rides on the next
    /// ActionRequest.
    last_reward: f64,
    /// Last observed charge rate, percentage of charger capacity.
    last_charge_rate_pct: Percentage,
    cycle_index: u64,
    /// The decision currently being executed (send case only).
    pending_action: Option<ActionResponse>,
    /// The observation that opened the in-flight cycle, kept for telemetry.
    pending_observation: Option<NodeStateSnapshot>,
}

impl<'a, S: CycleSink> Controller<'a, S> {
    /// Build a controller with all power sources plugged. `charger_seed`
    /// seeds the stochastic charger's draw stream.
    pub fn new(cfg: &'a Config, charger_seed: u64, sink: S) -> Self {
        let mut battery =
            PowerSource::battery(cfg.power.battery_capacity_mwh, cfg.power.battery_cost_per_mwh);
        let mut wired = PowerSource::wired(cfg.power.wired_cost_per_mwh);
        let mut charger = PowerSource::charger(
            cfg.power.charger_capacity_mwh,
            cfg.power.charge_model,
            charger_seed,
        );
        battery.plug();
        wired.plug();
        charger.plug();

        let tx_model = TxEnergyModel::new(cfg.link.tx_mw);
        // Stale-by-design initial estimate: the energy of one maximum-size
        // packet at the configured link rate.
        let initial_max = tx_model.tx_energy_mwh(cfg.link.max_packet_bits, cfg.link.rate_bps);

        Self {
            cfg,
            phase: CyclePhase::Idle,
            ledger: EnergyLedger::new(battery, wired, initial_max),
            charger,
            tx_model,
            tracker: QueueStateTracker::new(cfg.queues.num_queues()),
            engine: RewardEngine::with_standard_terms(
                cfg.reward.energy_weight,
                cfg.reward.occupancy_weight,
                cfg.reward.drop_weight,
            ),
            sink,
            last_reward: 0.0,
            last_charge_rate_pct: 0.0,
            cycle_index: 0,
            pending_action: None,
            pending_observation: None,
        }
    }

    /// Arm both timers at node startup. The controller enters `Idle` and
    /// waits for the first ask-action fire.
    pub fn start(&mut self) -> Vec<Command> {
        self.phase = CyclePhase::Idle;
        vec![
            Command::ArmTimer {
                kind: TimerKind::AskAction,
                delta_ms: self.cfg.timers.ask_action_interval_ms,
            },
            Command::ArmTimer {
                kind: TimerKind::ChargeBattery,
                delta_ms: self.cfg.timers.charge_battery_interval_ms,
            },
        ]
    }

    /// Process one delivered event to completion and return the commands to
    /// execute. Runs non-preemptively; the scheduler delivers the next event
    /// only after this returns.
    pub fn handle(
        &mut self,
        event: NodeEvent,
        now: SimTimeMs,
    ) -> Result<Vec<Command>, ControllerError> {
        match event {
            NodeEvent::Timer(TimerKind::AskAction) => Ok(self.on_ask_action(now)),
            NodeEvent::Timer(TimerKind::ChargeBattery) => Ok(self.on_charge_battery(now)),
            NodeEvent::AgentResponse(resp) => self.on_agent_response(resp, now),
            NodeEvent::QueueData(resp) => self.on_queue_data(resp, now),
            NodeEvent::QueueStateChanged { queue, update } => {
                self.tracker.apply_update(queue, &update);
                Ok(Vec::new())
            }
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn last_reward(&self) -> f64 {
        self.last_reward
    }

    pub fn cycle_index(&self) -> u64 {
        self.cycle_index
    }

    pub fn battery_percentage(&self) -> Percentage {
        self.ledger.battery_charge_percentage()
    }

    pub fn tracker(&self) -> &QueueStateTracker {
        &self.tracker
    }

    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    // ---------------------------------------------------------------------
    // Transitions
    // ---------------------------------------------------------------------

    fn on_ask_action(&mut self, _now: SimTimeMs) -> Vec<Command> {
        if self.phase != CyclePhase::Idle {
            // The timer is only ever rearmed at cycle end, so a fire while a
            // cycle is in flight means the host scheduler misbehaved. Not
            // fatal: drop it and let the in-flight cycle rearm.
            self.warn_unexpected("ask-action timer fire");
            return Vec::new();
        }

        let snapshot = self.sample_state();
        self.pending_observation = Some(snapshot.clone());
        self.phase = CyclePhase::AwaitingAgent;

        vec![Command::SendActionRequest(ActionRequest {
            state: snapshot,
            reward: self.last_reward,
        })]
    }

    /// Orthogonal to the ask-action cycle: harvest from the charger, feed
    /// the battery, sample the charge rate, rearm.
    fn on_charge_battery(&mut self, now: SimTimeMs) -> Vec<Command> {
        let capacity = self.charger.capacity();
        let harvested = self.charger.discharge(capacity);
        self.ledger.recharge_battery(harvested);

        self.last_charge_rate_pct = if capacity > 0.0 {
            (harvested * 100.0 / capacity).clamp(0.0, 100.0)
        } else {
            0.0
        };

        self.sink.log_charge(&ChargeRecord {
            timestamp_ms: now,
            harvested_mwh: harvested,
            charge_rate_percentage: self.last_charge_rate_pct,
            battery_percentage: self.ledger.battery_charge_percentage(),
        });

        vec![Command::ArmTimer {
            kind: TimerKind::ChargeBattery,
            delta_ms: self.cfg.timers.charge_battery_interval_ms,
        }]
    }

    fn on_agent_response(
        &mut self,
        resp: ActionResponse,
        now: SimTimeMs,
    ) -> Result<Vec<Command>, ControllerError> {
        if self.phase != CyclePhase::AwaitingAgent {
            self.warn_unexpected("action response");
            return Ok(Vec::new());
        }

        if !resp.send_message {
            // Idle: nothing executed, nothing consumed; reward immediately.
            self.ledger.record_idle();
            let queue = resp.queue.min(self.tracker.num_queues().saturating_sub(1));
            let reward = self.compute_cycle_reward(queue)?;
            return Ok(self.finish_cycle(
                resp,
                CycleOutcome::Idle,
                ConsumptionBreakdown::default(),
                reward,
                now,
            ));
        }

        if resp.queue >= self.tracker.num_queues() {
            // A send aimed at a queue that does not exist cannot be
            // executed; same penalty path as an empty fetch.
            self.warn_unexpected("send decision for unknown queue");
            self.ledger.record_idle();
            let reward = self.cfg.reward.illegal_action_penalty;
            return Ok(self.finish_cycle(
                resp,
                CycleOutcome::IllegalAction,
                ConsumptionBreakdown::default(),
                reward,
                now,
            ));
        }

        let queue = resp.queue;
        let request = QueueDataRequest {
            data_n: resp.msg_to_send,
        };
        self.pending_action = Some(resp);
        self.phase = CyclePhase::AwaitingQueueData { queue };

        Ok(vec![Command::SendQueueDataRequest { queue, request }])
    }

    fn on_queue_data(
        &mut self,
        resp: QueueDataResponse,
        now: SimTimeMs,
    ) -> Result<Vec<Command>, ControllerError> {
        let CyclePhase::AwaitingQueueData { queue } = self.phase else {
            self.warn_unexpected("queue data response");
            return Ok(Vec::new());
        };
        if resp.queue != queue {
            self.warn_unexpected("queue data response for a different queue");
            return Ok(Vec::new());
        }

        self.tracker.apply_update(queue, &resp.state_update);

        let Some(action) = self.pending_action.take() else {
            // Phase said a fetch was pending but no action was stored; a
            // controller bug we recover from by restarting the cycle clock.
            self.warn_unexpected("queue data response with no pending action");
            self.phase = CyclePhase::Idle;
            return Ok(vec![Command::ArmTimer {
                kind: TimerKind::AskAction,
                delta_ms: self.cfg.timers.ask_action_interval_ms,
            }]);
        };

        if resp.data.is_empty() {
            // Agent decided to send but there was nothing to send: fixed
            // penalty, no term evaluation, no energy drawn.
            self.ledger.record_idle();
            let reward = self.cfg.reward.illegal_action_penalty;
            return Ok(self.finish_cycle(
                action,
                CycleOutcome::IllegalAction,
                ConsumptionBreakdown::default(),
                reward,
                now,
            ));
        }

        let packets = resp.data.len();
        let bits: u64 = resp.data.iter().map(|p| p.size_bits).sum();
        let energy = self.tx_model.tx_energy_mwh(bits, self.cfg.link.rate_bps);
        let consumed = self.ledger.consume(energy, action.select_power_source);
        let reward = self.compute_cycle_reward(queue)?;

        Ok(self.finish_cycle(
            action,
            CycleOutcome::Sent { packets, bits },
            consumed,
            reward,
            now,
        ))
    }

    // ---------------------------------------------------------------------
    // Reward assembly
    // ---------------------------------------------------------------------

    /// Bind and evaluate the standard term set for the cycle that just
    /// finished executing. Sampling the tracker resets its drop/inbound
    /// counters; the ledger's last-consumed amounts were set by the action
    /// execution (or zeroed for idle).
    fn compute_cycle_reward(&mut self, queue: usize) -> Result<f64, RewardError> {
        // One energy term per source, each normalized by the bound the
        // *same* signal yields at that source's max-consumed high-water.
        for kind in [PowerSourceKind::Battery, PowerSourceKind::Wired] {
            let consumed = self.ledger.last_consumed(kind);
            let cost = self.ledger.cost_per_mwh(kind);
            let bound = self.engine.normalization_bound(
                TERM_ENERGY_COST,
                &symbols(&[
                    (SYM_ENERGY_MWH, self.ledger.max_consumed(kind)),
                    (SYM_COST_PER_MWH, cost),
                ]),
            )?;
            self.engine.include_term(
                TERM_ENERGY_COST,
                symbols(&[(SYM_ENERGY_MWH, consumed), (SYM_COST_PER_MWH, cost)]),
                Some(Normalizer::min_max(0.0, bound)),
            )?;
        }

        let sample = self.tracker.take_sample(queue);

        let occupancy_bound = self
            .engine
            .normalization_bound(TERM_QUEUE_OCCUPANCY, &symbols(&[(SYM_OCCUPANCY_PCT, 100.0)]))?;
        self.engine.include_term(
            TERM_QUEUE_OCCUPANCY,
            symbols(&[(SYM_OCCUPANCY_PCT, sample.occupancy_percentage)]),
            Some(Normalizer::min_max(0.0, occupancy_bound)),
        )?;

        let drop_bound = self.engine.normalization_bound(
            TERM_PACKET_DROP,
            &symbols(&[(SYM_DROPPED, sample.max_dropped.max(1) as f64)]),
        )?;
        self.engine.include_term(
            TERM_PACKET_DROP,
            symbols(&[(SYM_DROPPED, sample.dropped as f64)]),
            Some(Normalizer::min_max(0.0, drop_bound)),
        )?;

        self.engine.compute_total()
    }

    /// Terminal step of every ask-action cycle: record telemetry, store the
    /// reward for the next request, apply the high-water reset policy and
    /// rearm the ask timer.
    fn finish_cycle(
        &mut self,
        action: ActionResponse,
        outcome: CycleOutcome,
        consumed: ConsumptionBreakdown,
        reward: f64,
        now: SimTimeMs,
    ) -> Vec<Command> {
        self.cycle_index += 1;
        self.ledger
            .apply_reset_policy(self.cfg.reward.max_consumed_reset, self.cycle_index);
        self.last_reward = reward;

        let observation = self.pending_observation.take().unwrap_or_else(|| self.sample_state());
        self.sink.log_cycle(&CycleRecord {
            cycle_index: self.cycle_index,
            timestamp_ms: now,
            energy_percentage: observation.energy_percentage,
            charge_rate_percentage: observation.charge_rate_percentage,
            queue_pop_percentage: observation.queue_pop_percentage,
            action,
            outcome,
            consumed,
            reward,
        });

        self.phase = CyclePhase::Idle;
        vec![Command::ArmTimer {
            kind: TimerKind::AskAction,
            delta_ms: self.cfg.timers.ask_action_interval_ms,
        }]
    }

    fn sample_state(&self) -> NodeStateSnapshot {
        NodeStateSnapshot {
            energy_percentage: self.ledger.battery_charge_percentage(),
            charge_rate_percentage: self.last_charge_rate_pct,
            queue_pop_percentage: self.tracker.occupancy_snapshot(),
        }
    }

    fn warn_unexpected(&self, what: &str) {
        eprintln!(
            "[controller] WARN: unexpected {} in phase {:?}; dropped",
            what, self.phase
        );
    }
}
