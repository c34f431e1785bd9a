// src/sim.rs
//
// Deterministic discrete-event harness around one node: plays the role of
// the external scheduler (monotonic simulated time, in-order delivery,
// timer slots with idempotent rearm) and wires the controller to its
// queues and to an in-process agent.
//
// The queue side lives here, on the far side of the message boundary from
// the controller: arrivals are inserted (or dropped) locally and reported
// to the controller as QueueStateUpdate deltas, exactly like the fetch
// responses do. Traffic is a seeded exponential arrival process with
// uniformly distributed payload sizes.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::config::Config;
use crate::controller::{Command, Controller, ControllerError, NodeEvent};
use crate::messages::{ActionResponse, DataPacket, QueueDataResponse, QueueStateUpdate};
use crate::queue::BoundedDataQueue;
use crate::telemetry::CycleSink;
use crate::types::{Percentage, SimTimeMs, TimerKind};

/// Timer slots with generation counters. Rearming bumps the generation so
/// a previously scheduled fire becomes stale and is skipped on delivery:
/// the "reschedule, don't recreate" semantics the controller relies on.
#[derive(Debug, Clone, Copy, Default)]
struct TimerSlot {
    gen: u64,
    armed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimerSlots {
    ask: TimerSlot,
    charge: TimerSlot,
}

impl TimerSlots {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::AskAction => &mut self.ask,
            TimerKind::ChargeBattery => &mut self.charge,
        }
    }

    fn slot(&self, kind: TimerKind) -> TimerSlot {
        match kind {
            TimerKind::AskAction => self.ask,
            TimerKind::ChargeBattery => self.charge,
        }
    }

    /// Arm (or reschedule) the slot; returns the generation the scheduled
    /// fire must carry to still be current at delivery.
    pub(crate) fn arm(&mut self, kind: TimerKind) -> u64 {
        let slot = self.slot_mut(kind);
        slot.gen += 1;
        slot.armed = true;
        slot.gen
    }

    /// Cancel an outstanding fire without side effects. Cancelling an
    /// unarmed slot is a no-op.
    pub(crate) fn cancel(&mut self, kind: TimerKind) {
        self.slot_mut(kind).armed = false;
    }

    /// Whether a delivered fire with generation `gen` is still current.
    pub(crate) fn is_current(&self, kind: TimerKind, gen: u64) -> bool {
        let slot = self.slot(kind);
        slot.armed && slot.gen == gen
    }
}

/// Events on the sim calendar.
#[derive(Debug, Clone)]
enum SimEvent {
    TimerFire { kind: TimerKind, gen: u64 },
    AgentReply(ActionResponse),
    QueueReply(QueueDataResponse),
    /// Next packet arrival from the traffic generator.
    Arrival,
}

/// End-of-run roll-up, printed by the CLI and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSummary {
    pub duration_ms: SimTimeMs,
    /// Completed ask-action cycles.
    pub cycles: u64,
    /// ActionRequests issued (at most one more than `cycles`).
    pub requests: u64,
    pub sends: u64,
    pub idles: u64,
    pub illegal_actions: u64,
    pub packets_arrived: u64,
    pub packets_dropped: u64,
    pub packets_sent: u64,
    pub final_battery_percentage: Percentage,
    pub mean_reward: f64,
    pub min_reward: f64,
    pub max_reward: f64,
    pub agent_version: String,
}

/// One node wired to its queues, its agent and an event calendar.
pub struct SimNode<'a, A: Agent, S: CycleSink> {
    cfg: &'a Config,
    controller: Controller<'a, S>,
    queues: Vec<BoundedDataQueue>,
    agent: A,

    calendar: BTreeMap<(SimTimeMs, u64), SimEvent>,
    seq: u64,
    timers: TimerSlots,
    now: SimTimeMs,
    rng: ChaCha8Rng,
    next_msg_id: u64,

    // Queue-side delta counters, reported with the next state update.
    dropped_delta: Vec<u64>,
    inbound_delta: Vec<u64>,

    // Summary accumulators.
    requests: u64,
    sends: u64,
    idles: u64,
    illegal_actions: u64,
    packets_arrived: u64,
    packets_dropped: u64,
    packets_sent: u64,
    reward_sum: f64,
    reward_min: f64,
    reward_max: f64,
    observed_cycles: u64,
}

impl<'a, A: Agent, S: CycleSink> SimNode<'a, A, S> {
    pub fn new(cfg: &'a Config, agent: A, sink: S, seed: u64) -> Self {
        let num_queues = cfg.queues.num_queues();
        let queues = cfg
            .queues
            .capacities
            .iter()
            .map(|&c| BoundedDataQueue::new(c))
            .collect();

        Self {
            cfg,
            controller: Controller::new(cfg, seed, sink),
            queues,
            agent,
            calendar: BTreeMap::new(),
            seq: 0,
            timers: TimerSlots::default(),
            now: 0,
            // Decorrelate the traffic stream from the charger's draws.
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(0x9e37_79b9)),
            next_msg_id: 0,
            dropped_delta: vec![0; num_queues],
            inbound_delta: vec![0; num_queues],
            requests: 0,
            sends: 0,
            idles: 0,
            illegal_actions: 0,
            packets_arrived: 0,
            packets_dropped: 0,
            packets_sent: 0,
            reward_sum: 0.0,
            reward_min: f64::INFINITY,
            reward_max: f64::NEG_INFINITY,
            observed_cycles: 0,
        }
    }

    pub fn controller(&self) -> &Controller<'a, S> {
        &self.controller
    }

    /// Run the node until `until_ms` of simulated time and roll up the
    /// summary. Fatal controller errors (reward construction bugs) abort
    /// the run.
    pub fn run(&mut self, until_ms: SimTimeMs) -> Result<SimSummary, ControllerError> {
        let commands = self.controller.start();
        self.execute(commands);
        let first_arrival = self.now + self.exp_interarrival_ms();
        self.schedule(first_arrival, SimEvent::Arrival);

        loop {
            let Some((&(time, _), _)) = self.calendar.first_key_value() else {
                break;
            };
            if time > until_ms {
                break;
            }
            let Some(((time, _), event)) = self.calendar.pop_first() else {
                break;
            };
            self.now = time;
            self.dispatch(event)?;
            self.roll_up_cycle();
        }

        Ok(SimSummary {
            duration_ms: until_ms,
            cycles: self.controller.cycle_index(),
            requests: self.requests,
            sends: self.sends,
            idles: self.idles,
            illegal_actions: self.illegal_actions,
            packets_arrived: self.packets_arrived,
            packets_dropped: self.packets_dropped,
            packets_sent: self.packets_sent,
            final_battery_percentage: self.controller.battery_percentage(),
            mean_reward: if self.observed_cycles > 0 {
                self.reward_sum / self.observed_cycles as f64
            } else {
                0.0
            },
            min_reward: if self.observed_cycles > 0 {
                self.reward_min
            } else {
                0.0
            },
            max_reward: if self.observed_cycles > 0 {
                self.reward_max
            } else {
                0.0
            },
            agent_version: self.agent.version().to_string(),
        })
    }

    // ---------------------------------------------------------------------
    // Event dispatch
    // ---------------------------------------------------------------------

    fn dispatch(&mut self, event: SimEvent) -> Result<(), ControllerError> {
        match event {
            SimEvent::TimerFire { kind, gen } => {
                if !self.timers.is_current(kind, gen) {
                    // Stale fire from before a reschedule; skip silently.
                    return Ok(());
                }
                self.timers.cancel(kind);
                let commands = self.controller.handle(NodeEvent::Timer(kind), self.now)?;
                self.execute(commands);
            }
            SimEvent::AgentReply(resp) => {
                if !resp.send_message {
                    self.idles += 1;
                }
                let commands = self
                    .controller
                    .handle(NodeEvent::AgentResponse(resp), self.now)?;
                self.execute(commands);
            }
            SimEvent::QueueReply(resp) => {
                if resp.data.is_empty() {
                    self.illegal_actions += 1;
                } else {
                    self.sends += 1;
                    self.packets_sent += resp.data.len() as u64;
                }
                let commands = self.controller.handle(NodeEvent::QueueData(resp), self.now)?;
                self.execute(commands);
            }
            SimEvent::Arrival => {
                self.handle_arrival()?;
                let next = self.now + self.exp_interarrival_ms();
                self.schedule(next, SimEvent::Arrival);
            }
        }
        Ok(())
    }

    /// Insert one generated packet into a random queue, drop on overflow,
    /// and report the state change to the controller.
    fn handle_arrival(&mut self) -> Result<(), ControllerError> {
        let queue = self.rng.gen_range(0..self.queues.len());
        let size_bits = self.rng.gen_range(1..=self.cfg.link.max_packet_bits);
        self.next_msg_id += 1;
        let packet = DataPacket {
            msg_id: self.next_msg_id,
            size_bits,
            queued_at_ms: self.now,
        };

        self.packets_arrived += 1;
        self.inbound_delta[queue] += 1;
        if self.queues[queue].insert(packet).is_err() {
            self.packets_dropped += 1;
            self.dropped_delta[queue] += 1;
        }

        let update = self.take_state_update(queue);
        let commands = self
            .controller
            .handle(NodeEvent::QueueStateChanged { queue, update }, self.now)?;
        self.execute(commands);
        Ok(())
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::SendActionRequest(request) => {
                    self.requests += 1;
                    let response = self.agent.decide(&request);
                    let at = self.now + self.cfg.sim.agent_rtt_ms;
                    self.schedule(at, SimEvent::AgentReply(response));
                }
                Command::SendQueueDataRequest { queue, request } => {
                    let data = self.queues[queue].pop_n(request.data_n);
                    let state_update = self.take_state_update(queue);
                    let at = self.now + self.cfg.sim.queue_rtt_ms;
                    self.schedule(
                        at,
                        SimEvent::QueueReply(QueueDataResponse {
                            queue,
                            data,
                            state_update,
                        }),
                    );
                }
                Command::ArmTimer { kind, delta_ms } => {
                    let gen = self.timers.arm(kind);
                    self.schedule(self.now + delta_ms.max(0), SimEvent::TimerFire { kind, gen });
                }
            }
        }
    }

    /// Sample the queue's current state and drain the delta counters.
    fn take_state_update(&mut self, queue: usize) -> QueueStateUpdate {
        QueueStateUpdate {
            buffer_pop_percentage: self.queues[queue].occupancy_percentage(),
            num_of_dropped: std::mem::take(&mut self.dropped_delta[queue]),
            num_of_inbound: std::mem::take(&mut self.inbound_delta[queue]),
        }
    }

    fn schedule(&mut self, at: SimTimeMs, event: SimEvent) {
        self.seq += 1;
        self.calendar.insert((at.max(self.now), self.seq), event);
    }

    /// Accumulate reward stats whenever a cycle completed this dispatch.
    fn roll_up_cycle(&mut self) {
        let completed = self.controller.cycle_index();
        if completed > self.observed_cycles {
            self.observed_cycles = completed;
            let r = self.controller.last_reward();
            self.reward_sum += r;
            self.reward_min = self.reward_min.min(r);
            self.reward_max = self.reward_max.max(r);
        }
    }

    /// Exponential interarrival draw, floored at 1 ms.
    fn exp_interarrival_ms(&mut self) -> SimTimeMs {
        let u: f64 = self.rng.gen::<f64>();
        let u = (1.0 - u).max(1e-12);
        let draw = -self.cfg.sim.mean_arrival_ms * u.ln();
        (draw.round() as SimTimeMs).max(1)
    }
}
