// src/config.rs
//
// Central configuration for the Galvena node engine. Single source of truth
// for every cost / weight / capacity / timeout constant; nothing in the
// core modules is hardcoded.

use crate::energy::MaxConsumedReset;
use crate::power::ChargeModel;
use crate::types::{BitsPerSecond, MilliWatt, MilliWattHour, SimTimeMs};

#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Power sources and harvesting.
    pub power: PowerConfig,
    /// Per-priority queue capacities.
    pub queues: QueueConfig,
    /// Network interface / transmit energy.
    pub link: LinkConfig,
    /// Reward shaping weights and bands.
    pub reward: RewardConfig,
    /// Controller timer periods.
    pub timers: TimerConfig,
    /// Simulation harness (traffic, round-trip latencies).
    pub sim: SimConfig,
}

#[derive(Debug, Clone)]
pub struct PowerConfig {
    /// Battery capacity in mWh. The battery starts full.
    pub battery_capacity_mwh: MilliWattHour,
    /// Billing cost of one battery mWh.
    pub battery_cost_per_mwh: f64,
    /// Billing cost of one wired mWh (typically the expensive fallback).
    pub wired_cost_per_mwh: f64,
    /// Maximum energy the charger can hand over per recharge step.
    pub charger_capacity_mwh: MilliWattHour,
    /// Distribution of the charger's output fraction per step.
    pub charge_model: ChargeModel,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            battery_capacity_mwh: 1000.0,
            battery_cost_per_mwh: 1.0,
            wired_cost_per_mwh: 4.0,
            charger_capacity_mwh: 25.0,
            charge_model: ChargeModel::Uniform { min: 0.0, max: 1.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// One capacity per priority class; index = priority.
    pub capacities: Vec<usize>,
}

impl QueueConfig {
    pub fn num_queues(&self) -> usize {
        self.capacities.len()
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacities: vec![16, 16, 16],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Link rate in bits per second.
    pub rate_bps: BitsPerSecond,
    /// Transmit power draw in mW.
    pub tx_mw: MilliWatt,
    /// Largest expected payload in bits. Seeds the energy normalization
    /// bound and caps generated traffic.
    pub max_packet_bits: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            rate_bps: 1_000_000.0,
            tx_mw: 100.0,
            max_packet_bits: 1600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Weight of the energy-cost penalty term.
    pub energy_weight: f64,
    /// Weight of the queue-occupancy penalty term.
    pub occupancy_weight: f64,
    /// Weight of the packet-drop penalty term.
    pub drop_weight: f64,
    /// Fixed sentinel reward for an illegal action (send with nothing to
    /// send). Bypasses the term engine.
    pub illegal_action_penalty: f64,
    /// Reset policy for the max-consumed energy normalization bound.
    pub max_consumed_reset: MaxConsumedReset,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            energy_weight: 1.0,
            occupancy_weight: 1.0,
            drop_weight: 1.0,
            illegal_action_penalty: -1000.0,
            max_consumed_reset: MaxConsumedReset::Never,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// Period of the ask-action cycle.
    pub ask_action_interval_ms: SimTimeMs,
    /// Period of the charger -> battery recharge step.
    pub charge_battery_interval_ms: SimTimeMs,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            ask_action_interval_ms: 1000,
            charge_battery_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Mean of the exponential packet interarrival time.
    pub mean_arrival_ms: f64,
    /// Agent round-trip latency applied to action requests.
    pub agent_rtt_ms: SimTimeMs,
    /// Queue round-trip latency applied to data requests.
    pub queue_rtt_ms: SimTimeMs,
    /// Messages the baseline agent drains per send decision.
    pub default_burst: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mean_arrival_ms: 400.0,
            agent_rtt_ms: 0,
            queue_rtt_ms: 0,
            default_burst: 4,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "galvena-0.4",
            power: PowerConfig::default(),
            queues: QueueConfig::default(),
            link: LinkConfig::default(),
            reward: RewardConfig::default(),
            timers: TimerConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Config {
    /// Default config with environment overrides applied.
    ///
    /// Recognized variables:
    /// - `GALVENA_ASK_INTERVAL_MS`
    /// - `GALVENA_CHARGE_INTERVAL_MS`
    /// - `GALVENA_BATTERY_CAPACITY_MWH`
    ///
    /// Unparseable values are warned about and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = read_env_f64("GALVENA_BATTERY_CAPACITY_MWH") {
            cfg.power.battery_capacity_mwh = v;
        }
        if let Some(v) = read_env_i64("GALVENA_ASK_INTERVAL_MS") {
            cfg.timers.ask_action_interval_ms = v;
        }
        if let Some(v) = read_env_i64("GALVENA_CHARGE_INTERVAL_MS") {
            cfg.timers.charge_battery_interval_ms = v;
        }

        cfg
    }
}

fn read_env_f64(name: &str) -> Option<f64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("[config] WARN: invalid {name}={raw:?}; ignoring");
            None
        }
    }
}

fn read_env_i64(name: &str) -> Option<i64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("[config] WARN: invalid {name}={raw:?}; ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = Config::default();
        assert_eq!(cfg.queues.num_queues(), 3);
        assert!(cfg.power.battery_capacity_mwh > 0.0);
        assert!(cfg.timers.ask_action_interval_ms > 0);
        assert!(cfg.reward.illegal_action_penalty < 0.0);
    }
}
