// src/telemetry.rs
//
// Telemetry sinks for the node engine.
// - CycleSink: trait consumed by the controller
// - NoopSink:  discards all records
// - JsonlSink: one JSON object per record, env-var activated
//
// Two record shapes: one per completed ask-action cycle, one per charge
// step. Both carry enough fields to reconstruct the reward offline.

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::energy::ConsumptionBreakdown;
use crate::messages::ActionResponse;
use crate::types::{MilliWattHour, Percentage, SimTimeMs};

/// How one ask-action cycle terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleOutcome {
    /// Agent chose to idle.
    Idle,
    /// Data was fetched and transmitted.
    Sent { packets: usize, bits: u64 },
    /// Send decision with nothing to send; sentinel penalty applied.
    IllegalAction,
}

/// Per-cycle record written when the ask-action cycle reaches its terminal
/// reward computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_index: u64,
    pub timestamp_ms: SimTimeMs,
    /// Battery charge percentage at the observation that started the cycle.
    pub energy_percentage: Percentage,
    /// Charge-rate percentage shipped with the observation.
    pub charge_rate_percentage: Percentage,
    /// Queue occupancy snapshot shipped with the observation.
    pub queue_pop_percentage: Vec<Percentage>,
    /// The agent's decision for this cycle.
    pub action: ActionResponse,
    pub outcome: CycleOutcome,
    /// Energy drawn per source while executing the action.
    pub consumed: ConsumptionBreakdown,
    /// Shaped reward computed at the end of the cycle.
    pub reward: f64,
}

/// Record of one charger -> battery recharge step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargeRecord {
    pub timestamp_ms: SimTimeMs,
    /// Energy the charger actually delivered this step.
    pub harvested_mwh: MilliWattHour,
    /// Delivered energy as a percentage of the charger capacity.
    pub charge_rate_percentage: Percentage,
    /// Battery charge percentage after the recharge.
    pub battery_percentage: Percentage,
}

/// Abstract sink for controller telemetry.
pub trait CycleSink {
    fn log_cycle(&mut self, record: &CycleRecord);
    fn log_charge(&mut self, record: &ChargeRecord);
}

/// Sink that discards all records.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CycleSink for NoopSink {
    fn log_cycle(&mut self, _record: &CycleRecord) {
        // intentionally no-op
    }

    fn log_charge(&mut self, _record: &ChargeRecord) {
        // intentionally no-op
    }
}

/// JSONL file sink.
///
/// Controlled by environment variables:
/// - GALVENA_TELEMETRY_MODE: "off" (default) or "jsonl"
/// - GALVENA_TELEMETRY_PATH: path to the JSONL file
pub struct JsonlSink {
    enabled: bool,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    /// Sink writing to an explicit path; the file is opened eagerly so a
    /// bad path fails at startup, not mid-run.
    pub fn create(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            enabled: true,
            path: Some(path),
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Sink configured from the environment (disabled unless the mode
    /// variable opts in).
    pub fn from_env() -> Self {
        let enabled = env::var("GALVENA_TELEMETRY_MODE")
            .map(|s| s.to_lowercase() == "jsonl")
            .unwrap_or(false);
        let path = env::var("GALVENA_TELEMETRY_PATH").ok().map(PathBuf::from);
        Self {
            enabled,
            path,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn ensure_writer(&mut self) -> Option<&mut BufWriter<File>> {
        if !self.enabled {
            return None;
        }
        if self.writer.is_none() {
            let path = self.path.as_ref()?;
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer.as_mut()
    }

    fn write_line<T: Serialize>(&mut self, record: &T) {
        let Some(writer) = self.ensure_writer() else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(s) => s,
            Err(_) => return,
        };
        // A failing sink must not take the engine down; disable instead.
        if writeln!(writer, "{}", line).is_err() {
            self.enabled = false;
            self.writer = None;
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = &mut self.writer {
            let _ = writer.flush();
        }
    }
}

impl CycleSink for JsonlSink {
    fn log_cycle(&mut self, record: &CycleRecord) {
        self.write_line(record);
    }

    fn log_charge(&mut self, record: &ChargeRecord) {
        self.write_line(record);
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_record_round_trips_through_json() {
        let record = CycleRecord {
            cycle_index: 3,
            timestamp_ms: 4000,
            energy_percentage: 82.0,
            charge_rate_percentage: 40.0,
            queue_pop_percentage: vec![25.0, 0.0],
            action: ActionResponse::idle(),
            outcome: CycleOutcome::Idle,
            consumed: ConsumptionBreakdown::default(),
            reward: -0.25,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: CycleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn env_disabled_sink_writes_nothing() {
        // Without the mode variable the sink must stay inert.
        std::env::remove_var("GALVENA_TELEMETRY_MODE");
        let sink = JsonlSink::from_env();
        assert!(!sink.is_enabled());
    }
}
