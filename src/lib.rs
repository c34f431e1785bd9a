//! Galvena core library.
//!
//! This crate models an energy-constrained network node that periodically
//! asks an external decision agent for an action (transmit buffered data
//! or stay idle), executes the decision, and computes a shaped reward
//! reflecting energy cost, queue occupancy and packet loss. The binary
//! (`src/main.rs`) is a thin simulation / research harness around these
//! components.
//!
//! # Architecture
//!
//! The codebase keeps decision logic and I/O apart:
//!
//! - **Controller** (`controller`): the action-loop state machine. Pure at
//!   its boundary (events in, commands out), with single-flight ask-action
//!   cycles and an orthogonal battery-charging timer.
//!
//! - **Power** (`power`, `energy`): closed set of power-source variants
//!   (battery / wired / stochastic charger) and the per-node energy ledger
//!   with battery-to-wired fallback discharge.
//!
//! - **Queues** (`queue`, `tracker`): bounded FIFO buffers per priority
//!   class, with drop/inbound accounting aggregated on the controller side.
//!
//! - **Reward** (`reward`): weighted, independently min-max-normalized
//!   penalty terms bound to runtime symbols per computation.
//!
//! - **Boundary** (`messages`, `agent`): serializable request/response
//!   schemas and the agent seam with baseline implementations.
//!
//! - **Harness** (`sim`, `telemetry`): deterministic event calendar playing
//!   the external scheduler's role, plus JSONL cycle telemetry.

pub mod agent;
pub mod config;
pub mod controller;
pub mod energy;
pub mod messages;
pub mod power;
pub mod queue;
pub mod reward;
pub mod sim;
pub mod telemetry;
pub mod tracker;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use agent::{Agent, IdleAgent, ThresholdAgent};
pub use config::Config;
pub use controller::{Command, Controller, ControllerError, CyclePhase, NodeEvent};
pub use energy::{ConsumptionBreakdown, EnergyLedger, MaxConsumedReset};
pub use messages::{
    ActionRequest, ActionResponse, DataPacket, NodeStateSnapshot, PowerSourceChoice,
    QueueDataRequest, QueueDataResponse, QueueStateUpdate,
};
pub use power::{ChargeModel, PowerSource, TxEnergyModel};
pub use queue::{BoundedDataQueue, QueueError};
pub use reward::{Normalizer, RewardEngine, RewardError, Signal, SymbolTable, TermTemplate};
pub use sim::{SimNode, SimSummary};
pub use telemetry::{ChargeRecord, CycleOutcome, CycleRecord, CycleSink, JsonlSink, NoopSink};
pub use tracker::{QueueSample, QueueState, QueueStateTracker};
pub use types::{MilliWattHour, Percentage, PowerSourceKind, SimTimeMs, TimerKind};
