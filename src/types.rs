// src/types.rs
//
// Common shared types and measurement units for the Galvena node engine.

use serde::{Deserialize, Serialize};

/// Millisecond timestamp in simulated time.
pub type SimTimeMs = i64;

/// Energy quantity in milliwatt-hours.
pub type MilliWattHour = f64;

/// Instantaneous power draw in milliwatts.
pub type MilliWatt = f64;

/// Percentage in [0, 100].
pub type Percentage = f64;

/// Link rate in bits per second.
pub type BitsPerSecond = f64;

/// Identity of a power source as seen by the energy ledger and the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerSourceKind {
    /// Finite rechargeable reservoir.
    Battery,
    /// Mains supply; always satisfies a discharge in full.
    Wired,
    /// Stochastic harvester feeding the battery (e.g. solar).
    Charger,
}

/// Timer slots owned by the node controller.
///
/// The same slot is rearmed for the node's whole lifetime; a slot is never
/// destroyed while armed. Rearming an armed slot resets its fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Drives the ask-action cycle.
    AskAction,
    /// Drives the charger -> battery recharge step.
    ChargeBattery,
}
