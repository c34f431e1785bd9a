// src/energy.rs
//
// Per-node energy accounting: allocates discharge across power sources with
// battery -> wired fallback and tracks last/max consumed amounts per source.
// The max high-water marks feed the reward engine's energy normalization
// bound; they are seeded from a configured initial estimate (derived from
// the largest expected packet) and may optionally be reset on a cycle
// cadence.

use serde::{Deserialize, Serialize};

use crate::messages::PowerSourceChoice;
use crate::power::PowerSource;
use crate::types::{MilliWattHour, Percentage, PowerSourceKind};

/// Reset policy for the max-consumed normalization bound.
///
/// The bound is a running high-water mark seeded from a possibly-stale
/// initial estimate; whether it should ever reset is a policy choice, not a
/// fixed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxConsumedReset {
    /// High-water marks persist for the node's lifetime.
    Never,
    /// Re-seed the marks from the initial estimate every `n` cycles.
    EveryCycles(u64),
}

/// Per-source split of one consumption call. Non-participating sources
/// report zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsumptionBreakdown {
    pub battery_mwh: MilliWattHour,
    pub wired_mwh: MilliWattHour,
}

impl ConsumptionBreakdown {
    pub fn total(&self) -> MilliWattHour {
        self.battery_mwh + self.wired_mwh
    }
}

#[derive(Debug, Clone, Copy)]
struct SourceAccount {
    last: MilliWattHour,
    max: MilliWattHour,
}

/// One ledger per node, owning the battery and wired supply it draws from.
#[derive(Debug, Clone)]
pub struct EnergyLedger {
    battery: PowerSource,
    wired: PowerSource,
    battery_acct: SourceAccount,
    wired_acct: SourceAccount,
    last_selected: Option<PowerSourceKind>,
    initial_max_mwh: MilliWattHour,
}

impl EnergyLedger {
    /// `initial_max_mwh` seeds the per-source max-consumed high-water marks
    /// so the first reward computation has a non-degenerate bound.
    pub fn new(
        battery: PowerSource,
        wired: PowerSource,
        initial_max_mwh: MilliWattHour,
    ) -> Self {
        let seed = SourceAccount {
            last: 0.0,
            max: initial_max_mwh,
        };
        Self {
            battery,
            wired,
            battery_acct: seed,
            wired_acct: seed,
            last_selected: None,
            initial_max_mwh,
        }
    }

    /// Draw `amount` from the preferred source.
    ///
    /// A battery preference falls back to the wired supply for whatever the
    /// battery cannot deliver, so a send action is never blocked by battery
    /// depletion, it degrades to wired power. A wired preference absorbs
    /// the full amount directly.
    pub fn consume(
        &mut self,
        amount: MilliWattHour,
        preferred: PowerSourceChoice,
    ) -> ConsumptionBreakdown {
        let breakdown = match preferred {
            PowerSourceChoice::Battery => {
                let from_battery = self.battery.discharge(amount);
                let shortfall = amount - from_battery;
                let from_wired = if shortfall > 0.0 {
                    self.wired.discharge(shortfall)
                } else {
                    0.0
                };
                ConsumptionBreakdown {
                    battery_mwh: from_battery,
                    wired_mwh: from_wired,
                }
            }
            PowerSourceChoice::Wired => ConsumptionBreakdown {
                battery_mwh: 0.0,
                wired_mwh: self.wired.discharge(amount),
            },
        };

        self.battery_acct.last = breakdown.battery_mwh;
        self.wired_acct.last = breakdown.wired_mwh;
        self.battery_acct.max = self.battery_acct.max.max(breakdown.battery_mwh);
        self.wired_acct.max = self.wired_acct.max.max(breakdown.wired_mwh);
        self.last_selected = Some(match preferred {
            PowerSourceChoice::Battery => PowerSourceKind::Battery,
            PowerSourceChoice::Wired => PowerSourceKind::Wired,
        });

        breakdown
    }

    /// Record a zero-consumption cycle (idle decision): last-consumed
    /// amounts drop to zero, high-water marks persist.
    pub fn record_idle(&mut self) {
        self.battery_acct.last = 0.0;
        self.wired_acct.last = 0.0;
    }

    pub fn last_consumed(&self, kind: PowerSourceKind) -> MilliWattHour {
        match kind {
            PowerSourceKind::Battery => self.battery_acct.last,
            PowerSourceKind::Wired => self.wired_acct.last,
            PowerSourceKind::Charger => 0.0,
        }
    }

    pub fn max_consumed(&self, kind: PowerSourceKind) -> MilliWattHour {
        match kind {
            PowerSourceKind::Battery => self.battery_acct.max,
            PowerSourceKind::Wired => self.wired_acct.max,
            PowerSourceKind::Charger => 0.0,
        }
    }

    pub fn last_selected(&self) -> Option<PowerSourceKind> {
        self.last_selected
    }

    pub fn cost_per_mwh(&self, kind: PowerSourceKind) -> f64 {
        match kind {
            PowerSourceKind::Battery => self.battery.cost_per_mwh(),
            PowerSourceKind::Wired => self.wired.cost_per_mwh(),
            PowerSourceKind::Charger => 0.0,
        }
    }

    /// Feed harvested energy into the battery.
    pub fn recharge_battery(&mut self, amount: MilliWattHour) {
        self.battery.recharge(amount);
    }

    pub fn battery_charge(&self) -> MilliWattHour {
        self.battery.charge()
    }

    pub fn battery_capacity(&self) -> MilliWattHour {
        self.battery.capacity()
    }

    pub fn battery_charge_percentage(&self) -> Percentage {
        let cap = self.battery.capacity();
        if cap <= 0.0 {
            return 0.0;
        }
        self.battery.charge() * 100.0 / cap
    }

    /// Apply the configured high-water reset policy at a cycle boundary.
    pub fn apply_reset_policy(&mut self, policy: MaxConsumedReset, cycle_index: u64) {
        if let MaxConsumedReset::EveryCycles(n) = policy {
            if n > 0 && cycle_index > 0 && cycle_index % n == 0 {
                self.battery_acct.max = self.initial_max_mwh;
                self.wired_acct.max = self.initial_max_mwh;
            }
        }
    }
}
