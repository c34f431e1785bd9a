// src/power.rs
//
// Power source abstraction for the node:
//
//  - Battery: finite rechargeable reservoir, charge clamped to [0, capacity],
//  - WiredSupply: mains power, satisfies every discharge in full,
//  - StochasticCharger: harvester whose output is a random fraction of the
//    requested amount (models variable input such as solar).
//
// A closed enum with exhaustive matching instead of a trait object: the set
// of source kinds is fixed and call sites want to reason about all of them.
//
// An unplugged source is physically disconnected: discharge and recharge are
// zero-effect no-ops, and supplies that only exist while connected (wired,
// charger) also report zero charge. A battery's stored charge stays readable
// while unplugged.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::types::{BitsPerSecond, MilliWatt, MilliWattHour};

/// Distribution of the charger's output fraction.
///
/// `sample` draws are folded to their absolute value by the charger, so a
/// model may produce negative draws without breaking the energy accounting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChargeModel {
    /// Fixed fraction of the requested amount.
    Constant(f64),
    /// Uniform fraction in [min, max).
    Uniform { min: f64, max: f64 },
}

impl ChargeModel {
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        match *self {
            ChargeModel::Constant(v) => v,
            ChargeModel::Uniform { min, max } => {
                if max > min {
                    rng.gen_range(min..max)
                } else {
                    min
                }
            }
        }
    }
}

/// A power source provides energy to node actions that need it.
/// All energy quantities are milliwatt-hours.
#[derive(Debug, Clone)]
pub enum PowerSource {
    Battery {
        charge: MilliWattHour,
        capacity: MilliWattHour,
        cost_per_mwh: f64,
        plugged: bool,
    },
    WiredSupply {
        cost_per_mwh: f64,
        plugged: bool,
    },
    StochasticCharger {
        capacity: MilliWattHour,
        model: ChargeModel,
        rng: ChaCha8Rng,
        cost_per_mwh: f64,
        plugged: bool,
    },
}

impl PowerSource {
    /// New battery, constructed full and unplugged.
    pub fn battery(capacity: MilliWattHour, cost_per_mwh: f64) -> Self {
        PowerSource::Battery {
            charge: capacity,
            capacity,
            cost_per_mwh,
            plugged: false,
        }
    }

    /// New wired supply, unplugged.
    pub fn wired(cost_per_mwh: f64) -> Self {
        PowerSource::WiredSupply {
            cost_per_mwh,
            plugged: false,
        }
    }

    /// New stochastic charger with a seeded draw stream, unplugged.
    ///
    /// Harvested energy carries no billing cost, so `cost_per_mwh` is zero.
    pub fn charger(capacity: MilliWattHour, model: ChargeModel, seed: u64) -> Self {
        PowerSource::StochasticCharger {
            capacity,
            model,
            rng: ChaCha8Rng::seed_from_u64(seed),
            cost_per_mwh: 0.0,
            plugged: false,
        }
    }

    /// Charge left in the source.
    ///
    /// Wired supplies report a sentinel maximum while plugged; the charger
    /// reports its per-draw capacity. Both report zero while unplugged.
    pub fn charge(&self) -> MilliWattHour {
        match self {
            PowerSource::Battery { charge, .. } => *charge,
            PowerSource::WiredSupply { plugged, .. } => {
                if *plugged {
                    f64::MAX
                } else {
                    0.0
                }
            }
            PowerSource::StochasticCharger {
                capacity, plugged, ..
            } => {
                if *plugged {
                    *capacity
                } else {
                    0.0
                }
            }
        }
    }

    /// Nominal capacity of the source. Wired supplies are unbounded.
    pub fn capacity(&self) -> MilliWattHour {
        match self {
            PowerSource::Battery { capacity, .. } => *capacity,
            PowerSource::WiredSupply { .. } => f64::MAX,
            PowerSource::StochasticCharger { capacity, .. } => *capacity,
        }
    }

    /// Discharge the source by `requested` and return the amount actually
    /// removed. Negative requests are folded to their absolute value.
    ///
    /// - Battery: removes `min(requested, charge)`, clamping charge at 0.
    /// - WiredSupply: always satisfies the full request.
    /// - StochasticCharger: yields `requested * |draw()|`.
    /// - Any unplugged source: no-op returning 0.
    pub fn discharge(&mut self, requested: MilliWattHour) -> MilliWattHour {
        let requested = requested.abs();
        match self {
            PowerSource::Battery {
                charge, plugged, ..
            } => {
                if !*plugged {
                    return 0.0;
                }
                let removed = requested.min(*charge);
                *charge -= removed;
                removed
            }
            PowerSource::WiredSupply { plugged, .. } => {
                if !*plugged {
                    return 0.0;
                }
                requested
            }
            PowerSource::StochasticCharger {
                model,
                rng,
                plugged,
                ..
            } => {
                if !*plugged {
                    return 0.0;
                }
                requested * model.sample(rng).abs()
            }
        }
    }

    /// Add `amount` to the source's reservoir, clamping at capacity.
    /// Only batteries store energy; other sources ignore the call.
    pub fn recharge(&mut self, amount: MilliWattHour) {
        if let PowerSource::Battery {
            charge,
            capacity,
            plugged,
            ..
        } = self
        {
            if !*plugged {
                return;
            }
            *charge = (*charge + amount.abs()).min(*capacity);
        }
    }

    pub fn plug(&mut self) {
        match self {
            PowerSource::Battery { plugged, .. }
            | PowerSource::WiredSupply { plugged, .. }
            | PowerSource::StochasticCharger { plugged, .. } => *plugged = true,
        }
    }

    pub fn unplug(&mut self) {
        match self {
            PowerSource::Battery { plugged, .. }
            | PowerSource::WiredSupply { plugged, .. }
            | PowerSource::StochasticCharger { plugged, .. } => *plugged = false,
        }
    }

    pub fn is_plugged(&self) -> bool {
        match self {
            PowerSource::Battery { plugged, .. }
            | PowerSource::WiredSupply { plugged, .. }
            | PowerSource::StochasticCharger { plugged, .. } => *plugged,
        }
    }

    /// Billing cost of one milliwatt-hour drawn from this source.
    pub fn cost_per_mwh(&self) -> f64 {
        match self {
            PowerSource::Battery { cost_per_mwh, .. }
            | PowerSource::WiredSupply { cost_per_mwh, .. }
            | PowerSource::StochasticCharger { cost_per_mwh, .. } => *cost_per_mwh,
        }
    }
}

/// Transmit-energy model for the network interface.
///
/// Energy to push `bits` onto a link at `rate_bps` is the transmit power
/// held for the serialization time: `tx_mw * bits / rate_bps` milliwatt-
/// seconds, converted to milliwatt-hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TxEnergyModel {
    pub tx_mw: MilliWatt,
}

impl TxEnergyModel {
    pub fn new(tx_mw: MilliWatt) -> Self {
        Self { tx_mw }
    }

    /// Transmit energy in mWh for a payload of `bits` at `rate_bps`.
    pub fn tx_energy_mwh(&self, bits: u64, rate_bps: BitsPerSecond) -> MilliWattHour {
        if rate_bps <= 0.0 {
            return 0.0;
        }
        let tx_seconds = bits as f64 / rate_bps;
        self.tx_mw * tx_seconds / 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugged_battery(capacity: f64) -> PowerSource {
        let mut b = PowerSource::battery(capacity, 1.0);
        b.plug();
        b
    }

    #[test]
    fn battery_discharge_clamps_at_zero() {
        let mut b = plugged_battery(1000.0);

        assert_eq!(b.discharge(200.0), 200.0);
        assert_eq!(b.charge(), 800.0);

        // Only the remaining 800 can be removed.
        assert_eq!(b.discharge(900.0), 800.0);
        assert_eq!(b.charge(), 0.0);
    }

    #[test]
    fn battery_discharge_then_recharge_restores_charge() {
        let mut b = plugged_battery(500.0);
        b.discharge(120.0);
        b.recharge(120.0);
        assert_eq!(b.charge(), 500.0);
    }

    #[test]
    fn battery_recharge_clamps_at_capacity() {
        let mut b = plugged_battery(100.0);
        b.discharge(10.0);
        b.recharge(50.0);
        assert_eq!(b.charge(), 100.0);
    }

    #[test]
    fn battery_folds_negative_amounts() {
        let mut b = plugged_battery(100.0);
        assert_eq!(b.discharge(-30.0), 30.0);
        assert_eq!(b.charge(), 70.0);
    }

    #[test]
    fn unplugged_source_is_inert() {
        let mut b = PowerSource::battery(100.0, 1.0);
        assert_eq!(b.discharge(50.0), 0.0);
        b.recharge(50.0);
        assert_eq!(b.charge(), 100.0);

        let mut w = PowerSource::wired(4.0);
        assert_eq!(w.discharge(50.0), 0.0);
        assert_eq!(w.charge(), 0.0);
    }

    #[test]
    fn wired_supply_always_satisfies() {
        let mut w = PowerSource::wired(4.0);
        w.plug();
        assert_eq!(w.discharge(123.0), 123.0);
        assert_eq!(w.discharge(1e12), 1e12);
        assert_eq!(w.charge(), f64::MAX);
        assert_eq!(w.capacity(), f64::MAX);
    }

    #[test]
    fn charger_output_is_bounded_by_request() {
        let mut c = PowerSource::charger(50.0, ChargeModel::Uniform { min: 0.0, max: 1.0 }, 7);
        c.plug();
        for _ in 0..100 {
            let drawn = c.discharge(50.0);
            assert!((0.0..=50.0).contains(&drawn));
        }
    }

    #[test]
    fn charger_constant_model_is_exact() {
        let mut c = PowerSource::charger(40.0, ChargeModel::Constant(0.5), 1);
        c.plug();
        assert_eq!(c.discharge(40.0), 20.0);
    }

    #[test]
    fn charger_seeded_draws_are_reproducible() {
        let mk = || {
            let mut c =
                PowerSource::charger(10.0, ChargeModel::Uniform { min: 0.0, max: 1.0 }, 42);
            c.plug();
            (0..10).map(|_| c.discharge(10.0)).collect::<Vec<_>>()
        };
        assert_eq!(mk(), mk());
    }

    #[test]
    fn tx_energy_scales_with_bits_and_rate() {
        let model = TxEnergyModel::new(100.0);
        // 1_000_000 bits at 1 Mbps = 1 s of tx at 100 mW = 100 mWs.
        let mwh = model.tx_energy_mwh(1_000_000, 1_000_000.0);
        assert!((mwh - 100.0 / 3600.0).abs() < 1e-12);
        assert_eq!(model.tx_energy_mwh(1000, 0.0), 0.0);
    }
}
