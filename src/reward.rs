// src/reward.rs
//
// Shaped-reward engine: a configurable set of weighted, independently
// normalized penalty terms evaluated from bound runtime symbols.
//
// Terms measure heterogeneous physical quantities (energy cost, queue
// occupancy, packet loss) with different natural ranges; min-max
// normalization into a common band keeps one term from dominating by scale
// alone. The normalization bound for a term is produced by evaluating the
// *same* signal expression at its theoretical-maximum symbol values, so the
// bound tracks whatever the term actually measures.
//
// Sign convention (documented decision, see DESIGN.md): the default band is
// [a, b] = [-1, 0] with the *worst* case (value at the max bound) mapped to
// `a` and the best case (zero penalty) mapped to `b`. `compute_total` is the
// plain sum of weighted normalized terms, so totals are <= 0 and a larger
// penalty yields a more negative reward. Illegal actions bypass the engine
// entirely and use the configured sentinel instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Symbol table binding signal names to runtime values.
///
/// BTreeMap for deterministic iteration order in logs and tests.
pub type SymbolTable = BTreeMap<String, f64>;

/// Build a symbol table from name/value pairs.
pub fn symbols(pairs: &[(&str, f64)]) -> SymbolTable {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Symbol names used by the standard term set.
pub const SYM_ENERGY_MWH: &str = "energy_mwh";
pub const SYM_COST_PER_MWH: &str = "cost_per_mwh";
pub const SYM_OCCUPANCY_PCT: &str = "occupancy_pct";
pub const SYM_DROPPED: &str = "dropped";

/// Standard term names registered by `with_standard_terms`.
pub const TERM_ENERGY_COST: &str = "energy_cost";
pub const TERM_QUEUE_OCCUPANCY: &str = "queue_occupancy";
pub const TERM_PACKET_DROP: &str = "packet_drop";

/// Reward computation failures.
///
/// `UnresolvedSignal` is a fatal usage error: a term was evaluated before
/// its symbols were bound. It aborts the computation rather than silently
/// substituting a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardError {
    UnresolvedSignal { symbol: String },
    UnknownTerm { name: String },
}

/// A signal is an expression over named symbols, evaluated against the
/// symbol table bound to its term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    Const(f64),
    Symbol(String),
    Add(Box<Signal>, Box<Signal>),
    Mul(Box<Signal>, Box<Signal>),
}

impl Signal {
    pub fn sym(name: &str) -> Self {
        Signal::Symbol(name.to_string())
    }

    pub fn add(a: Signal, b: Signal) -> Self {
        Signal::Add(Box::new(a), Box::new(b))
    }

    pub fn mul(a: Signal, b: Signal) -> Self {
        Signal::Mul(Box::new(a), Box::new(b))
    }

    /// Evaluate against `symbols`. A reference to a name missing from the
    /// table is an `UnresolvedSignal` error.
    pub fn evaluate(&self, symbols: &SymbolTable) -> Result<f64, RewardError> {
        match self {
            Signal::Const(v) => Ok(*v),
            Signal::Symbol(name) => {
                symbols
                    .get(name)
                    .copied()
                    .ok_or_else(|| RewardError::UnresolvedSignal {
                        symbol: name.clone(),
                    })
            }
            Signal::Add(a, b) => Ok(a.evaluate(symbols)? + b.evaluate(symbols)?),
            Signal::Mul(a, b) => Ok(a.evaluate(symbols)? * b.evaluate(symbols)?),
        }
    }
}

/// Maps a raw signal value into a bounded range for fair combination
/// across terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Normalizer {
    /// Pass-through (the default when no normalizer is attached).
    Identity,
    /// Linear map of [min, max] onto [worst, best] reversed: a value at
    /// `max` normalizes to `worst`, a value at `min` to `best`. Inputs are
    /// clamped to [min, max] first.
    MinMax {
        min: f64,
        max: f64,
        worst: f64,
        best: f64,
    },
}

/// Default band: worst case at -1, no penalty at 0.
pub const DEFAULT_BAND_WORST: f64 = -1.0;
pub const DEFAULT_BAND_BEST: f64 = 0.0;

impl Normalizer {
    /// Min-max normalizer with the default [-1, 0] band.
    pub fn min_max(min: f64, max: f64) -> Self {
        Normalizer::MinMax {
            min,
            max,
            worst: DEFAULT_BAND_WORST,
            best: DEFAULT_BAND_BEST,
        }
    }

    /// Min-max normalizer with a caller-chosen band.
    pub fn min_max_with_band(min: f64, max: f64, worst: f64, best: f64) -> Self {
        Normalizer::MinMax {
            min,
            max,
            worst,
            best,
        }
    }

    pub fn normalize(&self, value: f64) -> f64 {
        match *self {
            Normalizer::Identity => value,
            Normalizer::MinMax {
                min,
                max,
                worst,
                best,
            } => {
                let span = max - min;
                if span <= 0.0 {
                    // Degenerate bound: only an exceedance reads as worst
                    // case; at or below the collapsed bound there is
                    // nothing to penalize.
                    return if value > max { worst } else { best };
                }
                let v = value.clamp(min, max);
                best + (v - min) / span * (worst - best)
            }
        }
    }
}

/// Named term template: weight plus signal expression. Registered once at
/// engine construction; bound per computation via `include_term`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermTemplate {
    pub name: String,
    pub weight: f64,
    pub signal: Signal,
}

/// A term bound to concrete symbol values. Transient: created by
/// `include_term`, consumed by `compute_total`.
#[derive(Debug, Clone)]
struct BoundTerm {
    weight: f64,
    signal: Signal,
    symbols: SymbolTable,
    normalizer: Normalizer,
}

impl BoundTerm {
    fn compute(&self) -> Result<f64, RewardError> {
        let raw = self.signal.evaluate(&self.symbols)?;
        Ok(self.weight * self.normalizer.normalize(raw))
    }
}

/// Evaluates a configurable set of weighted, normalized reward terms.
#[derive(Debug, Clone)]
pub struct RewardEngine {
    templates: Vec<TermTemplate>,
    active: Vec<BoundTerm>,
}

impl RewardEngine {
    pub fn new(templates: Vec<TermTemplate>) -> Self {
        Self {
            templates,
            active: Vec::new(),
        }
    }

    /// Engine with the standard three-term model:
    /// - `energy_cost`      = energy_mwh * cost_per_mwh
    /// - `queue_occupancy`  = occupancy_pct
    /// - `packet_drop`      = dropped
    pub fn with_standard_terms(
        energy_weight: f64,
        occupancy_weight: f64,
        drop_weight: f64,
    ) -> Self {
        Self::new(vec![
            TermTemplate {
                name: TERM_ENERGY_COST.to_string(),
                weight: energy_weight,
                signal: Signal::mul(
                    Signal::sym(SYM_ENERGY_MWH),
                    Signal::sym(SYM_COST_PER_MWH),
                ),
            },
            TermTemplate {
                name: TERM_QUEUE_OCCUPANCY.to_string(),
                weight: occupancy_weight,
                signal: Signal::sym(SYM_OCCUPANCY_PCT),
            },
            TermTemplate {
                name: TERM_PACKET_DROP.to_string(),
                weight: drop_weight,
                signal: Signal::sym(SYM_DROPPED),
            },
        ])
    }

    fn template(&self, name: &str) -> Result<&TermTemplate, RewardError> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RewardError::UnknownTerm {
                name: name.to_string(),
            })
    }

    /// Evaluate the named template's signal at its theoretical-maximum
    /// symbol values, producing the min-max bound for that term.
    pub fn normalization_bound(
        &self,
        name: &str,
        max_symbols: &SymbolTable,
    ) -> Result<f64, RewardError> {
        self.template(name)?.signal.evaluate(max_symbols)
    }

    /// Look up a named term template, bind the caller-supplied symbol table,
    /// optionally attach a normalizer, and append to the active term set.
    pub fn include_term(
        &mut self,
        name: &str,
        symbols: SymbolTable,
        normalizer: Option<Normalizer>,
    ) -> Result<(), RewardError> {
        let template = self.template(name)?;
        let (weight, signal) = (template.weight, template.signal.clone());
        self.active.push(BoundTerm {
            weight,
            signal,
            symbols,
            normalizer: normalizer.unwrap_or(Normalizer::Identity),
        });
        Ok(())
    }

    /// Number of terms currently included.
    pub fn active_terms(&self) -> usize {
        self.active.len()
    }

    /// Evaluate every included term as `weight * normalize(signal)` and sum.
    /// The active set is discarded whether or not evaluation succeeds:
    /// terms are never reused across computations, and an unresolved symbol
    /// aborts the computation with an error.
    pub fn compute_total(&mut self) -> Result<f64, RewardError> {
        let terms = std::mem::take(&mut self.active);
        let mut total = 0.0;
        for term in &terms {
            total += term.compute()?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RewardEngine {
        RewardEngine::with_standard_terms(1.0, 1.0, 1.0)
    }

    #[test]
    fn signal_at_max_bound_normalizes_to_worst() {
        // Scenario: signal value equal to its configured max bound,
        // weight 1, default band => compute() = -1.
        let mut e = engine();
        e.include_term(
            TERM_QUEUE_OCCUPANCY,
            symbols(&[(SYM_OCCUPANCY_PCT, 100.0)]),
            Some(Normalizer::min_max(0.0, 100.0)),
        )
        .unwrap();
        let total = e.compute_total().unwrap();
        assert!((total - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn total_is_weighted_normalized_sum_and_deterministic() {
        let compute = || {
            let mut e = RewardEngine::with_standard_terms(2.0, 1.0, 0.5);
            e.include_term(
                TERM_ENERGY_COST,
                symbols(&[(SYM_ENERGY_MWH, 5.0), (SYM_COST_PER_MWH, 2.0)]),
                Some(Normalizer::min_max(0.0, 20.0)),
            )
            .unwrap();
            e.include_term(
                TERM_QUEUE_OCCUPANCY,
                symbols(&[(SYM_OCCUPANCY_PCT, 50.0)]),
                Some(Normalizer::min_max(0.0, 100.0)),
            )
            .unwrap();
            e.include_term(
                TERM_PACKET_DROP,
                symbols(&[(SYM_DROPPED, 4.0)]),
                Some(Normalizer::min_max(0.0, 8.0)),
            )
            .unwrap();
            e.compute_total().unwrap()
        };

        // energy: 10/20 -> -0.5 * w2 = -1.0
        // occupancy: 50/100 -> -0.5 * w1 = -0.5
        // drops: 4/8 -> -0.5 * w0.5 = -0.25
        let expected = -1.75;
        let total = compute();
        assert!((total - expected).abs() < 1e-12);
        assert_eq!(compute(), total);
    }

    #[test]
    fn unbound_symbol_is_fatal() {
        let mut e = engine();
        // occupancy term bound with the wrong symbol name
        e.include_term(
            TERM_QUEUE_OCCUPANCY,
            symbols(&[(SYM_DROPPED, 1.0)]),
            None,
        )
        .unwrap();
        let err = e.compute_total().unwrap_err();
        assert_eq!(
            err,
            RewardError::UnresolvedSignal {
                symbol: SYM_OCCUPANCY_PCT.to_string()
            }
        );
        // The failed computation still discarded the term set.
        assert_eq!(e.active_terms(), 0);
    }

    #[test]
    fn unknown_term_name_is_rejected() {
        let mut e = engine();
        let err = e
            .include_term("latency", SymbolTable::new(), None)
            .unwrap_err();
        assert_eq!(
            err,
            RewardError::UnknownTerm {
                name: "latency".to_string()
            }
        );
    }

    #[test]
    fn terms_are_discarded_after_computation() {
        let mut e = engine();
        e.include_term(
            TERM_PACKET_DROP,
            symbols(&[(SYM_DROPPED, 1.0)]),
            Some(Normalizer::min_max(0.0, 1.0)),
        )
        .unwrap();
        assert_eq!(e.active_terms(), 1);

        let first = e.compute_total().unwrap();
        assert!((first - (-1.0)).abs() < 1e-12);
        assert_eq!(e.active_terms(), 0);

        // Nothing included since: an empty computation sums to zero.
        assert_eq!(e.compute_total().unwrap(), 0.0);
    }

    #[test]
    fn identity_is_the_default_normalizer() {
        let mut e = engine();
        e.include_term(TERM_PACKET_DROP, symbols(&[(SYM_DROPPED, 7.0)]), None)
            .unwrap();
        assert_eq!(e.compute_total().unwrap(), 7.0);
    }

    #[test]
    fn min_max_clamps_out_of_range_inputs() {
        let n = Normalizer::min_max(0.0, 10.0);
        assert_eq!(n.normalize(-5.0), 0.0);
        assert_eq!(n.normalize(25.0), -1.0);
        assert!((n.normalize(5.0) - (-0.5)).abs() < 1e-12);
    }

    #[test]
    fn degenerate_bound_penalizes_only_exceedance() {
        let n = Normalizer::min_max(0.0, 0.0);
        assert_eq!(n.normalize(0.0), 0.0);
        assert_eq!(n.normalize(0.5), -1.0);
    }

    #[test]
    fn custom_band_is_honored() {
        let n = Normalizer::min_max_with_band(0.0, 4.0, -2.0, 0.0);
        assert!((n.normalize(2.0) - (-1.0)).abs() < 1e-12);
        assert_eq!(n.normalize(4.0), -2.0);
    }

    #[test]
    fn normalization_bound_evaluates_signal_at_max_inputs() {
        let e = engine();
        let bound = e
            .normalization_bound(
                TERM_ENERGY_COST,
                &symbols(&[(SYM_ENERGY_MWH, 3.0), (SYM_COST_PER_MWH, 4.0)]),
            )
            .unwrap();
        assert_eq!(bound, 12.0);
    }
}
