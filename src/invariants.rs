//! Post-hoc consistency checks on aggregated diagnostics.
//!
//! The validator never fails: every check yields an [`InvariantCheck`] record so
//! a report can list all violations at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::PrototypeKind;
use crate::simulation::{ConfidenceInterval, SimulationResult};

/// Aggregated facts about one clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseFact {
    /// Clause id.
    pub clause_id: String,
    /// Failure rate.
    pub failure_rate: f64,
    /// In-regime failure rate.
    pub in_regime_failure_rate: f64,
    /// Near-miss rate.
    pub near_miss_rate: f64,
    /// Last-mile rate.
    pub last_mile_rate: f64,
    /// Samples with the prototype's gates passing, for prototype clauses.
    pub gate_pass_count: Option<u64>,
    /// Samples where gate and clause both passed, for prototype clauses.
    pub threshold_pass_count: Option<u64>,
}

/// Aggregated facts about one prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrototypeFact {
    /// Family.
    pub kind: PrototypeKind,
    /// Prototype id.
    pub prototype_id: String,
    /// In-regime samples evaluated.
    pub mood_sample_count: u64,
    /// Gate passes.
    pub gate_pass_count: u64,
    /// Gate failures.
    pub gate_fail_count: u64,
    /// Gate pass rate.
    pub gate_pass_rate: f64,
}

/// Everything the validator looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticFacts {
    /// Overall trigger rate.
    pub trigger_rate: f64,
    /// Interval around it, if one was computed.
    pub confidence_interval: Option<ConfidenceInterval>,
    /// In-regime samples.
    pub in_regime_sample_count: u64,
    /// In-regime trigger rate.
    pub in_regime_trigger_rate: f64,
    /// Per-clause facts.
    pub clauses: Vec<ClauseFact>,
    /// Per-prototype facts.
    pub prototypes: Vec<PrototypeFact>,
    /// Reservoir capacity.
    pub reservoir_limit: usize,
    /// Reservoir entries.
    pub reservoir_stored_count: usize,
    /// In-regime samples offered to the reservoir.
    pub reservoir_sample_count: u64,
    /// Σ bins per tracked axis.
    pub histogram_totals: BTreeMap<String, u64>,
}

impl DiagnosticFacts {
    /// Collects the facts of a finished simulation.
    #[must_use]
    pub fn from_result(result: &SimulationResult) -> Self {
        let clauses = result
            .clause_failures
            .iter()
            .map(|c| ClauseFact {
                clause_id: c.clause_id.clone(),
                failure_rate: c.failure_rate,
                in_regime_failure_rate: c.in_regime_failure_rate,
                near_miss_rate: c.near_miss_rate,
                last_mile_rate: c.last_mile_rate,
                gate_pass_count: c.gate.map(|g| g.gate_pass_count),
                threshold_pass_count: c.gate.map(|g| g.threshold_pass_count),
            })
            .collect();

        let summary = &result.prototype_evaluation_summary;
        let families = [
            (PrototypeKind::Emotion, &summary.emotions),
            (PrototypeKind::Sexual, &summary.sexual_states),
        ];
        let prototypes = families
            .into_iter()
            .flat_map(|(kind, family)| {
                family.iter().map(move |(id, stats)| PrototypeFact {
                    kind,
                    prototype_id: id.clone(),
                    mood_sample_count: stats.mood_sample_count,
                    gate_pass_count: stats.gate_pass_count,
                    gate_fail_count: stats.gate_fail_count,
                    gate_pass_rate: stats.gate_pass_rate,
                })
            })
            .collect();

        let population = &result.population_summary;
        Self {
            trigger_rate: result.trigger_rate,
            confidence_interval: Some(result.confidence_interval),
            in_regime_sample_count: population.in_regime_sample_count,
            in_regime_trigger_rate: population.in_regime_trigger_rate,
            clauses,
            prototypes,
            reservoir_limit: result.mood_regime_sample_reservoir.limit,
            reservoir_stored_count: result.mood_regime_sample_reservoir.stored_count(),
            reservoir_sample_count: result.mood_regime_sample_reservoir.sample_count,
            histogram_totals: result
                .mood_regime_axis_histograms
                .axes
                .iter()
                .map(|(axis, h)| (axis.clone(), h.total()))
                .collect(),
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantCheck {
    /// Stable check id, e.g. `clause.prereq0.failure_rate.range`.
    pub id: String,
    /// Whether the invariant held.
    pub ok: bool,
    /// What was compared.
    pub detail: String,
}

impl InvariantCheck {
    fn new(id: impl Into<String>, ok: bool, detail: String) -> Self {
        Self { id: id.into(), ok, detail }
    }
}

/// Runs the consistency checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvariantValidator;

impl InvariantValidator {
    /// Checks every invariant and returns one record per check.
    #[must_use]
    pub fn validate(facts: &DiagnosticFacts) -> Vec<InvariantCheck> {
        let mut checks = Vec::new();

        checks.push(rate_check("trigger_rate.range", facts.trigger_rate));
        checks.push(rate_check("in_regime_trigger_rate.range", facts.in_regime_trigger_rate));
        if let Some(ci) = facts.confidence_interval {
            checks.push(InvariantCheck::new(
                "confidence_interval.contains_rate",
                ci.contains(facts.trigger_rate),
                format!("[{}, {}] vs {}", ci.low, ci.high, facts.trigger_rate),
            ));
        }

        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        for clause in &facts.clauses {
            *seen.entry(clause.clause_id.as_str()).or_default() += 1;
            let prefix = format!("clause.{}", clause.clause_id);
            for (name, value) in [
                ("failure_rate", clause.failure_rate),
                ("in_regime_failure_rate", clause.in_regime_failure_rate),
                ("near_miss_rate", clause.near_miss_rate),
                ("last_mile_rate", clause.last_mile_rate),
            ] {
                checks.push(rate_check(format!("{prefix}.{name}.range"), value));
            }
            if let (Some(gate_pass), Some(threshold_pass)) = (clause.gate_pass_count, clause.threshold_pass_count) {
                checks.push(InvariantCheck::new(
                    format!("{prefix}.threshold_pass_within_gate_pass"),
                    threshold_pass <= gate_pass,
                    format!("threshold_pass_count={threshold_pass} gate_pass_count={gate_pass}"),
                ));
            }
        }
        for (clause_id, count) in seen {
            checks.push(InvariantCheck::new(
                format!("clause.{clause_id}.unique"),
                count == 1,
                format!("{count} entries"),
            ));
        }

        for proto in &facts.prototypes {
            let prefix = format!("prototype.{}.{}", proto.kind.context_key(), proto.prototype_id);
            checks.push(rate_check(format!("{prefix}.gate_pass_rate.range"), proto.gate_pass_rate));
            checks.push(InvariantCheck::new(
                format!("{prefix}.gate_pass_within_samples"),
                proto.gate_pass_count <= proto.mood_sample_count,
                format!(
                    "gate_pass_count={} mood_sample_count={}",
                    proto.gate_pass_count, proto.mood_sample_count
                ),
            ));
            checks.push(InvariantCheck::new(
                format!("{prefix}.gate_counts_partition_samples"),
                proto.gate_pass_count + proto.gate_fail_count == proto.mood_sample_count,
                format!(
                    "{} + {} vs {}",
                    proto.gate_pass_count, proto.gate_fail_count, proto.mood_sample_count
                ),
            ));
        }

        checks.push(InvariantCheck::new(
            "reservoir.within_limit",
            facts.reservoir_stored_count <= facts.reservoir_limit,
            format!("stored={} limit={}", facts.reservoir_stored_count, facts.reservoir_limit),
        ));
        checks.push(InvariantCheck::new(
            "reservoir.sample_count",
            facts.reservoir_sample_count == facts.in_regime_sample_count,
            format!(
                "offered={} in_regime={}",
                facts.reservoir_sample_count, facts.in_regime_sample_count
            ),
        ));

        for (axis, total) in &facts.histogram_totals {
            checks.push(InvariantCheck::new(
                format!("histogram.{axis}.total"),
                *total == facts.in_regime_sample_count,
                format!("bins={total} in_regime={}", facts.in_regime_sample_count),
            ));
        }

        checks
    }

    /// Only the failed checks.
    #[must_use]
    pub fn violations(facts: &DiagnosticFacts) -> Vec<InvariantCheck> {
        Self::validate(facts).into_iter().filter(|c| !c.ok).collect()
    }
}

fn rate_check(id: impl Into<String>, value: f64) -> InvariantCheck {
    InvariantCheck::new(id, (0.0..=1.0).contains(&value), format!("value={value}"))
}
