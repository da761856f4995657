//! Simulation output types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::MoodConstraint;
use super::population::{PopulationSummary, StoredContexts};
use super::tree::{ClauseLeaf, ClauseNode, ClauseStats, GateClauseStats};
use crate::context::{MoodRegimeAxisHistograms, MoodRegimeSampleReservoir, UnseededVarWarning};
use crate::context::VariableDomain;
use crate::expression::{ComparisonOperator, LogicOperator};
use crate::gate::{GateClampRegimePlan, GateCompatibilityReport};
use crate::prototype::PrototypeEvaluationSummary;
use crate::sampling::SamplingDistribution;

/// Severity weight of the last-mile failure rate.
pub const SEVERITY_LAST_MILE_WEIGHT: f64 = 0.5;
/// Severity weight of the failure rate.
pub const SEVERITY_FAILURE_WEIGHT: f64 = 0.35;
/// Severity weight of the near-miss rate.
pub const SEVERITY_NEAR_MISS_WEIGHT: f64 = 0.15;

/// Deterministic identifier of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationId(Uuid);

impl SimulationId {
    /// Derives the id from the canonical bytes of the run's inputs.
    #[must_use]
    pub fn derive(canonical_inputs: &[u8]) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical_inputs))
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-sided interval around the trigger rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound, ≥ 0.
    pub low: f64,
    /// Upper bound, ≤ 1.
    pub high: f64,
}

impl ConfidenceInterval {
    /// Wald interval `p ± z·sqrt(p(1-p)/n)`, clamped to [0, 1].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn wald(successes: u64, trials: u64, z: f64) -> Self {
        if trials == 0 {
            return Self { low: 0.0, high: 0.0 };
        }
        let n = trials as f64;
        let p = successes as f64 / n;
        let half = z * (p * (1.0 - p) / n).sqrt();
        Self {
            low: (p - half).clamp(0.0, 1.0),
            high: (p + half).clamp(0.0, 1.0),
        }
    }

    /// Whether `rate` lies within the bounds.
    #[must_use]
    pub fn contains(&self, rate: f64) -> bool {
        self.low <= rate && rate <= self.high
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn rate(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Finalised statistics of one leaf clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseFailure {
    /// Clause id in the instrumented tree.
    pub clause_id: String,
    /// Variable path.
    pub variable_path: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold.
    pub threshold: f64,
    /// Integer or float comparison.
    pub domain: VariableDomain,
    /// Evaluations.
    pub evaluation_count: u64,
    /// Failures.
    pub fail_count: u64,
    /// `fail_count / evaluation_count`.
    pub failure_rate: f64,
    /// Failure rate over in-regime samples.
    pub in_regime_failure_rate: f64,
    /// Mean distance to the threshold over failures with a resolved value.
    pub average_violation: Option<f64>,
    /// Failures within `near_miss_epsilon`.
    pub near_miss_count: u64,
    /// `near_miss_count / evaluation_count`.
    pub near_miss_rate: f64,
    /// Epsilon applied.
    pub near_miss_epsilon: f64,
    /// Decisive failures.
    pub last_mile_fail_count: u64,
    /// `last_mile_fail_count / evaluation_count`.
    pub last_mile_rate: f64,
    /// Prototype gate counters, for prototype paths.
    pub gate: Option<GateClauseStats>,
    /// Ranking score.
    pub severity: f64,
}

impl ClauseFailure {
    /// Summarises one leaf's counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_stats(node: &ClauseNode, leaf: &ClauseLeaf, stats: &ClauseStats, near_miss_epsilon: f64) -> Self {
        let n = stats.evaluation_count;
        let failure_rate = rate(stats.fail_count, n);
        let near_miss_rate = rate(stats.near_miss_count, n);
        let last_mile_rate = rate(stats.last_mile_fail_count, n);
        Self {
            clause_id: node.clause_id.clone(),
            variable_path: leaf.variable_path.clone(),
            operator: leaf.operator,
            threshold: leaf.threshold,
            domain: leaf.domain,
            evaluation_count: n,
            fail_count: stats.fail_count,
            failure_rate,
            in_regime_failure_rate: rate(stats.in_regime_fail_count, stats.in_regime_evaluation_count),
            average_violation: (stats.violation_count > 0)
                .then(|| stats.violation_sum / stats.violation_count as f64),
            near_miss_count: stats.near_miss_count,
            near_miss_rate,
            near_miss_epsilon,
            last_mile_fail_count: stats.last_mile_fail_count,
            last_mile_rate,
            gate: leaf.gate_target.as_ref().map(|_| stats.gate),
            severity: SEVERITY_LAST_MILE_WEIGHT * last_mile_rate
                + SEVERITY_FAILURE_WEIGHT * failure_rate
                + SEVERITY_NEAR_MISS_WEIGHT * near_miss_rate,
        }
    }
}

/// Aggregate pass/fail of an `and` / `or` node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundSummary {
    /// Clause id.
    pub clause_id: String,
    /// Combinator.
    pub operator: LogicOperator,
    /// Direct children.
    pub child_count: usize,
    /// Evaluations.
    pub evaluation_count: u64,
    /// Passes.
    pub pass_count: u64,
    /// Failures.
    pub fail_count: u64,
    /// `pass_count / evaluation_count`.
    pub pass_rate: f64,
    /// Decisive failures of this node under its parent AND.
    pub last_mile_fail_count: u64,
}

/// Output of one `simulate()` call.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    /// Deterministic run id.
    pub simulation_id: SimulationId,
    /// Expression id.
    pub expression_id: String,
    /// Seed actually used.
    pub seed: u64,
    /// Sampling distribution.
    pub distribution: SamplingDistribution,
    /// Samples drawn.
    pub sample_count: u64,
    /// Samples where every prerequisite held.
    pub trigger_count: u64,
    /// `trigger_count / sample_count`.
    pub trigger_rate: f64,
    /// Interval around `trigger_rate`.
    pub confidence_interval: ConfidenceInterval,
    /// Leaf statistics, most severe first.
    pub clause_failures: Vec<ClauseFailure>,
    /// Compound node statistics, in tree order.
    pub compound_summaries: Vec<CompoundSummary>,
    /// Constraints that defined the mood regime.
    pub mood_constraints: Vec<MoodConstraint>,
    /// In-regime histograms.
    pub mood_regime_axis_histograms: MoodRegimeAxisHistograms,
    /// In-regime reservoir.
    pub mood_regime_sample_reservoir: MoodRegimeSampleReservoir,
    /// In-regime contexts retained for sensitivity sweeps.
    pub stored_contexts: StoredContexts,
    /// Population identifiers and regime counts.
    pub population_summary: PopulationSummary,
    /// Gate satisfiability under the regime.
    pub gate_compatibility: GateCompatibilityReport,
    /// Tracked gate axes and clause-to-prototype map.
    pub gate_clamp_plan: GateClampRegimePlan,
    /// Paths no context resolves.
    pub unseeded_var_warnings: Vec<UnseededVarWarning>,
    /// In-regime per-prototype statistics.
    pub prototype_evaluation_summary: PrototypeEvaluationSummary,
}

impl SimulationResult {
    /// Leaf statistics by clause id.
    #[must_use]
    pub fn clause(&self, clause_id: &str) -> Option<&ClauseFailure> {
        self.clause_failures.iter().find(|c| c.clause_id == clause_id)
    }
}
