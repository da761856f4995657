//! Threshold sensitivity over a frozen stored-context population.
//!
//! Both sweep kinds are pure functions of their inputs and never re-sample.
//! A failing candidate is logged and skipped; the remaining candidates still run.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::VariableDomain;
use crate::error::{DiagResult, ExecutionError, ValidationError};
use crate::expression::{ComparisonOperator, Expression};
use crate::simulation::population::{PopulationId, StoredContexts};
use crate::simulation::result::{rate, ClauseFailure, SimulationResult};
use crate::simulation::tree::{ClauseKind, ClauseTree, ThresholdOverride};

/// Global ranking weight of the near-miss rate.
pub const GLOBAL_RANK_NEAR_MISS_WEIGHT: f64 = 0.45;
/// Global ranking weight of the failure rate.
pub const GLOBAL_RANK_FAILURE_WEIGHT: f64 = 0.30;
/// Global ranking weight of the last-mile rate.
pub const GLOBAL_RANK_LAST_MILE_WEIGHT: f64 = 0.25;

const GRID_ROUNDING: f64 = 1e9;

/// Sweep options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityOptions {
    /// Grid points on each side of the original threshold.
    pub steps_per_side: usize,
    /// Grid step; defaults to the variable domain's step.
    pub step_size: Option<f64>,
    /// Global sweep candidates.
    pub top_n: usize,
}

impl Default for SensitivityOptions {
    fn default() -> Self {
        Self {
            steps_per_side: 4,
            step_size: None,
            top_n: 3,
        }
    }
}

impl SensitivityOptions {
    /// Rejects non-positive step sizes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(step) = self.step_size {
            if !step.is_finite() || step <= 0.0 {
                return Err(ValidationError::InvalidSimulationConfig {
                    reason: format!("step_size must be finite and > 0, got {step}"),
                });
            }
        }
        Ok(())
    }
}

/// One point of a clause sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityGridPoint {
    /// Threshold tried.
    pub threshold: f64,
    /// Contexts passing the clause.
    pub pass_count: u64,
    /// Contexts evaluated.
    pub sample_count: u64,
    /// `pass_count / sample_count`.
    pub pass_rate: f64,
    /// Integer threshold with the same pass set, for integer domains.
    pub effective_threshold: Option<f64>,
}

/// Marginal sweep of one clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityResult {
    /// Variable path.
    pub variable_path: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold the grid is centred on.
    pub original_threshold: f64,
    /// Integer or float.
    pub domain: VariableDomain,
    /// Grid step.
    pub step_size: f64,
    /// Ascending thresholds.
    pub grid: Vec<SensitivityGridPoint>,
    /// Population the rates were computed over.
    pub population: PopulationId,
}

impl SensitivityResult {
    /// Short hash of the backing population.
    #[must_use]
    pub fn population_hash(&self) -> &str {
        &self.population.hash
    }
}

/// One point of a whole-expression sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalGridPoint {
    /// Threshold tried for the swept clause.
    pub threshold: f64,
    /// Contexts where the whole expression held.
    pub trigger_count: u64,
    /// Contexts evaluated.
    pub sample_count: u64,
    /// `trigger_count / sample_count`.
    pub trigger_rate: f64,
}

/// Whole-expression sweep over one clause's threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSensitivityResult {
    /// Swept clause.
    pub clause_id: String,
    /// Its variable path.
    pub variable_path: String,
    /// Its comparison.
    pub operator: ComparisonOperator,
    /// Its threshold.
    pub original_threshold: f64,
    /// Composite ranking score.
    pub rank_score: f64,
    /// Ascending thresholds.
    pub grid: Vec<GlobalGridPoint>,
    /// Population the rates were computed over.
    pub population: PopulationId,
}

/// Marginal and global sweeps for one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityReport {
    /// Per-clause sweeps.
    pub marginal: Vec<SensitivityResult>,
    /// Whole-expression sweeps of the top-ranked clauses.
    pub global: Vec<GlobalSensitivityResult>,
}

/// Threshold sweeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensitivityAnalyzer;

impl SensitivityAnalyzer {
    /// Both sweep kinds over a result's stored contexts.
    #[must_use]
    pub fn analyze(expression: &Expression, result: &SimulationResult, options: &SensitivityOptions) -> SensitivityReport {
        SensitivityReport {
            marginal: Self::compute_marginal_sweeps(&result.stored_contexts, &result.clause_failures, options),
            global: Self::compute_global_sensitivity(expression, &result.stored_contexts, &result.clause_failures, options),
        }
    }

    /// `threshold + k·step` for `k` in `-steps..=steps`, ascending, deduplicated.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn threshold_grid(threshold: f64, step: f64, steps_per_side: usize) -> Vec<f64> {
        let steps = steps_per_side as i64;
        let mut grid: Vec<f64> = (-steps..=steps)
            .map(|k| ((threshold + k as f64 * step) * GRID_ROUNDING).round() / GRID_ROUNDING)
            .collect();
        grid.dedup();
        grid
    }

    /// Integer threshold with the same pass set over integer values.
    ///
    /// Smallest such integer for `>=` / `>`, largest for `<=` / `<`; `==` only
    /// has one when the threshold is already integral.
    #[must_use]
    pub fn effective_threshold(operator: ComparisonOperator, threshold: f64) -> Option<f64> {
        if !threshold.is_finite() {
            return None;
        }
        match operator {
            ComparisonOperator::Gte | ComparisonOperator::Lt => Some(threshold.ceil()),
            ComparisonOperator::Gt | ComparisonOperator::Lte => Some(threshold.floor()),
            ComparisonOperator::Eq => (threshold.fract() == 0.0).then_some(threshold),
        }
    }

    fn step_for(domain: VariableDomain, options: &SensitivityOptions) -> f64 {
        options.step_size.unwrap_or_else(|| domain.default_step())
    }

    fn check_population(contexts: &StoredContexts, options: &SensitivityOptions) -> DiagResult<()> {
        options.validate()?;
        if contexts.is_empty() {
            return Err(ExecutionError::EmptyPopulation {
                population: contexts.predicate().to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Pass rate of `variable_path <operator> t` for every grid threshold `t`.
    pub fn compute_threshold_sensitivity(
        contexts: &StoredContexts,
        variable_path: &str,
        operator: ComparisonOperator,
        threshold: f64,
        options: &SensitivityOptions,
    ) -> DiagResult<SensitivityResult> {
        Self::check_population(contexts, options)?;
        if !threshold.is_finite() {
            return Err(ExecutionError::SensitivityFailed {
                var_path: variable_path.to_string(),
                reason: format!("threshold must be finite, got {threshold}"),
            }
            .into());
        }

        let domain = VariableDomain::of(variable_path);
        let step = Self::step_for(domain, options);
        let values: Vec<Option<f64>> = contexts.iter().map(|c| c.resolve(variable_path)).collect();
        let sample_count = values.len() as u64;

        let grid = Self::threshold_grid(threshold, step, options.steps_per_side)
            .into_iter()
            .map(|t| {
                let pass_count = values
                    .iter()
                    .filter(|v| v.is_some_and(|v| operator.compare(v, t)))
                    .count() as u64;
                SensitivityGridPoint {
                    threshold: t,
                    pass_count,
                    sample_count,
                    pass_rate: rate(pass_count, sample_count),
                    effective_threshold: match domain {
                        VariableDomain::Integer => Self::effective_threshold(operator, t),
                        VariableDomain::Float => None,
                    },
                }
            })
            .collect();

        Ok(SensitivityResult {
            variable_path: variable_path.to_string(),
            operator,
            original_threshold: threshold,
            domain,
            step_size: step,
            grid,
            population: contexts.population_id(),
        })
    }

    /// Sweeps every distinct `(path, operator, threshold)` among failing clauses.
    #[must_use]
    pub fn compute_marginal_sweeps(
        contexts: &StoredContexts,
        blockers: &[ClauseFailure],
        options: &SensitivityOptions,
    ) -> Vec<SensitivityResult> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for clause in blockers.iter().filter(|c| c.fail_count > 0) {
            let key = (clause.variable_path.as_str(), clause.operator, clause.threshold.to_bits());
            if !seen.insert(key) {
                continue;
            }
            match Self::compute_threshold_sensitivity(
                contexts,
                &clause.variable_path,
                clause.operator,
                clause.threshold,
                options,
            ) {
                Ok(result) => out.push(result),
                Err(e) => warn!(
                    clause_id = %clause.clause_id,
                    variable_path = %clause.variable_path,
                    error = %e,
                    "marginal sensitivity sweep failed"
                ),
            }
        }
        out
    }

    /// `0.45·near_miss + 0.30·failure + 0.25·last_mile`.
    #[must_use]
    pub fn global_rank_score(clause: &ClauseFailure) -> f64 {
        GLOBAL_RANK_NEAR_MISS_WEIGHT * clause.near_miss_rate
            + GLOBAL_RANK_FAILURE_WEIGHT * clause.failure_rate
            + GLOBAL_RANK_LAST_MILE_WEIGHT * clause.last_mile_rate
    }

    /// Failing clauses ranked by [`Self::global_rank_score`], best first, at most `top_n`.
    #[must_use]
    pub fn rank_global_candidates(blockers: &[ClauseFailure], top_n: usize) -> Vec<&ClauseFailure> {
        let mut ranked: Vec<&ClauseFailure> = blockers.iter().filter(|c| c.fail_count > 0).collect();
        ranked.sort_by(|a, b| {
            Self::global_rank_score(b)
                .total_cmp(&Self::global_rank_score(a))
                .then_with(|| a.clause_id.cmp(&b.clause_id))
        });
        ranked.truncate(top_n);
        ranked
    }

    /// Whole-expression trigger rate while each top-ranked clause's threshold varies.
    #[must_use]
    pub fn compute_global_sensitivity(
        expression: &Expression,
        contexts: &StoredContexts,
        blockers: &[ClauseFailure],
        options: &SensitivityOptions,
    ) -> Vec<GlobalSensitivityResult> {
        let tree = ClauseTree::build(expression);
        Self::rank_global_candidates(blockers, options.top_n)
            .into_iter()
            .filter_map(|clause| match Self::compute_global_sweep(&tree, clause, contexts, options) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(
                        clause_id = %clause.clause_id,
                        variable_path = %clause.variable_path,
                        error = %e,
                        "global sensitivity sweep failed"
                    );
                    None
                }
            })
            .collect()
    }

    fn compute_global_sweep(
        tree: &ClauseTree,
        clause: &ClauseFailure,
        contexts: &StoredContexts,
        options: &SensitivityOptions,
    ) -> DiagResult<GlobalSensitivityResult> {
        Self::check_population(contexts, options)?;
        let failed = |reason: &str| ExecutionError::SensitivityFailed {
            var_path: clause.variable_path.clone(),
            reason: reason.to_string(),
        };
        let node_id = tree
            .find_clause(&clause.clause_id)
            .ok_or_else(|| failed("clause not present in expression"))?;
        let leaf = match tree.node(node_id).map(|n| &n.kind) {
            Some(ClauseKind::Leaf(leaf)) => leaf,
            _ => return Err(failed("clause is not a comparison leaf").into()),
        };

        let step = Self::step_for(leaf.domain, options);
        let sample_count = contexts.len() as u64;
        let grid = Self::threshold_grid(leaf.threshold, step, options.steps_per_side)
            .into_iter()
            .map(|t| {
                let ov = Some(ThresholdOverride {
                    node: node_id,
                    threshold: t,
                });
                let trigger_count = contexts.iter().filter(|c| tree.evaluate(c, ov)).count() as u64;
                GlobalGridPoint {
                    threshold: t,
                    trigger_count,
                    sample_count,
                    trigger_rate: rate(trigger_count, sample_count),
                }
            })
            .collect();

        Ok(GlobalSensitivityResult {
            clause_id: clause.clause_id.clone(),
            variable_path: leaf.variable_path.clone(),
            operator: leaf.operator,
            original_threshold: leaf.threshold,
            rank_score: Self::global_rank_score(clause),
            grid,
            population: contexts.population_id(),
        })
    }
}
