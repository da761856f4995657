//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::axis::AxisFamily;
use crate::context::NormalizedContext;
use crate::error::ValidationError;
use crate::expression::{ComparisonOperator, Expression, LogicNode, LogicOperator};
use crate::sampling::SamplingDistribution;

/// Axis-range restriction defining the mood regime, in raw axis units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodConstraint {
    /// `moodAxes.<axis>`, `sexualAxes.<axis>`, `affectTraits.<axis>` or a bare axis name.
    pub var_path: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold in raw units.
    pub threshold: f64,
}

impl MoodConstraint {
    /// Creates a constraint.
    #[must_use]
    pub fn new(var_path: impl Into<String>, operator: ComparisonOperator, threshold: f64) -> Self {
        Self {
            var_path: var_path.into(),
            operator,
            threshold,
        }
    }

    /// Catalogued axis this constraint restricts.
    #[must_use]
    pub fn axis(&self) -> Option<&str> {
        let axis = ["moodAxes.", "sexualAxes.", "affectTraits."]
            .iter()
            .find_map(|prefix| self.var_path.strip_prefix(prefix))
            .unwrap_or(&self.var_path);
        AxisFamily::of(axis).map(|_| axis)
    }

    /// Rejects unknown axes and non-finite thresholds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.axis().is_none() {
            return Err(ValidationError::InvalidMoodConstraint {
                var_path: self.var_path.clone(),
                reason: "does not address a known axis".to_string(),
            });
        }
        if !self.threshold.is_finite() {
            return Err(ValidationError::InvalidMoodConstraint {
                var_path: self.var_path.clone(),
                reason: format!("threshold must be finite, got {}", self.threshold),
            });
        }
        Ok(())
    }

    /// Whether the context's current raw value satisfies the constraint.
    #[must_use]
    pub fn is_satisfied(&self, context: &NormalizedContext) -> bool {
        self.axis()
            .and_then(|axis| context.raw_axis_value(axis, false))
            .is_some_and(|value| self.operator.compare(value, self.threshold))
    }

    /// `<var_path> <op> <threshold>`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {} {}", self.var_path, self.operator, self.threshold)
    }
}

/// Options for one `simulate()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Samples to draw.
    pub sample_count: usize,
    /// Sampling distribution.
    pub distribution: SamplingDistribution,
    /// Fixed seed; `None` draws one from entropy and reports it on the result.
    pub seed: Option<u64>,
    /// Capacity of the in-regime raw-sample reservoir.
    pub mood_regime_sample_reservoir_limit: usize,
    /// Cap on full contexts retained for sensitivity sweeps.
    pub stored_context_limit: usize,
    /// Explicit mood-regime constraints.
    pub mood_constraints: Vec<MoodConstraint>,
    /// Derive constraints from the expression's AND-reachable `moodAxes` leaves
    /// when no explicit constraints are given.
    pub infer_mood_constraints: bool,
    /// Overrides the per-domain near-miss epsilon.
    pub near_miss_epsilon: Option<f64>,
    /// z value of the confidence interval.
    pub confidence_level_z: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_count: 10_000,
            distribution: SamplingDistribution::default(),
            seed: None,
            mood_regime_sample_reservoir_limit: 1_000,
            stored_context_limit: 10_000,
            mood_constraints: Vec::new(),
            infer_mood_constraints: false,
            near_miss_epsilon: None,
            confidence_level_z: 1.96,
        }
    }
}

impl SimulationConfig {
    /// Config with a sample count and seed, defaults otherwise.
    #[must_use]
    pub fn seeded(sample_count: usize, seed: u64) -> Self {
        Self {
            sample_count,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Validates the config before sampling.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sample_count == 0 {
            return Err(ValidationError::InvalidSimulationConfig {
                reason: "sample_count must be > 0".to_string(),
            });
        }
        self.distribution.validate()?;
        for constraint in &self.mood_constraints {
            constraint.validate()?;
        }
        if let Some(eps) = self.near_miss_epsilon {
            if !eps.is_finite() || eps < 0.0 {
                return Err(ValidationError::InvalidSimulationConfig {
                    reason: format!("near_miss_epsilon must be finite and >= 0, got {eps}"),
                });
            }
        }
        if !self.confidence_level_z.is_finite() || self.confidence_level_z <= 0.0 {
            return Err(ValidationError::InvalidSimulationConfig {
                reason: format!("confidence_level_z must be finite and > 0, got {}", self.confidence_level_z),
            });
        }
        Ok(())
    }

    /// Constraints defining the mood regime for `expression`.
    #[must_use]
    pub fn effective_mood_constraints(&self, expression: &Expression) -> Vec<MoodConstraint> {
        if !self.mood_constraints.is_empty() {
            return self.mood_constraints.clone();
        }
        if self.infer_mood_constraints {
            return infer_mood_constraints(expression);
        }
        Vec::new()
    }
}

/// `moodAxes.*` leaves every trigger must satisfy (reachable from the roots through AND nodes only).
///
/// Leaves on unknown axes are dropped.
#[must_use]
pub fn infer_mood_constraints(expression: &Expression) -> Vec<MoodConstraint> {
    fn walk(node: &LogicNode, out: &mut Vec<MoodConstraint>) {
        match node {
            LogicNode::Leaf {
                variable_path,
                operator,
                threshold,
            } => {
                if variable_path.starts_with("moodAxes.") {
                    let constraint = MoodConstraint::new(variable_path.clone(), *operator, *threshold);
                    if constraint.validate().is_ok() && !out.contains(&constraint) {
                        out.push(constraint);
                    }
                }
            }
            LogicNode::Compound {
                operator: LogicOperator::And,
                children,
            } => children.iter().for_each(|c| walk(c, out)),
            LogicNode::Compound { .. } => {}
        }
    }

    let mut out = Vec::new();
    for prereq in &expression.prerequisites {
        walk(&prereq.logic, &mut out);
    }
    out
}
