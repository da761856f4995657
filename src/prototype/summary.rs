//! Population-level accumulation of prototype evaluations.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{PrototypeEvaluation, PrototypeEvaluationTarget};
use crate::registry::PrototypeKind;

/// Aggregate statistics for one prototype across the mood-regime population.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrototypeEvaluationStats {
    /// Whether the previous timepoint's axes were scored.
    pub previous_timepoint: bool,
    /// In-regime samples evaluated.
    pub mood_sample_count: u64,
    /// Samples where every gate passed.
    pub gate_pass_count: u64,
    /// Samples where at least one gate failed.
    pub gate_fail_count: u64,
    /// Failures per gate string.
    pub failed_gate_counts: BTreeMap<String, u64>,
    /// Σ raw score.
    pub raw_score_sum: f64,
    /// Σ gated value.
    pub value_sum: f64,
    /// Σ raw value over gate-passing samples.
    pub gate_pass_raw_value_sum: f64,

    /// `gate_pass_count / mood_sample_count`.
    pub gate_pass_rate: f64,
    /// Mean raw score.
    pub mean_raw_score: f64,
    /// Mean gated value.
    pub mean_value: f64,
    /// Mean raw value conditional on the gates passing.
    pub mean_value_given_gate_pass: Option<f64>,
}

/// Per-family statistics keyed by prototype id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrototypeEvaluationSummary {
    /// Emotion prototypes.
    pub emotions: BTreeMap<String, PrototypeEvaluationStats>,
    /// Sexual prototypes.
    pub sexual_states: BTreeMap<String, PrototypeEvaluationStats>,
}

impl PrototypeEvaluationSummary {
    /// Creates zeroed entries for every target.
    #[must_use]
    pub fn new(targets: &[PrototypeEvaluationTarget]) -> Self {
        let mut summary = Self::default();
        for target in targets {
            summary
                .family_mut(target.kind)
                .entry(target.id.to_string())
                .or_default()
                .previous_timepoint = target.use_previous;
        }
        summary
    }

    fn family_mut(&mut self, kind: PrototypeKind) -> &mut BTreeMap<String, PrototypeEvaluationStats> {
        match kind {
            PrototypeKind::Emotion => &mut self.emotions,
            PrototypeKind::Sexual => &mut self.sexual_states,
        }
    }

    /// Stats for one prototype.
    #[must_use]
    pub fn get(&self, kind: PrototypeKind, id: &str) -> Option<&PrototypeEvaluationStats> {
        match kind {
            PrototypeKind::Emotion => self.emotions.get(id),
            PrototypeKind::Sexual => self.sexual_states.get(id),
        }
    }

    /// Accumulates one evaluation.
    pub fn record_prototype_evaluation(&mut self, target: &PrototypeEvaluationTarget, evaluation: &PrototypeEvaluation) {
        let stats = self.family_mut(target.kind).entry(target.id.to_string()).or_default();
        stats.mood_sample_count += 1;
        stats.raw_score_sum += evaluation.raw_score;
        stats.value_sum += evaluation.value;
        if evaluation.gate_pass {
            stats.gate_pass_count += 1;
            stats.gate_pass_raw_value_sum += evaluation.raw_value;
        } else {
            stats.gate_fail_count += 1;
            for &idx in &evaluation.failed_gates {
                if let Some(gate) = target.gate_strings.get(idx) {
                    *stats.failed_gate_counts.entry(gate.clone()).or_default() += 1;
                }
            }
        }
    }

    /// Recomputes the derived means and rates from the running sums.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_prototype_evaluation_summary(&mut self) {
        for stats in self.emotions.values_mut().chain(self.sexual_states.values_mut()) {
            let n = stats.mood_sample_count as f64;
            if stats.mood_sample_count == 0 {
                stats.gate_pass_rate = 0.0;
                stats.mean_raw_score = 0.0;
                stats.mean_value = 0.0;
                stats.mean_value_given_gate_pass = None;
                continue;
            }
            stats.gate_pass_rate = stats.gate_pass_count as f64 / n;
            stats.mean_raw_score = stats.raw_score_sum / n;
            stats.mean_value = stats.value_sum / n;
            stats.mean_value_given_gate_pass = (stats.gate_pass_count > 0)
                .then(|| stats.gate_pass_raw_value_sum / stats.gate_pass_count as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::GateAxes;
    use crate::prototype::PrototypeEvaluator;
    use crate::registry::Prototype;

    #[test]
    fn accumulates_gate_outcomes_and_means() {
        let target = PrototypeEvaluationTarget::compile(
            "confidence",
            PrototypeKind::Emotion,
            &Prototype::new([("agency_control", 1.0)], ["threat <= 0.20", "agency_control >= 0.10"]),
        );
        let mut summary = PrototypeEvaluationSummary::new(std::slice::from_ref(&target));

        let mut pass = GateAxes::default();
        pass.mood_axes.insert("threat", 0.0);
        pass.mood_axes.insert("agency_control", 0.6);
        let mut fail = GateAxes::default();
        fail.mood_axes.insert("threat", 0.5);
        fail.mood_axes.insert("agency_control", 0.05);

        for axes in [&pass, &fail, &pass] {
            let eval = PrototypeEvaluator::evaluate_prototype_sample(&target, axes);
            summary.record_prototype_evaluation(&target, &eval);
        }
        summary.update_prototype_evaluation_summary();

        let stats = summary.get(PrototypeKind::Emotion, "confidence").unwrap();
        assert_eq!(stats.mood_sample_count, 3);
        assert_eq!(stats.gate_pass_count, 2);
        assert_eq!(stats.gate_fail_count, 1);
        assert_eq!(stats.failed_gate_counts["threat <= 0.20"], 1);
        assert_eq!(stats.failed_gate_counts["agency_control >= 0.10"], 1);
        assert!((stats.gate_pass_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((stats.mean_value_given_gate_pass.unwrap() - 0.6).abs() < 1e-12);
        assert!((stats.mean_value - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_entries_finalize_to_zero() {
        let target = PrototypeEvaluationTarget::compile("calm", PrototypeKind::Emotion, &Prototype::default());
        let mut summary = PrototypeEvaluationSummary::new(&[target]);
        summary.update_prototype_evaluation_summary();
        let stats = summary.get(PrototypeKind::Emotion, "calm").unwrap();
        assert_eq!(stats.gate_pass_rate, 0.0);
        assert!(stats.mean_value_given_gate_pass.is_none());
    }
}
