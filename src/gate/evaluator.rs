//! Gate reasoning beyond single evaluations.
//!
//! Covers interval satisfiability of prototype gates under mood-regime
//! constraints, the plan of gate axes to track while sampling, and per-clause
//! bookkeeping that separates "failed the clause threshold" from "vetoed by the
//! prototype's own gate".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{gate_passes, GateConstraint};
use crate::axis::{AxisFamily, AxisInterval};
use crate::context::{ContextBuilder, GateAxes, NormalizedContext};
use crate::expression::{ComparisonOperator, Expression};
use crate::prototype::{PrototypeEvaluation, PrototypeEvaluator};
use crate::registry::PrototypeKind;
use crate::simulation::config::MoodConstraint;
use crate::simulation::tree::{ClauseLeaf, ClauseStats, ClauseTree};

/// Prototype addressed by a variable path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GateTarget {
    /// Prototype id.
    pub prototype_id: String,
    /// Whether the path reads the previous timepoint.
    pub use_previous: bool,
    /// Family.
    pub kind: PrototypeKind,
}

/// Per-sample memo of normalised gate contexts, one slot per timepoint.
///
/// A cache must not outlive the sample it was filled from.
#[derive(Debug, Default)]
pub struct GateContextCache {
    current: Option<GateAxes>,
    previous: Option<GateAxes>,
}

impl GateContextCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether a prototype can pass its gates inside the mood regime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrototypeCompatibility {
    /// False when some gate cannot pass anywhere in the regime.
    pub compatible: bool,
    /// Human-readable explanation when incompatible.
    pub reason: Option<String>,
}

impl PrototypeCompatibility {
    fn ok() -> Self {
        Self {
            compatible: true,
            reason: None,
        }
    }

    fn incompatible(reason: String) -> Self {
        Self {
            compatible: false,
            reason: Some(reason),
        }
    }
}

/// Compatibility of every referenced prototype.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCompatibilityReport {
    /// Emotion prototypes by id.
    pub emotions: BTreeMap<String, PrototypeCompatibility>,
    /// Sexual prototypes by id.
    pub sexual_states: BTreeMap<String, PrototypeCompatibility>,
}

impl GateCompatibilityReport {
    /// True when every referenced prototype is compatible.
    #[must_use]
    pub fn is_fully_compatible(&self) -> bool {
        self.emotions
            .values()
            .chain(self.sexual_states.values())
            .all(|c| c.compatible)
    }
}

/// A gate clamping one tracked axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedGate {
    /// Owning prototype.
    pub prototype_id: String,
    /// Family.
    pub kind: PrototypeKind,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold in normalised units.
    pub threshold: f64,
    /// Threshold in raw axis units.
    pub raw_threshold: Option<f64>,
}

/// Which axes to histogram and which clauses gate on which prototype.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateClampRegimePlan {
    /// Sorted axes appearing in any referenced prototype's gates.
    pub tracked_gate_axes: Vec<String>,
    /// Clause id to the prototype it reads.
    pub clause_gates: BTreeMap<String, GateTarget>,
    /// Gates per tracked axis.
    pub axis_gates: BTreeMap<String, Vec<PlannedGate>>,
}

/// Gate-level reasoning over a registry snapshot.
#[derive(Debug, Clone)]
pub struct GateEvaluator {
    evaluator: Arc<PrototypeEvaluator>,
}

impl GateEvaluator {
    /// Creates a gate evaluator sharing a prototype evaluator.
    #[must_use]
    pub fn new(evaluator: Arc<PrototypeEvaluator>) -> Self {
        Self { evaluator }
    }

    /// AND over every parseable gate. Unparseable gates and gates on axes
    /// missing from `axes` are skipped.
    #[must_use]
    pub fn check_gates(gates: &[String], axes: &GateAxes) -> bool {
        gates
            .iter()
            .filter_map(|g| GateConstraint::parse(g))
            .all(|gate| gate_passes(&gate, axes))
    }

    /// Maps `emotions.<id>`, `previousEmotions.<id>`, `sexualStates.<id>` and
    /// `previousSexualStates.<id>` to a gate target.
    #[must_use]
    pub fn resolve_gate_target(variable_path: &str) -> Option<GateTarget> {
        let (root, id) = variable_path.split_once('.')?;
        let (kind, use_previous) = match root {
            "emotions" => (PrototypeKind::Emotion, false),
            "previousEmotions" => (PrototypeKind::Emotion, true),
            "sexualStates" => (PrototypeKind::Sexual, false),
            "previousSexualStates" => (PrototypeKind::Sexual, true),
            _ => return None,
        };
        if id.is_empty() || id.contains('.') {
            return None;
        }
        Some(GateTarget {
            prototype_id: id.to_string(),
            use_previous,
            kind,
        })
    }

    /// Normalised gate context for a timepoint, computed at most once per cache.
    pub fn resolve_gate_context<'c>(
        cache: &'c mut GateContextCache,
        context: &NormalizedContext,
        use_previous: bool,
    ) -> &'c GateAxes {
        let slot = if use_previous {
            &mut cache.previous
        } else {
            &mut cache.current
        };
        slot.get_or_insert_with(|| ContextBuilder::normalize_gate_context(context, use_previous))
    }

    /// Converts a normalised threshold into raw axis units.
    #[must_use]
    pub fn denormalize_gate_threshold(axis: &str, normalized_threshold: f64) -> Option<f64> {
        AxisFamily::of(axis).map(|family| normalized_threshold * family.scale())
    }

    /// Folds raw-unit mood constraints into normalised intervals per axis.
    #[must_use]
    pub fn build_axis_intervals_from_mood_constraints(constraints: &[MoodConstraint]) -> BTreeMap<String, AxisInterval> {
        let mut intervals: BTreeMap<String, AxisInterval> = BTreeMap::new();
        for constraint in constraints {
            let Some(axis) = constraint.axis() else {
                warn!(var_path = %constraint.var_path, "mood constraint does not address a known axis");
                continue;
            };
            let (Some(default), Some(family)) = (AxisInterval::for_axis(axis), AxisFamily::of(axis)) else {
                warn!(var_path = %constraint.var_path, "mood constraint does not address a known axis");
                continue;
            };
            let threshold = constraint.threshold / family.scale();
            let current = intervals.get(axis).copied().unwrap_or(default);
            intervals.insert(axis.to_string(), current.apply_constraint(constraint.operator, threshold));
        }
        intervals
    }

    /// Checks each gate of a prototype against the known intervals.
    #[must_use]
    pub fn check_prototype_compatibility(
        &self,
        prototype_id: &str,
        kind: PrototypeKind,
        intervals: &BTreeMap<String, AxisInterval>,
    ) -> PrototypeCompatibility {
        let Some(prototype) = self.evaluator.get_prototype(prototype_id, kind) else {
            return PrototypeCompatibility::incompatible(format!("{kind} prototype '{prototype_id}' not found in registry"));
        };
        for raw in &prototype.gates {
            let Some(gate) = GateConstraint::parse(raw) else {
                continue;
            };
            let Some(interval) = intervals.get(&gate.axis) else {
                continue;
            };
            if interval.is_empty() {
                return PrototypeCompatibility::incompatible(format!(
                    "mood regime leaves no feasible value for '{}'",
                    gate.axis
                ));
            }
            if !interval.admits(gate.operator, gate.threshold) {
                return PrototypeCompatibility::incompatible(format!(
                    "gate '{raw}' cannot pass: mood regime constrains {} to {interval}",
                    gate.axis
                ));
            }
        }
        PrototypeCompatibility::ok()
    }

    /// Compatibility report for every prototype the expression references.
    #[must_use]
    pub fn compute_gate_compatibility(&self, expression: &Expression, mood_constraints: &[MoodConstraint]) -> GateCompatibilityReport {
        let intervals = Self::build_axis_intervals_from_mood_constraints(mood_constraints);
        let refs = PrototypeEvaluator::extract_prototype_references(&expression.prerequisites);
        let mut report = GateCompatibilityReport::default();
        for id in &refs.emotions {
            let c = self.check_prototype_compatibility(id, PrototypeKind::Emotion, &intervals);
            report.emotions.insert(id.clone(), c);
        }
        for id in &refs.sexual_states {
            let c = self.check_prototype_compatibility(id, PrototypeKind::Sexual, &intervals);
            report.sexual_states.insert(id.clone(), c);
        }
        report
    }

    /// Derives tracked gate axes and the clause-to-prototype map.
    ///
    /// Uses `tree` when given, otherwise builds one from `expression`.
    #[must_use]
    pub fn build_gate_clamp_regime_plan(&self, expression: &Expression, tree: Option<&ClauseTree>) -> GateClampRegimePlan {
        let built;
        let tree = match tree {
            Some(tree) => tree,
            None => {
                built = ClauseTree::build(expression);
                &built
            }
        };

        let mut plan = GateClampRegimePlan::default();
        let mut tracked = BTreeSet::new();
        let mut seen = BTreeSet::new();

        for (node, leaf) in tree.leaves() {
            let Some(target) = &leaf.gate_target else {
                continue;
            };
            plan.clause_gates.insert(node.clause_id.clone(), target.clone());

            if !seen.insert((target.kind, target.prototype_id.clone())) {
                continue;
            }
            let Some(prototype) = self.evaluator.get_prototype(&target.prototype_id, target.kind) else {
                continue;
            };
            for gate in prototype.gates.iter().filter_map(|g| GateConstraint::parse(g)) {
                tracked.insert(gate.axis.clone());
                plan.axis_gates.entry(gate.axis.clone()).or_default().push(PlannedGate {
                    prototype_id: target.prototype_id.clone(),
                    kind: target.kind,
                    operator: gate.operator,
                    threshold: gate.threshold,
                    raw_threshold: Self::denormalize_gate_threshold(&gate.axis, gate.threshold),
                });
            }
        }

        plan.tracked_gate_axes = tracked.into_iter().collect();
        plan
    }

    /// Records gate bookkeeping for a leaf that reads a prototype.
    ///
    /// `eval_sample` scores the leaf's prototype against the cached gate
    /// context. When the gate fails while the raw value already clears a
    /// lower-bound threshold, the sample is recorded as a pass lost to the gate.
    pub fn record_gate_outcome_if_applicable<F>(
        leaf: &ClauseLeaf,
        stats: &mut ClauseStats,
        context: &NormalizedContext,
        clause_passed: bool,
        in_regime: bool,
        cache: &mut GateContextCache,
        eval_sample: F,
    ) -> Option<PrototypeEvaluation>
    where
        F: FnOnce(&GateTarget, &GateAxes) -> Option<PrototypeEvaluation>,
    {
        let target = leaf.gate_target.as_ref()?;
        let axes = Self::resolve_gate_context(cache, context, target.use_previous);
        let evaluation = eval_sample(target, axes)?;

        stats.record_gate_evaluation(evaluation.gate_pass, clause_passed, in_regime);
        if !evaluation.gate_pass
            && leaf.operator.is_lower_bound()
            && leaf.operator.compare(evaluation.raw_value, leaf.threshold)
        {
            stats.record_lost_pass_in_regime(in_regime);
        }
        Some(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{LogicNode, Prerequisite};
    use crate::prototype::PrototypeEvaluationTarget;
    use crate::registry::{InMemoryPrototypeRegistry, Prototype, PrototypeTable};
    use crate::sampling::RawSample;

    fn evaluator() -> GateEvaluator {
        let registry = InMemoryPrototypeRegistry::with_tables(
            PrototypeTable::from_entries([
                ("fear", Prototype::new([("threat", 1.0)], ["threat >= 0.30"])),
                ("relief", Prototype::new([("threat", -1.0)], ["threat <= 0.20"])),
                (
                    "confidence",
                    Prototype::new([("agency_control", 1.0)], ["threat <= 0.20", "agency_control >= 0.10"]),
                ),
                ("calm", Prototype::new([("valence", 1.0)], [])),
            ]),
            PrototypeTable::from_entries([(
                "lust",
                Prototype::new([("sexual_arousal", 1.0)], ["sexual_arousal >= 0.35"]),
            )]),
        );
        GateEvaluator::new(Arc::new(PrototypeEvaluator::new(&registry)))
    }

    fn expression(leaves: Vec<LogicNode>) -> Expression {
        Expression::new("test", vec![Prerequisite::new(LogicNode::and(leaves))]).unwrap()
    }

    #[test]
    fn check_gates_skips_unparseable_and_missing_axes() {
        let mut axes = GateAxes::default();
        axes.mood_axes.insert("threat", 0.1);
        let gates = vec!["threat <= 0.2".to_string(), "garbage".to_string(), "valence >= 0.9".to_string()];
        assert!(GateEvaluator::check_gates(&gates, &axes));
        assert!(!GateEvaluator::check_gates(&["threat >= 0.2".to_string()], &axes));
        assert!(GateEvaluator::check_gates(&[], &axes));
    }

    #[test]
    fn resolves_gate_targets() {
        let t = GateEvaluator::resolve_gate_target("previousSexualStates.lust").unwrap();
        assert_eq!(t.kind, PrototypeKind::Sexual);
        assert!(t.use_previous);
        assert_eq!(t.prototype_id, "lust");
        assert!(GateEvaluator::resolve_gate_target("moodAxes.threat").is_none());
        assert!(GateEvaluator::resolve_gate_target("emotions").is_none());
        assert!(GateEvaluator::resolve_gate_target("emotions.").is_none());
    }

    #[test]
    fn denormalizes_per_family() {
        assert_eq!(GateEvaluator::denormalize_gate_threshold("threat", 0.3), Some(30.0));
        assert_eq!(GateEvaluator::denormalize_gate_threshold("harm_aversion", 0.5), Some(50.0));
        assert_eq!(GateEvaluator::denormalize_gate_threshold("sexual_arousal", 0.35), Some(0.35));
        assert_eq!(GateEvaluator::denormalize_gate_threshold("bogus", 0.3), None);
    }

    #[test]
    fn intervals_fold_raw_constraints() {
        let intervals = GateEvaluator::build_axis_intervals_from_mood_constraints(&[
            MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gte, 50.0),
            MoodConstraint::new("moodAxes.threat", ComparisonOperator::Lte, 80.0),
            MoodConstraint::new("moodAxes.valence", ComparisonOperator::Lt, -10.0),
        ]);
        assert_eq!(intervals["threat"], AxisInterval::new(0.5, 0.8));
        assert_eq!(intervals["valence"], AxisInterval::with_bounds(-1.0, true, -0.1, false));
    }

    #[test]
    fn strict_regime_bound_on_the_gate_threshold_is_incompatible() {
        let gates = evaluator();
        let expr = expression(vec![
            LogicNode::leaf("emotions.relief", ComparisonOperator::Gte, 0.0),
            LogicNode::leaf("emotions.fear", ComparisonOperator::Gte, 0.0),
        ]);

        let above = gates.compute_gate_compatibility(
            &expr,
            &[MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gt, 20.0)],
        );
        assert!(!above.emotions["relief"].compatible);
        assert!(above.emotions["relief"].reason.as_deref().unwrap().contains("(0.20, 1.00]"));
        assert!(above.emotions["fear"].compatible);

        let below = gates.compute_gate_compatibility(
            &expr,
            &[MoodConstraint::new("moodAxes.threat", ComparisonOperator::Lt, 30.0)],
        );
        assert!(!below.emotions["fear"].compatible);
        assert!(below.emotions["relief"].compatible);

        let closed = gates.compute_gate_compatibility(
            &expr,
            &[MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gte, 20.0)],
        );
        assert!(closed.emotions["relief"].compatible);
    }

    #[test]
    fn compatibility_detects_excluded_gates() {
        let gates = evaluator();
        let expr = expression(vec![
            LogicNode::leaf("emotions.fear", ComparisonOperator::Gte, 0.1),
            LogicNode::leaf("emotions.relief", ComparisonOperator::Gte, 0.5),
            LogicNode::leaf("emotions.calm", ComparisonOperator::Gte, 0.5),
            LogicNode::leaf("emotions.ghost", ComparisonOperator::Gte, 0.5),
        ]);
        let report = gates.compute_gate_compatibility(
            &expr,
            &[MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gte, 50.0)],
        );
        assert!(report.emotions["fear"].compatible);
        assert!(report.emotions["calm"].compatible);
        let relief = &report.emotions["relief"];
        assert!(!relief.compatible);
        assert!(relief.reason.as_deref().unwrap().contains("threat <= 0.20"));
        assert!(!report.emotions["ghost"].compatible);
        assert!(!report.is_fully_compatible());
    }

    #[test]
    fn clamp_plan_tracks_gate_axes_per_clause() {
        let gates = evaluator();
        let expr = expression(vec![
            LogicNode::leaf("emotions.confidence", ComparisonOperator::Gte, 0.2),
            LogicNode::leaf("previousEmotions.confidence", ComparisonOperator::Lte, 0.1),
            LogicNode::leaf("sexualStates.lust", ComparisonOperator::Gte, 0.2),
            LogicNode::leaf("moodAxes.valence", ComparisonOperator::Gte, 0.0),
        ]);
        let plan = gates.build_gate_clamp_regime_plan(&expr, None);
        assert_eq!(plan.tracked_gate_axes, vec!["agency_control", "sexual_arousal", "threat"]);
        assert_eq!(plan.clause_gates.len(), 3);
        assert_eq!(plan.axis_gates["threat"].len(), 1);
        assert_eq!(plan.axis_gates["threat"][0].raw_threshold, Some(20.0));
    }

    #[test]
    fn lost_pass_is_recorded_when_gate_vetoes_a_clearing_value() {
        let gates = evaluator();
        let expr = expression(vec![LogicNode::leaf("emotions.confidence", ComparisonOperator::Gte, 0.3)]);
        let tree = ClauseTree::build(&expr);
        let (_, leaf) = tree.leaves().next().unwrap();
        let target = PrototypeEvaluationTarget::compile(
            "confidence",
            PrototypeKind::Emotion,
            gates.evaluator.get_prototype("confidence", PrototypeKind::Emotion).unwrap(),
        );

        let mut sample = RawSample::default();
        sample.current.set_axis("agency_control", 80.0);
        sample.current.set_axis("threat", 60.0);
        let context = crate::context::ContextBuilder::new(Arc::clone(&gates.evaluator)).build_context(&sample);

        let mut stats = ClauseStats::default();
        let mut cache = GateContextCache::new();
        let eval = GateEvaluator::record_gate_outcome_if_applicable(leaf, &mut stats, &context, false, true, &mut cache, |_, axes| {
            Some(PrototypeEvaluator::evaluate_prototype_sample(&target, axes))
        })
        .unwrap();

        assert!(!eval.gate_pass);
        assert_eq!(stats.gate.gate_fail_count, 1);
        assert_eq!(stats.gate.lost_pass_count, 1);
        assert_eq!(stats.gate.lost_pass_in_regime_count, 1);
    }
}
