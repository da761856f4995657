//! Materialises [`NormalizedContext`]s from raw samples.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{GateAxes, GateTrace, GateTraces, KnownContextKeys, NormalizedContext, NESTED_ROOT_KEYS, SCALAR_ROOT_KEYS};
use crate::axis::{AFFECT_TRAITS, MOOD_AXES, SEXUAL_AROUSAL_AXIS, SEXUAL_AXES};
use crate::prototype::{PrototypeEvaluationTarget, PrototypeEvaluator};
use crate::registry::PrototypeKind;
use crate::sampling::{AxisSnapshot, RawSample};

/// Builds contexts by scoring every registry prototype at both timepoints.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    evaluator: Arc<PrototypeEvaluator>,
    emotion_targets: Vec<PrototypeEvaluationTarget>,
    sexual_targets: Vec<PrototypeEvaluationTarget>,
}

impl ContextBuilder {
    /// Compiles every prototype in the evaluator's registry snapshot.
    #[must_use]
    pub fn new(evaluator: Arc<PrototypeEvaluator>) -> Self {
        let emotion_targets = evaluator.compile_all(PrototypeKind::Emotion);
        let sexual_targets = evaluator.compile_all(PrototypeKind::Sexual);
        Self {
            evaluator,
            emotion_targets,
            sexual_targets,
        }
    }

    /// Shared prototype evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &Arc<PrototypeEvaluator> {
        &self.evaluator
    }

    /// Compiled targets of one family.
    #[must_use]
    pub fn targets(&self, kind: PrototypeKind) -> &[PrototypeEvaluationTarget] {
        match kind {
            PrototypeKind::Emotion => &self.emotion_targets,
            PrototypeKind::Sexual => &self.sexual_targets,
        }
    }

    /// `clamp((sex_excitation - sex_inhibition + baseline_libido) / 100, 0, 1)`.
    #[must_use]
    pub fn compute_sexual_arousal(snapshot: &AxisSnapshot) -> f64 {
        let [excitation, inhibition, baseline] = snapshot.sexual;
        ((excitation - inhibition + baseline) / 100.0).clamp(0.0, 1.0)
    }

    /// Builds the full context for one sample.
    #[must_use]
    pub fn build_context(&self, sample: &RawSample) -> NormalizedContext {
        let sexual_arousal = Self::compute_sexual_arousal(&sample.current);
        let previous_sexual_arousal = Self::compute_sexual_arousal(&sample.previous);

        let current_axes = Self::gate_axes_for(&sample.current, sexual_arousal);
        let previous_axes = Self::gate_axes_for(&sample.previous, previous_sexual_arousal);

        let mut gate_trace = GateTraces::default();
        let emotions = Self::score_all(&self.emotion_targets, &current_axes, &mut gate_trace.emotions);
        let previous_emotions = Self::score_all(&self.emotion_targets, &previous_axes, &mut gate_trace.previous_emotions);
        let sexual_states = Self::score_all(&self.sexual_targets, &current_axes, &mut gate_trace.sexual_states);
        let previous_sexual_states =
            Self::score_all(&self.sexual_targets, &previous_axes, &mut gate_trace.previous_sexual_states);

        NormalizedContext {
            sample: sample.clone(),
            emotions,
            sexual_states,
            previous_emotions,
            previous_sexual_states,
            sexual_arousal,
            previous_sexual_arousal,
            gate_trace,
        }
    }

    fn score_all(
        targets: &[PrototypeEvaluationTarget],
        axes: &GateAxes,
        traces: &mut BTreeMap<Arc<str>, GateTrace>,
    ) -> BTreeMap<Arc<str>, f64> {
        targets
            .iter()
            .map(|target| {
                let eval = PrototypeEvaluator::evaluate_prototype_sample(target, axes);
                traces.insert(Arc::clone(&target.id), eval.trace());
                (Arc::clone(&target.id), eval.value)
            })
            .collect()
    }

    /// Every key a context can resolve.
    #[must_use]
    pub fn build_known_context_keys(&self) -> KnownContextKeys {
        let mut keys = KnownContextKeys::default();
        keys.top_level.extend(NESTED_ROOT_KEYS);
        keys.top_level.extend(SCALAR_ROOT_KEYS);
        keys.scalar.extend(SCALAR_ROOT_KEYS);

        for kind in [PrototypeKind::Emotion, PrototypeKind::Sexual] {
            let ids: BTreeSet<String> =
                self.evaluator.prototype_ids(kind).map(str::to_string).collect();
            keys.nested.insert(kind.context_key(), ids.clone());
            keys.nested.insert(kind.previous_context_key(), ids);
        }

        let owned = |names: &[&str]| names.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>();
        keys.nested.insert("moodAxes", owned(&MOOD_AXES));
        keys.nested.insert("previousMoodAxes", owned(&MOOD_AXES));
        keys.nested.insert("sexualAxes", owned(&SEXUAL_AXES));
        keys.nested.insert("previousSexualAxes", owned(&SEXUAL_AXES));
        keys.nested.insert("affectTraits", owned(&AFFECT_TRAITS));
        keys
    }

    /// Projects a context onto normalised gate axes for one timepoint.
    #[must_use]
    pub fn normalize_gate_context(context: &NormalizedContext, use_previous: bool) -> GateAxes {
        let arousal = if use_previous {
            context.previous_sexual_arousal
        } else {
            context.sexual_arousal
        };
        Self::gate_axes_for(context.snapshot(use_previous), arousal)
    }

    fn gate_axes_for(snapshot: &AxisSnapshot, sexual_arousal: f64) -> GateAxes {
        let mut axes = GateAxes::default();
        for (axis, raw) in MOOD_AXES.into_iter().zip(snapshot.mood) {
            axes.mood_axes.insert(axis, raw / 100.0);
        }
        for (axis, raw) in SEXUAL_AXES.into_iter().zip(snapshot.sexual) {
            axes.sexual_axes.insert(axis, raw / 100.0);
        }
        axes.sexual_axes.insert(SEXUAL_AROUSAL_AXIS, sexual_arousal);
        for (axis, raw) in AFFECT_TRAITS.into_iter().zip(snapshot.traits) {
            axes.trait_axes.insert(axis, raw / 100.0);
        }
        axes
    }
}
