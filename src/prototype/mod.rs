//! Prototype scoring.
//!
//! A prototype's intensity is its weighted axis sum clamped to [0, 1], snapped
//! to exactly `0` whenever any of its gates fails. Delta expressions rely on the
//! resulting discontinuity at gate boundaries, so the snap is never softened.

pub mod summary;

pub use summary::{PrototypeEvaluationStats, PrototypeEvaluationSummary};

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::context::{GateAxes, GateTrace};
use crate::expression::Prerequisite;
use crate::gate::{gate_passes, GateConstraint, GateEvaluator};
use crate::registry::{Prototype, PrototypeKind, PrototypeRegistry, PrototypeTable};

/// Prototype ids referenced by an expression, per family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrototypeReferences {
    /// Ids referenced through `emotions.*` or `previousEmotions.*`.
    pub emotions: BTreeSet<String>,
    /// Ids referenced through `sexualStates.*` or `previousSexualStates.*`.
    pub sexual_states: BTreeSet<String>,
    /// Ids read at the current timepoint, per family.
    pub current: BTreeSet<(PrototypeKind, String)>,
}

impl PrototypeReferences {
    /// Ids of one family.
    #[must_use]
    pub const fn of_kind(&self, kind: PrototypeKind) -> &BTreeSet<String> {
        match kind {
            PrototypeKind::Emotion => &self.emotions,
            PrototypeKind::Sexual => &self.sexual_states,
        }
    }

    /// True when every reference to `id` reads the previous timepoint.
    #[must_use]
    pub fn previous_only(&self, kind: PrototypeKind, id: &str) -> bool {
        self.of_kind(kind).contains(id) && !self.current.contains(&(kind, id.to_string()))
    }

    /// True when the expression references no prototype.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emotions.is_empty() && self.sexual_states.is_empty()
    }
}

/// A prototype compiled for repeated evaluation: gates parsed once.
#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeEvaluationTarget {
    /// Prototype id.
    pub id: Arc<str>,
    /// Family.
    pub kind: PrototypeKind,
    /// `(axis, weight)` pairs.
    pub weights: Vec<(String, f64)>,
    /// Parsed gates.
    pub gates: Vec<GateConstraint>,
    /// Source text of each parsed gate, parallel to `gates`.
    pub gate_strings: Vec<String>,
    /// Gate strings that failed to parse and are ignored.
    pub skipped_gates: Vec<String>,
    /// Scored against the previous timepoint's axes.
    pub use_previous: bool,
}

impl PrototypeEvaluationTarget {
    /// Compiles a registry prototype. Malformed gates are logged and skipped.
    #[must_use]
    pub fn compile(id: &str, kind: PrototypeKind, prototype: &Prototype) -> Self {
        let mut gates = Vec::with_capacity(prototype.gates.len());
        let mut gate_strings = Vec::with_capacity(prototype.gates.len());
        let mut skipped_gates = Vec::new();
        for raw in &prototype.gates {
            match GateConstraint::parse(raw) {
                Some(gate) => {
                    gates.push(gate);
                    gate_strings.push(raw.clone());
                }
                None => {
                    warn!(prototype_id = %id, kind = %kind, gate = %raw, "skipping unparseable gate");
                    skipped_gates.push(raw.clone());
                }
            }
        }
        Self {
            id: Arc::from(id),
            kind,
            weights: prototype.weights.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            gates,
            gate_strings,
            skipped_gates,
            use_previous: false,
        }
    }

    /// Same target, scored against the previous timepoint.
    #[must_use]
    pub fn at_previous_timepoint(mut self) -> Self {
        self.use_previous = true;
        self
    }
}

/// Outcome of scoring one prototype against one set of axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrototypeEvaluation {
    /// `Σ weight · axis`.
    pub raw_score: f64,
    /// `raw_score` clamped to [0, 1].
    pub raw_value: f64,
    /// All gates passed.
    pub gate_pass: bool,
    /// Indices into the target's `gates` that failed.
    pub failed_gates: Vec<usize>,
    /// `raw_value` when gated through, else exactly `0`.
    pub value: f64,
}

impl PrototypeEvaluation {
    /// Compact trace stored on contexts.
    #[must_use]
    pub const fn trace(&self) -> GateTrace {
        GateTrace {
            raw_score: self.raw_score,
            raw_value: self.raw_value,
            gate_pass: self.gate_pass,
        }
    }
}

/// Scores prototypes from a registry snapshot.
#[derive(Debug, Clone, Default)]
pub struct PrototypeEvaluator {
    emotions: PrototypeTable,
    sexual: PrototypeTable,
}

impl PrototypeEvaluator {
    /// Snapshots the emotion and sexual tables. A missing table is logged and treated as empty.
    pub fn new(registry: &dyn PrototypeRegistry) -> Self {
        let table = |kind: PrototypeKind| {
            registry.prototype_table(kind).unwrap_or_else(|| {
                warn!(lookup = kind.lookup_id(), "prototype table missing from registry");
                PrototypeTable::default()
            })
        };
        Self {
            emotions: table(PrototypeKind::Emotion),
            sexual: table(PrototypeKind::Sexual),
        }
    }

    fn table(&self, kind: PrototypeKind) -> &PrototypeTable {
        match kind {
            PrototypeKind::Emotion => &self.emotions,
            PrototypeKind::Sexual => &self.sexual,
        }
    }

    /// Registry prototype, or `None` when absent.
    #[must_use]
    pub fn get_prototype(&self, id: &str, kind: PrototypeKind) -> Option<&Prototype> {
        self.table(kind).entries.get(id)
    }

    /// Every id of a family, sorted.
    pub fn prototype_ids(&self, kind: PrototypeKind) -> impl Iterator<Item = &str> {
        self.table(kind).entries.keys().map(String::as_str)
    }

    /// Compiles every prototype of a family.
    #[must_use]
    pub fn compile_all(&self, kind: PrototypeKind) -> Vec<PrototypeEvaluationTarget> {
        self.table(kind)
            .entries
            .iter()
            .map(|(id, p)| PrototypeEvaluationTarget::compile(id, kind, p))
            .collect()
    }

    /// Collects prototype ids referenced anywhere in the prerequisites.
    #[must_use]
    pub fn extract_prototype_references(prerequisites: &[Prerequisite]) -> PrototypeReferences {
        let mut refs = PrototypeReferences::default();
        for prereq in prerequisites {
            prereq.logic.visit_leaves(&mut |path, _, _| {
                if let Some(target) = GateEvaluator::resolve_gate_target(path) {
                    if !target.use_previous {
                        refs.current.insert((target.kind, target.prototype_id.clone()));
                    }
                    match target.kind {
                        PrototypeKind::Emotion => refs.emotions.insert(target.prototype_id),
                        PrototypeKind::Sexual => refs.sexual_states.insert(target.prototype_id),
                    };
                }
            });
        }
        refs
    }

    /// Compiles every referenced prototype. Unknown ids are logged and dropped.
    ///
    /// A prototype the expression reads only through `previous*` paths is
    /// scored against the previous timepoint.
    #[must_use]
    pub fn prepare_prototype_evaluation_targets(&self, prerequisites: &[Prerequisite]) -> Vec<PrototypeEvaluationTarget> {
        let refs = Self::extract_prototype_references(prerequisites);
        let mut targets = Vec::new();
        for kind in [PrototypeKind::Emotion, PrototypeKind::Sexual] {
            for id in refs.of_kind(kind) {
                match self.get_prototype(id, kind) {
                    Some(prototype) => {
                        let target = PrototypeEvaluationTarget::compile(id, kind, prototype);
                        targets.push(if refs.previous_only(kind, id) {
                            target.at_previous_timepoint()
                        } else {
                            target
                        });
                    }
                    None => warn!(prototype_id = %id, kind = %kind, "referenced prototype not found in registry"),
                }
            }
        }
        targets
    }

    /// Scores `target` against normalised axes.
    ///
    /// Weights on axes absent from `axes` contribute nothing; gates on absent
    /// axes are vacuously satisfied.
    #[must_use]
    pub fn evaluate_prototype_sample(target: &PrototypeEvaluationTarget, axes: &GateAxes) -> PrototypeEvaluation {
        let raw_score: f64 = target
            .weights
            .iter()
            .filter_map(|(axis, weight)| axes.get(axis).map(|v| weight * v))
            .sum();
        let raw_value = raw_score.clamp(0.0, 1.0);

        let failed_gates: Vec<usize> = target
            .gates
            .iter()
            .enumerate()
            .filter(|(_, gate)| !gate_passes(gate, axes))
            .map(|(i, _)| i)
            .collect();
        let gate_pass = failed_gates.is_empty();

        PrototypeEvaluation {
            raw_score,
            raw_value,
            gate_pass,
            failed_gates,
            value: if gate_pass { raw_value } else { 0.0 },
        }
    }
}
