//! Sample contexts: raw sample plus derived emotion and sexual-state intensities.
//!
//! A [`NormalizedContext`] is what prerequisite leaves are evaluated against.
//! Mood, sexual and trait paths expose raw integer values; prototype paths
//! expose gated intensities in [0, 1].

pub mod builder;
pub mod regime;

pub use builder::ContextBuilder;
pub use regime::{AxisHistogram, MoodRegimeAxisHistograms, MoodRegimeSampleReservoir};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::axis::SEXUAL_AROUSAL_AXIS;
use crate::sampling::{AxisSnapshot, RawSample};

/// Root keys holding nested prototype or axis values.
pub const NESTED_ROOT_KEYS: [&str; 9] = [
    "emotions",
    "sexualStates",
    "previousEmotions",
    "previousSexualStates",
    "moodAxes",
    "previousMoodAxes",
    "sexualAxes",
    "previousSexualAxes",
    "affectTraits",
];

/// Root keys holding a scalar.
pub const SCALAR_ROOT_KEYS: [&str; 2] = ["sexualArousal", "previousSexualArousal"];

/// Normalised axes consumed by gate checks and prototype weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateAxes {
    /// Mood axes in [-1, 1].
    pub mood_axes: BTreeMap<&'static str, f64>,
    /// Sexual axes plus the derived `sexual_arousal`.
    pub sexual_axes: BTreeMap<&'static str, f64>,
    /// Affect traits in [0, 1].
    pub trait_axes: BTreeMap<&'static str, f64>,
}

impl GateAxes {
    /// Looks an axis up in mood, sexual, then trait axes.
    #[must_use]
    pub fn get(&self, axis: &str) -> Option<f64> {
        self.mood_axes
            .get(axis)
            .or_else(|| self.sexual_axes.get(axis))
            .or_else(|| self.trait_axes.get(axis))
            .copied()
    }
}

/// Per-prototype evaluation kept on the context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateTrace {
    /// Unclamped weighted sum.
    pub raw_score: f64,
    /// `raw_score` clamped to [0, 1].
    pub raw_value: f64,
    /// Whether every parseable gate passed.
    pub gate_pass: bool,
}

/// Gate traces for every registry prototype at both timepoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateTraces {
    /// Emotions, current timepoint.
    pub emotions: BTreeMap<Arc<str>, GateTrace>,
    /// Sexual states, current timepoint.
    pub sexual_states: BTreeMap<Arc<str>, GateTrace>,
    /// Emotions, previous timepoint.
    pub previous_emotions: BTreeMap<Arc<str>, GateTrace>,
    /// Sexual states, previous timepoint.
    pub previous_sexual_states: BTreeMap<Arc<str>, GateTrace>,
}

/// A fully materialised sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedContext {
    /// Raw axes the context was built from.
    pub sample: RawSample,
    /// Gated emotion intensities.
    pub emotions: BTreeMap<Arc<str>, f64>,
    /// Gated sexual-state intensities.
    pub sexual_states: BTreeMap<Arc<str>, f64>,
    /// Gated emotion intensities at the previous timepoint.
    pub previous_emotions: BTreeMap<Arc<str>, f64>,
    /// Gated sexual-state intensities at the previous timepoint.
    pub previous_sexual_states: BTreeMap<Arc<str>, f64>,
    /// `clamp((excitation - inhibition + baseline) / 100, 0, 1)`.
    pub sexual_arousal: f64,
    /// Same for the previous timepoint.
    pub previous_sexual_arousal: f64,
    /// Raw score, raw value and gate outcome per prototype.
    pub gate_trace: GateTraces,
}

impl NormalizedContext {
    /// Resolves a dotted variable path to a number.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<f64> {
        let Some((root, key)) = path.split_once('.') else {
            return match path {
                "sexualArousal" => Some(self.sexual_arousal),
                "previousSexualArousal" => Some(self.previous_sexual_arousal),
                _ => None,
            };
        };
        match root {
            "emotions" => self.emotions.get(key).copied(),
            "sexualStates" => self.sexual_states.get(key).copied(),
            "previousEmotions" => self.previous_emotions.get(key).copied(),
            "previousSexualStates" => self.previous_sexual_states.get(key).copied(),
            "moodAxes" => self.sample.current.mood_axis(key),
            "previousMoodAxes" => self.sample.previous.mood_axis(key),
            "sexualAxes" => self.sample.current.sexual_axis(key),
            "previousSexualAxes" => self.sample.previous.sexual_axis(key),
            "affectTraits" => self.sample.current.trait_axis(key),
            _ => None,
        }
    }

    /// Raw value of a catalogued axis (or the derived `sexual_arousal`).
    #[must_use]
    pub fn raw_axis_value(&self, axis: &str, use_previous: bool) -> Option<f64> {
        if axis == SEXUAL_AROUSAL_AXIS {
            return Some(if use_previous {
                self.previous_sexual_arousal
            } else {
                self.sexual_arousal
            });
        }
        self.snapshot(use_previous).axis(axis)
    }

    /// Raw snapshot for a timepoint.
    #[must_use]
    pub const fn snapshot(&self, use_previous: bool) -> &AxisSnapshot {
        if use_previous {
            &self.sample.previous
        } else {
            &self.sample.current
        }
    }
}

/// Whether a variable path compares integers (raw axes) or continuous values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableDomain {
    /// Raw axes, sampled as integers.
    Integer,
    /// Prototype intensities and derived scalars.
    Float,
}

impl VariableDomain {
    /// Classifies a variable path.
    #[must_use]
    pub fn of(path: &str) -> Self {
        let root = path.split_once('.').map_or(path, |(root, _)| root);
        match root {
            "moodAxes" | "previousMoodAxes" | "sexualAxes" | "previousSexualAxes" | "affectTraits" => {
                Self::Integer
            }
            _ => Self::Float,
        }
    }

    /// Threshold grid step used by sensitivity sweeps.
    #[must_use]
    pub const fn default_step(self) -> f64 {
        match self {
            Self::Integer => 1.0,
            Self::Float => 0.05,
        }
    }

    /// Distance below which a failing leaf counts as a near miss.
    #[must_use]
    pub const fn near_miss_epsilon(self) -> f64 {
        match self {
            Self::Integer => 5.0,
            Self::Float => 0.05,
        }
    }
}

/// Why a variable path does not resolve against known context keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnseededVarReason {
    /// The first path segment is not a context key.
    UnknownRootKey,
    /// The root exists but the nested id/axis does not.
    UnknownNestedKey,
    /// A nested root was referenced without a key.
    MissingNestedKey,
    /// A scalar root was given a nested key.
    ScalarHasChildren,
}

impl fmt::Display for UnseededVarReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRootKey => write!(f, "unknown_root_key"),
            Self::UnknownNestedKey => write!(f, "unknown_nested_key"),
            Self::MissingNestedKey => write!(f, "missing_nested_key"),
            Self::ScalarHasChildren => write!(f, "scalar_has_children"),
        }
    }
}

/// Warning raised for a variable path that no sample will ever populate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnseededVarWarning {
    /// Offending path.
    pub variable_path: String,
    /// Classification.
    pub reason: UnseededVarReason,
}

/// Keys a context can resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownContextKeys {
    /// Every root key.
    pub top_level: BTreeSet<&'static str>,
    /// Nested keys per nested root.
    pub nested: BTreeMap<&'static str, BTreeSet<String>>,
    /// Scalar root keys.
    pub scalar: BTreeSet<&'static str>,
}

impl KnownContextKeys {
    /// Classifies `path`; `None` means it resolves.
    #[must_use]
    pub fn check(&self, path: &str) -> Option<UnseededVarReason> {
        let (root, key) = match path.split_once('.') {
            Some((root, key)) => (root, Some(key)),
            None => (path, None),
        };
        if !self.top_level.contains(root) {
            return Some(UnseededVarReason::UnknownRootKey);
        }
        if self.scalar.contains(root) {
            return key.map(|_| UnseededVarReason::ScalarHasChildren);
        }
        let Some(key) = key else {
            return Some(UnseededVarReason::MissingNestedKey);
        };
        let known = self.nested.get(root).is_some_and(|keys| keys.contains(key));
        (!known).then_some(UnseededVarReason::UnknownNestedKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_domain_classification() {
        assert_eq!(VariableDomain::of("moodAxes.threat"), VariableDomain::Integer);
        assert_eq!(VariableDomain::of("affectTraits.harm_aversion"), VariableDomain::Integer);
        assert_eq!(VariableDomain::of("emotions.fear"), VariableDomain::Float);
        assert_eq!(VariableDomain::of("sexualArousal"), VariableDomain::Float);
    }

    #[test]
    fn known_keys_classify_paths() {
        let mut keys = KnownContextKeys::default();
        keys.top_level.extend(["emotions", "moodAxes", "sexualArousal"]);
        keys.scalar.insert("sexualArousal");
        keys.nested.insert("emotions", ["fear".to_string()].into_iter().collect());
        keys.nested.insert("moodAxes", ["threat".to_string()].into_iter().collect());

        assert_eq!(keys.check("emotions.fear"), None);
        assert_eq!(keys.check("sexualArousal"), None);
        assert_eq!(keys.check("moodAxes.nonexistent_axis"), Some(UnseededVarReason::UnknownNestedKey));
        assert_eq!(keys.check("mood.threat"), Some(UnseededVarReason::UnknownRootKey));
        assert_eq!(keys.check("emotions"), Some(UnseededVarReason::MissingNestedKey));
        assert_eq!(keys.check("sexualArousal.x"), Some(UnseededVarReason::ScalarHasChildren));
    }

    #[test]
    fn reason_serializes_snake_case() {
        let json = serde_json::to_string(&UnseededVarReason::UnknownNestedKey).unwrap();
        assert_eq!(json, "\"unknown_nested_key\"");
    }
}
