//! Axis catalogue and interval algebra.
//!
//! Raw axes are integers sampled in their family's raw range. Gates and
//! prototype weights operate on the normalised value `raw / scale`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expression::ComparisonOperator;

/// The nine mood axes, raw range [-100, 100].
pub const MOOD_AXES: [&str; 9] = [
    "valence",
    "arousal",
    "agency_control",
    "threat",
    "engagement",
    "future_expectancy",
    "self_evaluation",
    "affiliation",
    "inhibitory_control",
];

/// Sexual axes. `sex_excitation`/`sex_inhibition` are [0, 100], `baseline_libido` is [-50, 50].
pub const SEXUAL_AXES: [&str; 3] = ["sex_excitation", "sex_inhibition", "baseline_libido"];

/// Fixed affect traits, raw range [0, 100].
pub const AFFECT_TRAITS: [&str; 3] = ["affective_empathy", "cognitive_empathy", "harm_aversion"];

/// Derived scalar exposed to sexual prototypes, already in [0, 1].
pub const SEXUAL_AROUSAL_AXIS: &str = "sexual_arousal";

/// Family an axis belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisFamily {
    /// The nine mood axes.
    Mood,
    /// Sexual excitation, inhibition and baseline libido.
    Sexual,
    /// Fixed affect traits.
    Trait,
    /// Derived quantities (`sexual_arousal`) that are never divided on normalisation.
    Derived,
}

impl AxisFamily {
    /// Looks up the family of a named axis.
    #[must_use]
    pub fn of(axis: &str) -> Option<Self> {
        if MOOD_AXES.contains(&axis) {
            Some(Self::Mood)
        } else if SEXUAL_AXES.contains(&axis) {
            Some(Self::Sexual)
        } else if AFFECT_TRAITS.contains(&axis) {
            Some(Self::Trait)
        } else if axis == SEXUAL_AROUSAL_AXIS {
            Some(Self::Derived)
        } else {
            None
        }
    }

    /// Divisor mapping a raw value to its normalised value.
    #[must_use]
    pub const fn scale(self) -> f64 {
        match self {
            Self::Mood | Self::Sexual | Self::Trait => 100.0,
            Self::Derived => 1.0,
        }
    }

    /// Whether raw values of this family are integers.
    #[must_use]
    pub const fn is_integer_domain(self) -> bool {
        !matches!(self, Self::Derived)
    }

    /// Histogram bin width in raw units.
    #[must_use]
    pub const fn histogram_bin_width(self) -> f64 {
        match self {
            Self::Mood | Self::Sexual | Self::Trait => 10.0,
            Self::Derived => 0.05,
        }
    }
}

impl fmt::Display for AxisFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mood => write!(f, "mood"),
            Self::Sexual => write!(f, "sexual"),
            Self::Trait => write!(f, "trait"),
            Self::Derived => write!(f, "derived"),
        }
    }
}

/// Raw `(min, max)` of an axis.
#[must_use]
pub fn raw_range(axis: &str) -> Option<(f64, f64)> {
    match AxisFamily::of(axis)? {
        AxisFamily::Mood => Some((-100.0, 100.0)),
        AxisFamily::Sexual if axis == "baseline_libido" => Some((-50.0, 50.0)),
        AxisFamily::Sexual | AxisFamily::Trait => Some((0.0, 100.0)),
        AxisFamily::Derived => Some((0.0, 1.0)),
    }
}

/// Converts a raw value into gate space.
#[must_use]
pub fn normalize_axis_value(axis: &str, raw: f64) -> Option<f64> {
    AxisFamily::of(axis).map(|family| raw / family.scale())
}

/// Feasible range of one normalised axis.
///
/// Values are immutable: every constraint returns a new interval. Each bound
/// is closed or open, so `threat > 0.2` keeps `0.2` out of the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisInterval {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Whether `min` itself is feasible.
    #[serde(default = "closed_bound")]
    pub min_inclusive: bool,
    /// Whether `max` itself is feasible.
    #[serde(default = "closed_bound")]
    pub max_inclusive: bool,
}

const fn closed_bound() -> bool {
    true
}

impl AxisInterval {
    /// The canonical empty interval.
    pub const EMPTY: Self = Self::new(1.0, -1.0);

    /// Creates a closed interval; `min > max` yields an empty interval.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// Creates an interval with explicit bound kinds.
    #[must_use]
    pub const fn with_bounds(min: f64, min_inclusive: bool, max: f64, max_inclusive: bool) -> Self {
        Self {
            min,
            max,
            min_inclusive,
            max_inclusive,
        }
    }

    /// Normalised mood axis range.
    #[must_use]
    pub const fn for_mood_axis() -> Self {
        Self::new(-1.0, 1.0)
    }

    /// Normalised `sex_excitation` / `sex_inhibition` range.
    #[must_use]
    pub const fn for_sexual_axis() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Normalised affect trait range.
    #[must_use]
    pub const fn for_trait_axis() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Range of the derived `sexual_arousal` scalar.
    #[must_use]
    pub const fn for_sexual_arousal() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Default normalised range for a named axis.
    #[must_use]
    pub fn for_axis(axis: &str) -> Option<Self> {
        let family = AxisFamily::of(axis)?;
        let (lo, hi) = raw_range(axis)?;
        Some(Self::new(lo / family.scale(), hi / family.scale()))
    }

    /// True when no value satisfies the interval.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return true;
        }
        !(self.min < self.max || (self.min_inclusive && self.max_inclusive))
    }

    /// `max - min`; negative when empty.
    #[must_use]
    pub fn size(&self) -> f64 {
        self.max - self.min
    }

    /// Whether `value` lies inside.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        let above = if self.min_inclusive { value >= self.min } else { value > self.min };
        let below = if self.max_inclusive { value <= self.max } else { value < self.max };
        above && below
    }

    /// Narrows the interval with `axis <op> threshold`.
    ///
    /// A threshold on the current bound only tightens its kind: `> min`
    /// opens a closed lower bound, `>= min` leaves it as it was.
    #[must_use]
    pub fn apply_constraint(self, operator: ComparisonOperator, threshold: f64) -> Self {
        if self.is_empty() || !threshold.is_finite() {
            return Self::EMPTY;
        }
        let mut next = self;
        match operator {
            ComparisonOperator::Gte if threshold > self.min => {
                next.min = threshold;
                next.min_inclusive = true;
            }
            ComparisonOperator::Gt if threshold >= self.min => {
                next.min = threshold;
                next.min_inclusive = false;
            }
            ComparisonOperator::Lte if threshold < self.max => {
                next.max = threshold;
                next.max_inclusive = true;
            }
            ComparisonOperator::Lt if threshold <= self.max => {
                next.max = threshold;
                next.max_inclusive = false;
            }
            ComparisonOperator::Eq => {
                next = if self.contains(threshold) {
                    Self::new(threshold, threshold)
                } else {
                    Self::EMPTY
                };
            }
            _ => {}
        }
        if next.is_empty() {
            Self::EMPTY
        } else {
            next
        }
    }

    /// Whether some value inside the interval satisfies `value <op> threshold`.
    #[must_use]
    pub fn admits(&self, operator: ComparisonOperator, threshold: f64) -> bool {
        !self.apply_constraint(operator, threshold).is_empty()
    }
}

impl fmt::Display for AxisInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[empty]");
        }
        let open = if self.min_inclusive { '[' } else { '(' };
        let close = if self.max_inclusive { ']' } else { ')' };
        write!(f, "{open}{:.2}, {:.2}{close}", self.min, self.max)
    }
}
