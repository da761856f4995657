//! Random psychological-state generation.
//!
//! A [`RawSample`] pairs a `current` and a `previous` snapshot of raw integer
//! axes. Affect traits are fixed per character, so both snapshots share them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::axis::{raw_range, AFFECT_TRAITS, MOOD_AXES, SEXUAL_AXES};
use crate::error::ValidationError;

/// Raw axis values at one timepoint, indexed like the axis catalogues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSnapshot {
    /// Values in [`MOOD_AXES`] order.
    pub mood: [f64; 9],
    /// Values in [`SEXUAL_AXES`] order.
    pub sexual: [f64; 3],
    /// Values in [`AFFECT_TRAITS`] order.
    pub traits: [f64; 3],
}

impl Default for AxisSnapshot {
    fn default() -> Self {
        Self {
            mood: [0.0; 9],
            sexual: [0.0; 3],
            traits: [50.0; 3],
        }
    }
}

impl AxisSnapshot {
    /// Raw value of a mood axis.
    #[must_use]
    pub fn mood_axis(&self, axis: &str) -> Option<f64> {
        MOOD_AXES.iter().position(|a| *a == axis).map(|i| self.mood[i])
    }

    /// Raw value of a sexual axis.
    #[must_use]
    pub fn sexual_axis(&self, axis: &str) -> Option<f64> {
        SEXUAL_AXES.iter().position(|a| *a == axis).map(|i| self.sexual[i])
    }

    /// Raw value of an affect trait.
    #[must_use]
    pub fn trait_axis(&self, axis: &str) -> Option<f64> {
        AFFECT_TRAITS.iter().position(|a| *a == axis).map(|i| self.traits[i])
    }

    /// Raw value of any catalogued raw axis.
    #[must_use]
    pub fn axis(&self, axis: &str) -> Option<f64> {
        self.mood_axis(axis)
            .or_else(|| self.sexual_axis(axis))
            .or_else(|| self.trait_axis(axis))
    }

    /// Sets a raw axis value by name. Returns false for unknown axes.
    pub fn set_axis(&mut self, axis: &str, value: f64) -> bool {
        if let Some(i) = MOOD_AXES.iter().position(|a| *a == axis) {
            self.mood[i] = value;
        } else if let Some(i) = SEXUAL_AXES.iter().position(|a| *a == axis) {
            self.sexual[i] = value;
        } else if let Some(i) = AFFECT_TRAITS.iter().position(|a| *a == axis) {
            self.traits[i] = value;
        } else {
            return false;
        }
        true
    }
}

/// A sampled state: current and previous snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Current timepoint.
    pub current: AxisSnapshot,
    /// Previous timepoint.
    pub previous: AxisSnapshot,
}

/// Distribution used to draw raw axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingDistribution {
    /// Independent uniform integers over each axis' raw range.
    Uniform,

    /// Independent gaussians centred on each range's midpoint, clamped and rounded.
    Gaussian {
        /// Standard deviation as a fraction of the half-range.
        std_dev_fraction: f64,
    },

    /// Previous state uniform; current state is previous plus gaussian drift.
    Correlated {
        /// Drift standard deviation in raw units.
        delta_std_dev: f64,
    },
}

impl Default for SamplingDistribution {
    fn default() -> Self {
        Self::Uniform
    }
}

impl SamplingDistribution {
    /// Validates distribution parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let (name, value) = match self {
            Self::Uniform => return Ok(()),
            Self::Gaussian { std_dev_fraction } => ("std_dev_fraction", *std_dev_fraction),
            Self::Correlated { delta_std_dev } => ("delta_std_dev", *delta_std_dev),
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(ValidationError::InvalidSimulationConfig {
                reason: format!("{name} must be finite and > 0, got {value}"),
            });
        }
        Ok(())
    }

    /// Short label used in population identifiers.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Gaussian { .. } => "gaussian",
            Self::Correlated { .. } => "correlated",
        }
    }
}

/// Seeded generator of [`RawSample`]s.
#[derive(Debug, Clone)]
pub struct RandomStateGenerator {
    distribution: SamplingDistribution,
    rng: StdRng,
}

impl RandomStateGenerator {
    /// Creates a generator. `None` seeds from OS entropy.
    pub fn new(distribution: SamplingDistribution, seed: Option<u64>) -> Result<Self, ValidationError> {
        distribution.validate()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { distribution, rng })
    }

    /// Draws one sample.
    pub fn generate(&mut self) -> RawSample {
        match self.distribution {
            SamplingDistribution::Uniform => {
                let current = self.snapshot(uniform, None);
                let previous = self.snapshot(uniform, Some(&current));
                RawSample { current, previous }
            }
            SamplingDistribution::Gaussian { std_dev_fraction } => {
                let draw = move |rng: &mut StdRng, lo: f64, hi: f64| {
                    let mid = (lo + hi) / 2.0;
                    let sigma = std_dev_fraction * (hi - lo) / 2.0;
                    let z: f64 = rng.sample(StandardNormal);
                    (mid + z * sigma).round().clamp(lo, hi)
                };
                let current = self.snapshot(draw, None);
                let previous = self.snapshot(draw, Some(&current));
                RawSample { current, previous }
            }
            SamplingDistribution::Correlated { delta_std_dev } => {
                let previous = self.snapshot(uniform, None);
                let mut current = previous.clone();
                for (i, axis) in MOOD_AXES.iter().enumerate() {
                    current.mood[i] = self.drift(axis, previous.mood[i], delta_std_dev);
                }
                for (i, axis) in SEXUAL_AXES.iter().enumerate() {
                    current.sexual[i] = self.drift(axis, previous.sexual[i], delta_std_dev);
                }
                RawSample { current, previous }
            }
        }
    }

    fn drift(&mut self, axis: &str, from: f64, sigma: f64) -> f64 {
        let (lo, hi) = raw_range(axis).unwrap_or((-100.0, 100.0));
        let z: f64 = self.rng.sample(StandardNormal);
        (from + z * sigma).round().clamp(lo, hi)
    }

    /// Draws a snapshot; when `traits_from` is given its traits are reused.
    fn snapshot<F>(&mut self, mut draw: F, traits_from: Option<&AxisSnapshot>) -> AxisSnapshot
    where
        F: FnMut(&mut StdRng, f64, f64) -> f64,
    {
        let mut snap = AxisSnapshot::default();
        for (i, axis) in MOOD_AXES.iter().enumerate() {
            let (lo, hi) = raw_range(axis).unwrap_or((-100.0, 100.0));
            snap.mood[i] = draw(&mut self.rng, lo, hi);
        }
        for (i, axis) in SEXUAL_AXES.iter().enumerate() {
            let (lo, hi) = raw_range(axis).unwrap_or((0.0, 100.0));
            snap.sexual[i] = draw(&mut self.rng, lo, hi);
        }
        match traits_from {
            Some(other) => snap.traits = other.traits,
            None => {
                for (i, axis) in AFFECT_TRAITS.iter().enumerate() {
                    let (lo, hi) = raw_range(axis).unwrap_or((0.0, 100.0));
                    snap.traits[i] = draw(&mut self.rng, lo, hi);
                }
            }
        }
        snap
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    rng.gen_range(lo as i64..=hi as i64) as f64
}
