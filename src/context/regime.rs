//! Mood-regime tracking: per-axis histograms and a bounded sample reservoir.
//!
//! Both structures are owned by one simulation and only see in-regime samples.
//! Values are raw axis units.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;
use tracing::warn;

use super::NormalizedContext;
use crate::axis::{raw_range, AxisFamily};

/// Fixed-width histogram over one axis's raw range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisHistogram {
    /// Axis name.
    pub axis: String,
    /// Lower edge of the first bin.
    pub min: f64,
    /// Upper edge of the last bin (inclusive).
    pub max: f64,
    /// Bin width in raw units.
    pub bin_width: f64,
    /// Counts per bin.
    pub bins: Vec<u64>,
    /// Values recorded.
    pub sample_count: u64,
}

impl AxisHistogram {
    /// Zero-filled histogram for a catalogued axis.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(axis: &str) -> Option<Self> {
        let family = AxisFamily::of(axis)?;
        let (min, max) = raw_range(axis)?;
        let bin_width = family.histogram_bin_width();
        let bin_count = (((max - min) / bin_width).round() as usize).max(1);
        Some(Self {
            axis: axis.to_string(),
            min,
            max,
            bin_width,
            bins: vec![0; bin_count],
            sample_count: 0,
        })
    }

    /// Bin holding `value`. Out-of-range values land in the edge bins.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bin_index(&self, value: f64) -> usize {
        let last = self.bins.len().saturating_sub(1);
        let offset = ((value - self.min) / self.bin_width).floor();
        if offset <= 0.0 {
            0
        } else {
            (offset as usize).min(last)
        }
    }

    /// `[lower, upper)` edges of bin `index`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bin_range(&self, index: usize) -> (f64, f64) {
        let lower = self.min + index as f64 * self.bin_width;
        (lower, (lower + self.bin_width).min(self.max))
    }

    /// Counts one value. Non-finite values are ignored.
    pub fn record(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let idx = self.bin_index(value);
        self.bins[idx] += 1;
        self.sample_count += 1;
    }

    /// Σ bins.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.bins.iter().sum()
    }
}

/// Histograms for every tracked axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoodRegimeAxisHistograms {
    /// Histogram per axis.
    pub axes: BTreeMap<String, AxisHistogram>,
}

impl MoodRegimeAxisHistograms {
    /// Zero-filled bins per tracked axis; unknown axes are logged and skipped.
    #[must_use]
    pub fn initialize_mood_regime_axis_histograms<'a>(axes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out = Self::default();
        for axis in axes {
            match AxisHistogram::new(axis) {
                Some(histogram) => {
                    out.axes.insert(axis.to_string(), histogram);
                }
                None => warn!(axis, "cannot histogram unknown axis"),
            }
        }
        out
    }

    /// Records the current raw value of every tracked axis.
    pub fn record_mood_regime_axis_histograms(&mut self, context: &NormalizedContext) {
        for (axis, histogram) in &mut self.axes {
            if let Some(value) = context.raw_axis_value(axis, false) {
                histogram.record(value);
            }
        }
    }

    /// Histogram of one axis.
    #[must_use]
    pub fn get(&self, axis: &str) -> Option<&AxisHistogram> {
        self.axes.get(axis)
    }
}

/// Uniform random sample (Algorithm R) of in-regime raw axis values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MoodRegimeSampleReservoir {
    /// Capacity.
    pub limit: usize,
    /// Axes captured per entry.
    pub axes: Vec<String>,
    /// In-regime samples offered.
    pub sample_count: u64,
    /// Retained entries, `min(sample_count, limit)` of them.
    pub samples: Vec<BTreeMap<String, f64>>,
}

impl MoodRegimeSampleReservoir {
    /// Empty reservoir over `axes`.
    #[must_use]
    pub fn initialize_mood_regime_sample_reservoir<'a>(limit: usize, axes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            limit,
            axes: axes.into_iter().map(str::to_string).collect(),
            sample_count: 0,
            samples: Vec::with_capacity(limit.min(4096)),
        }
    }

    /// Offers one in-regime context to the reservoir.
    pub fn record_mood_regime_sample_reservoir<R: Rng + ?Sized>(&mut self, context: &NormalizedContext, rng: &mut R) {
        self.sample_count += 1;
        if self.limit == 0 {
            return;
        }
        if self.samples.len() < self.limit {
            let entry = self.entry(context);
            self.samples.push(entry);
            return;
        }
        let slot = rng.gen_range(0..self.sample_count);
        if let Ok(slot) = usize::try_from(slot) {
            if slot < self.limit {
                self.samples[slot] = self.entry(context);
            }
        }
    }

    fn entry(&self, context: &NormalizedContext) -> BTreeMap<String, f64> {
        self.axes
            .iter()
            .filter_map(|axis| context.raw_axis_value(axis, false).map(|v| (axis.clone(), v)))
            .collect()
    }

    /// Entries retained.
    #[must_use]
    pub fn stored_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{GateTraces, NormalizedContext};
    use crate::sampling::RawSample;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn context(threat: f64) -> NormalizedContext {
        let mut sample = RawSample::default();
        sample.current.set_axis("threat", threat);
        NormalizedContext {
            sample,
            emotions: BTreeMap::new(),
            sexual_states: BTreeMap::new(),
            previous_emotions: BTreeMap::new(),
            previous_sexual_states: BTreeMap::new(),
            sexual_arousal: 0.42,
            previous_sexual_arousal: 0.0,
            gate_trace: GateTraces::default(),
        }
    }

    #[test]
    fn histogram_layout_per_family() {
        assert_eq!(AxisHistogram::new("threat").unwrap().bins.len(), 20);
        assert_eq!(AxisHistogram::new("baseline_libido").unwrap().bins.len(), 10);
        assert_eq!(AxisHistogram::new("harm_aversion").unwrap().bins.len(), 10);
        assert_eq!(AxisHistogram::new("sexual_arousal").unwrap().bins.len(), 20);
        assert!(AxisHistogram::new("nonexistent").is_none());
    }

    #[test]
    fn extremes_land_in_edge_bins() {
        let h = AxisHistogram::new("threat").unwrap();
        assert_eq!(h.bin_index(-100.0), 0);
        assert_eq!(h.bin_index(-91.0), 0);
        assert_eq!(h.bin_index(-90.0), 1);
        assert_eq!(h.bin_index(100.0), 19);
        assert_eq!(h.bin_range(19), (90.0, 100.0));
    }

    #[test]
    fn histograms_sum_to_recorded_samples() {
        let mut hs = MoodRegimeAxisHistograms::initialize_mood_regime_axis_histograms(["threat", "sexual_arousal", "bogus"]);
        assert_eq!(hs.axes.len(), 2);
        for t in [-100.0, -5.0, 0.0, 55.0, 100.0] {
            hs.record_mood_regime_axis_histograms(&context(t));
        }
        let threat = hs.get("threat").unwrap();
        assert_eq!(threat.total(), 5);
        assert_eq!(threat.sample_count, 5);
        assert_eq!(threat.bins[19], 1);
        let arousal = hs.get("sexual_arousal").unwrap();
        assert_eq!(arousal.bins[8], 5);
    }

    #[test]
    fn reservoir_keeps_min_of_samples_and_limit() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut small = MoodRegimeSampleReservoir::initialize_mood_regime_sample_reservoir(10, ["threat"]);
        for i in 0..4 {
            small.record_mood_regime_sample_reservoir(&context(f64::from(i)), &mut rng);
        }
        assert_eq!(small.stored_count(), 4);
        assert_eq!(small.samples[3]["threat"], 3.0);

        let mut full = MoodRegimeSampleReservoir::initialize_mood_regime_sample_reservoir(10, ["threat"]);
        for i in 0..500 {
            full.record_mood_regime_sample_reservoir(&context(f64::from(i % 200 - 100)), &mut rng);
        }
        assert_eq!(full.stored_count(), 10);
        assert_eq!(full.sample_count, 500);
    }

    #[test]
    fn zero_limit_reservoir_only_counts() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut r = MoodRegimeSampleReservoir::initialize_mood_regime_sample_reservoir(0, ["threat"]);
        r.record_mood_regime_sample_reservoir(&context(1.0), &mut rng);
        assert_eq!(r.stored_count(), 0);
        assert_eq!(r.sample_count, 1);
    }
}
