//! Population identifiers.
//!
//! Every report-facing statistic names the population it was computed over.
//! A population hash is the first 12 hex characters of a blake3 digest of the
//! population's identifying data.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::NormalizedContext;
use crate::sampling::{AxisSnapshot, RawSample};

/// Predicate label of an unconstrained regime.
pub const UNCONSTRAINED_REGIME: &str = "*";

/// Hex characters kept from a digest.
pub const POPULATION_HASH_LEN: usize = 12;

/// Named sample populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationName {
    /// Every drawn sample.
    FullSample,
    /// Samples satisfying the mood-regime constraints.
    MoodRegime,
    /// Stored contexts of an unconstrained run.
    StoredGlobal,
    /// Stored contexts under the mood-regime predicate.
    StoredMoodRegime,
    /// Entries of the in-regime reservoir.
    MoodRegimeReservoir,
}

impl fmt::Display for PopulationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FullSample => "full_sample",
            Self::MoodRegime => "mood_regime",
            Self::StoredGlobal => "stored_global",
            Self::StoredMoodRegime => "stored_mood_regime",
            Self::MoodRegimeReservoir => "mood_regime_reservoir",
        };
        f.write_str(s)
    }
}

/// Label plus hash of one population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopulationId {
    /// Population kind.
    pub name: PopulationName,
    /// Short digest.
    pub hash: String,
    /// Members.
    pub sample_count: u64,
}

impl fmt::Display for PopulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (n={})", self.name, self.hash, self.sample_count)
    }
}

/// Incremental population digest.
#[derive(Debug, Clone)]
pub struct PopulationHasher {
    hasher: blake3::Hasher,
    count: u64,
}

impl PopulationHasher {
    /// Starts a digest, keyed by a predicate label.
    #[must_use]
    pub fn new(predicate: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"exprdiag.population.v1");
        hasher.update(&(predicate.len() as u64).to_le_bytes());
        hasher.update(predicate.as_bytes());
        Self { hasher, count: 0 }
    }

    fn update_snapshot(&mut self, snapshot: &AxisSnapshot) {
        for value in snapshot.mood.iter().chain(&snapshot.sexual).chain(&snapshot.traits) {
            self.hasher.update(&value.to_bits().to_le_bytes());
        }
    }

    /// Adds one raw sample.
    pub fn update_sample(&mut self, sample: &RawSample) {
        self.update_snapshot(&sample.current);
        self.update_snapshot(&sample.previous);
        self.count += 1;
    }

    /// Members so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Truncated hex digest.
    #[must_use]
    pub fn finish(&self) -> String {
        let hex = self.hasher.finalize().to_hex();
        hex.as_str()[..POPULATION_HASH_LEN].to_string()
    }

    /// Identifier under `name`.
    #[must_use]
    pub fn population_id(&self, name: PopulationName) -> PopulationId {
        PopulationId {
            name,
            hash: self.finish(),
            sample_count: self.count,
        }
    }
}

/// Identifier of a stored-context population under a predicate label.
#[must_use]
pub fn stored_population_id(name: PopulationName, contexts: &[NormalizedContext], predicate: &str) -> PopulationId {
    let mut hasher = PopulationHasher::new(predicate);
    for context in contexts {
        hasher.update_sample(&context.sample);
    }
    hasher.population_id(name)
}

/// Short hash of stored contexts under a predicate label.
#[must_use]
pub fn population_hash(contexts: &[NormalizedContext], predicate: &str) -> String {
    stored_population_id(PopulationName::StoredMoodRegime, contexts, predicate).hash
}

/// Contexts retained by a simulation, tagged with the regime predicate that
/// admitted them.
///
/// The predicate travels with the contexts so every statistic computed over
/// them names the population it actually came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContexts {
    predicate: String,
    contexts: Vec<NormalizedContext>,
}

impl Default for StoredContexts {
    fn default() -> Self {
        Self::unfiltered(Vec::new())
    }
}

impl StoredContexts {
    /// Contexts admitted under `predicate`.
    #[must_use]
    pub fn new(predicate: impl Into<String>, contexts: Vec<NormalizedContext>) -> Self {
        Self {
            predicate: predicate.into(),
            contexts,
        }
    }

    /// Contexts of an unconstrained run.
    #[must_use]
    pub fn unfiltered(contexts: Vec<NormalizedContext>) -> Self {
        Self::new(UNCONSTRAINED_REGIME, contexts)
    }

    pub(crate) fn push(&mut self, context: NormalizedContext) {
        self.contexts.push(context);
    }

    /// Predicate label (`*` when unconstrained).
    #[must_use]
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// True when no regime filtered the contexts.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.predicate == UNCONSTRAINED_REGIME
    }

    /// Retained contexts, in sampling order.
    #[must_use]
    pub fn as_slice(&self) -> &[NormalizedContext] {
        &self.contexts
    }

    /// Iterates the retained contexts.
    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedContext> {
        self.contexts.iter()
    }

    /// Number of retained contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// True when nothing was retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// `stored_global` for an unconstrained run, `stored_mood_regime` otherwise.
    #[must_use]
    pub fn population_name(&self) -> PopulationName {
        if self.is_unfiltered() {
            PopulationName::StoredGlobal
        } else {
            PopulationName::StoredMoodRegime
        }
    }

    /// Identifier of the retained population.
    #[must_use]
    pub fn population_id(&self) -> PopulationId {
        stored_population_id(self.population_name(), &self.contexts, &self.predicate)
    }
}

impl<'a> IntoIterator for &'a StoredContexts {
    type Item = &'a NormalizedContext;
    type IntoIter = std::slice::Iter<'a, NormalizedContext>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Identifier of reservoir entries.
#[must_use]
pub fn reservoir_population_id(entries: &[BTreeMap<String, f64>], predicate: &str) -> PopulationId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"exprdiag.reservoir.v1");
    hasher.update(predicate.as_bytes());
    for entry in entries {
        for (axis, value) in entry {
            hasher.update(axis.as_bytes());
            hasher.update(&value.to_bits().to_le_bytes());
        }
        hasher.update(b";");
    }
    PopulationId {
        name: PopulationName::MoodRegimeReservoir,
        hash: hasher.finalize().to_hex().as_str()[..POPULATION_HASH_LEN].to_string(),
        sample_count: entries.len() as u64,
    }
}

/// Population identifiers and regime counts of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    /// Every drawn sample.
    pub full_sample: PopulationId,
    /// In-regime samples.
    pub mood_regime: PopulationId,
    /// Stored contexts, present only when no regime filtered them.
    pub stored_global: Option<PopulationId>,
    /// Stored contexts under the regime predicate.
    pub stored_mood_regime: PopulationId,
    /// Reservoir entries.
    pub mood_regime_reservoir: PopulationId,
    /// Label of the regime predicate (`*` when unconstrained).
    pub mood_regime_predicate: String,
    /// In-regime samples.
    pub in_regime_sample_count: u64,
    /// `in_regime_sample_count / sample_count`.
    pub in_regime_rate: f64,
    /// Triggers among in-regime samples.
    pub in_regime_trigger_count: u64,
    /// `in_regime_trigger_count / in_regime_sample_count`, `0` when empty.
    pub in_regime_trigger_rate: f64,
    /// Contexts retained.
    pub stored_context_count: usize,
    /// Cap on retained contexts.
    pub stored_context_limit: usize,
    /// Reservoir capacity.
    pub reservoir_limit: usize,
    /// Reservoir entries retained.
    pub reservoir_stored_count: usize,
}

impl PopulationSummary {
    /// Identifier by name; `None` for a population the run did not keep.
    #[must_use]
    pub fn get(&self, name: PopulationName) -> Option<&PopulationId> {
        match name {
            PopulationName::FullSample => Some(&self.full_sample),
            PopulationName::MoodRegime => Some(&self.mood_regime),
            PopulationName::StoredGlobal => self.stored_global.as_ref(),
            PopulationName::StoredMoodRegime => Some(&self.stored_mood_regime),
            PopulationName::MoodRegimeReservoir => Some(&self.mood_regime_reservoir),
        }
    }
}
