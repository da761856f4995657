//! Read-only prototype registry boundary.
//!
//! The engine never owns prototype data: it asks a caller-supplied
//! [`PrototypeRegistry`] for the emotion and sexual prototype tables and treats
//! the answer as a snapshot. Absence is `None`, never an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Registry category holding lookup tables.
pub const LOOKUP_CATEGORY: &str = "lookups";

/// Lookup id of the emotion prototype table.
pub const EMOTION_PROTOTYPES_LOOKUP: &str = "core:emotion_prototypes";

/// Lookup id of the sexual prototype table.
pub const SEXUAL_PROTOTYPES_LOOKUP: &str = "core:sexual_prototypes";

/// Prototype family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrototypeKind {
    /// `core:emotion_prototypes`.
    Emotion,
    /// `core:sexual_prototypes`.
    Sexual,
}

impl PrototypeKind {
    /// Registry lookup id holding this family's table.
    #[must_use]
    pub const fn lookup_id(self) -> &'static str {
        match self {
            Self::Emotion => EMOTION_PROTOTYPES_LOOKUP,
            Self::Sexual => SEXUAL_PROTOTYPES_LOOKUP,
        }
    }

    /// Context key under which current values of this family live.
    #[must_use]
    pub const fn context_key(self) -> &'static str {
        match self {
            Self::Emotion => "emotions",
            Self::Sexual => "sexualStates",
        }
    }

    /// Context key for the previous timepoint.
    #[must_use]
    pub const fn previous_context_key(self) -> &'static str {
        match self {
            Self::Emotion => "previousEmotions",
            Self::Sexual => "previousSexualStates",
        }
    }
}

impl fmt::Display for PrototypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emotion => write!(f, "emotion"),
            Self::Sexual => write!(f, "sexual"),
        }
    }
}

/// A weighted-sum formula with hard gates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    /// Axis name to signed coefficient.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    /// Gate strings of the form `"<axis> <op> <threshold>"` in normalised units.
    #[serde(default)]
    pub gates: Vec<String>,
}

impl Prototype {
    /// Creates a prototype from `(axis, weight)` pairs and gate strings.
    #[must_use]
    pub fn new<'a>(
        weights: impl IntoIterator<Item = (&'a str, f64)>,
        gates: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            weights: weights.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            gates: gates.into_iter().map(str::to_string).collect(),
        }
    }
}

/// One lookup table: `{entries: {id: prototype}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrototypeTable {
    /// Prototypes by id.
    #[serde(default)]
    pub entries: BTreeMap<String, Prototype>,
}

impl PrototypeTable {
    /// Builds a table from `(id, prototype)` pairs.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Prototype)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Read-only lookup of prototype tables.
///
/// Implementations must be safe to query from several simulations at once.
pub trait PrototypeRegistry: Send + Sync {
    /// Returns the table for `(category, lookup_id)` or `None` when absent.
    fn lookup(&self, category: &str, lookup_id: &str) -> Option<PrototypeTable>;

    /// Convenience: the table for a prototype family.
    fn prototype_table(&self, kind: PrototypeKind) -> Option<PrototypeTable> {
        self.lookup(LOOKUP_CATEGORY, kind.lookup_id())
    }
}

/// Thread-safe in-memory registry for embedded use and tests.
#[derive(Debug, Default)]
pub struct InMemoryPrototypeRegistry {
    tables: RwLock<HashMap<(String, String), PrototypeTable>>,
}

impl InMemoryPrototypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the given emotion and sexual tables.
    #[must_use]
    pub fn with_tables(emotions: PrototypeTable, sexual: PrototypeTable) -> Self {
        let registry = Self::new();
        registry.insert(LOOKUP_CATEGORY, EMOTION_PROTOTYPES_LOOKUP, emotions);
        registry.insert(LOOKUP_CATEGORY, SEXUAL_PROTOTYPES_LOOKUP, sexual);
        registry
    }

    /// Inserts or replaces a table.
    ///
    /// A poisoned lock is recovered: the map only ever holds complete tables.
    pub fn insert(&self, category: &str, lookup_id: &str, table: PrototypeTable) {
        let mut guard = self
            .tables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert((category.to_string(), lookup_id.to_string()), table);
    }
}

impl PrototypeRegistry for InMemoryPrototypeRegistry {
    fn lookup(&self, category: &str, lookup_id: &str) -> Option<PrototypeTable> {
        let guard = self
            .tables
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .get(&(category.to_string(), lookup_id.to_string()))
            .cloned()
    }
}
