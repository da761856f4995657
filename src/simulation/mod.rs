//! Monte Carlo simulation of expression trigger rates.
//!
//! Each `simulate()` call owns all of its mutable state (clause counters,
//! histograms, reservoir, stored contexts) and returns it by value inside a
//! [`SimulationResult`]. Identical seed and config yield an identical result.

pub mod config;
pub mod population;
pub mod result;
pub mod simulator;
pub mod tree;

pub use config::{infer_mood_constraints, MoodConstraint, SimulationConfig};
pub use population::{
    PopulationHasher, PopulationId, PopulationName, PopulationSummary, StoredContexts, UNCONSTRAINED_REGIME,
};
pub use result::{ClauseFailure, CompoundSummary, ConfidenceInterval, SimulationId, SimulationResult};
pub use simulator::{regime_predicate_label, MonteCarloSimulator};
pub use tree::{ClauseKind, ClauseLeaf, ClauseNode, ClauseStats, ClauseStatsArena, ClauseTree, NodeId};
