//! # exprdiag - Monte Carlo diagnostics for emotion-trigger expressions
//!
//! An expression is a list of prerequisites over a simulated agent's mood axes,
//! sexual axes, affect traits and the emotion and sexual-state intensities
//! derived from them through weighted, gated prototypes. This crate estimates
//! how often such an expression fires, explains which clauses block it, and
//! sweeps thresholds to show what would change.
//!
//! ## Core Concepts
//!
//! - **Expression**: prerequisites made of JSON-logic trees of comparisons
//! - **Prototype**: weights over normalised axes plus gate constraints
//! - **Mood regime**: the subset of samples satisfying the mood constraints
//! - **ClauseFailure**: per-leaf failure, near-miss and last-mile statistics
//! - **Sensitivity**: pass rates over a grid of candidate thresholds
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use exprdiag::{Expression, InMemoryPrototypeRegistry, MonteCarloSimulator, SimulationConfig};
//!
//! let expression = Expression::from_json(&serde_json::json!({
//!     "id": "panic",
//!     "prerequisites": [{ "logic": { ">=": [{ "var": "emotions.fear" }, 0.6] } }]
//! }))?;
//!
//! let simulator = MonteCarloSimulator::new(Arc::new(InMemoryPrototypeRegistry::new()));
//! let result = simulator.simulate(&expression, &SimulationConfig::seeded(10_000, 7))?;
//! println!("{} ({:?})", result.trigger_rate, result.confidence_interval);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Domain model
pub mod axis;
pub mod error;
pub mod expression;
pub mod registry;
pub mod sampling;

// Evaluation
pub mod context;
pub mod gate;
pub mod prototype;

// Analyses
pub mod invariants;
pub mod sensitivity;
pub mod simulation;

// Execution
pub mod runtime;

pub use axis::{AxisFamily, AxisInterval};
pub use context::{ContextBuilder, NormalizedContext, UnseededVarReason, UnseededVarWarning, VariableDomain};
pub use error::{DiagError, DiagResult, ExecutionError, ValidationError};
pub use expression::{ComparisonOperator, Expression, LogicNode, LogicOperator, Prerequisite};
pub use gate::{GateConstraint, GateEvaluator};
pub use invariants::{DiagnosticFacts, InvariantCheck, InvariantValidator};
pub use prototype::{PrototypeEvaluationSummary, PrototypeEvaluator};
pub use registry::{InMemoryPrototypeRegistry, Prototype, PrototypeKind, PrototypeRegistry, PrototypeTable};
pub use runtime::{RuntimeConfig, SimulationHandle, SimulationRuntime};
pub use sampling::{RandomStateGenerator, RawSample, SamplingDistribution};
pub use sensitivity::{
    GlobalSensitivityResult, SensitivityAnalyzer, SensitivityOptions, SensitivityReport, SensitivityResult,
};
pub use simulation::{
    ClauseFailure, ConfidenceInterval, MonteCarloSimulator, MoodConstraint, PopulationId, PopulationName,
    SimulationConfig, SimulationId, SimulationResult, StoredContexts,
};
