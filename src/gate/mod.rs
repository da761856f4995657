//! Gate parsing, satisfiability and runtime gate bookkeeping.

pub mod evaluator;
pub mod parse;

pub use evaluator::{
    GateClampRegimePlan, GateCompatibilityReport, GateContextCache, GateEvaluator, GateTarget, PlannedGate,
    PrototypeCompatibility,
};
pub use parse::GateConstraint;

use crate::context::GateAxes;

/// Whether one parsed gate holds. Gates on axes missing from `axes` hold vacuously.
#[must_use]
pub fn gate_passes(gate: &GateConstraint, axes: &GateAxes) -> bool {
    axes.get(&gate.axis).map_or(true, |value| gate.passes(value))
}
