//! Gate string parsing.
//!
//! Gates are written `"<axis> <op> <threshold>"` with the threshold in
//! normalised units, e.g. `"threat >= 0.30"`.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expression::ComparisonOperator;

const GATE_PATTERN: &str = r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(>=|<=|==|>|<)\s*(-?(?:\d+(?:\.\d*)?|\.\d+))\s*$";

static GATE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

fn gate_regex() -> Option<&'static Regex> {
    GATE_REGEX.get_or_init(|| Regex::new(GATE_PATTERN).ok()).as_ref()
}

/// A parsed gate: `axis <operator> threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConstraint {
    /// Axis name.
    pub axis: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold in normalised units.
    pub threshold: f64,
}

impl GateConstraint {
    /// Parses a gate string, returning `None` when malformed.
    #[must_use]
    pub fn parse(gate: &str) -> Option<Self> {
        let caps = gate_regex()?.captures(gate)?;
        let axis = caps.get(1)?.as_str().to_string();
        let operator = ComparisonOperator::parse(caps.get(2)?.as_str())?;
        let threshold: f64 = caps.get(3)?.as_str().parse().ok()?;
        threshold.is_finite().then_some(Self {
            axis,
            operator,
            threshold,
        })
    }

    /// Whether `value` satisfies the gate.
    #[must_use]
    pub fn passes(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }
}

impl fmt::Display for GateConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.axis, self.operator, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_gates() {
        let g = GateConstraint::parse("threat >= 0.30").unwrap();
        assert_eq!(g.axis, "threat");
        assert_eq!(g.operator, ComparisonOperator::Gte);
        assert!((g.threshold - 0.30).abs() < 1e-12);

        let g = GateConstraint::parse("  agency_control<-0.1 ").unwrap();
        assert_eq!(g.operator, ComparisonOperator::Lt);
        assert!((g.threshold + 0.1).abs() < 1e-12);

        assert_eq!(GateConstraint::parse("valence == .5").unwrap().threshold, 0.5);
    }

    #[test]
    fn rejects_malformed_gates() {
        for bad in ["", "threat", "threat >=", ">= 0.3", "threat => 0.3", "threat >= abc", "9threat > 1"] {
            assert!(GateConstraint::parse(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn passes_applies_operator() {
        let g = GateConstraint::parse("threat <= 0.20").unwrap();
        assert!(g.passes(0.2));
        assert!(!g.passes(0.21));
    }
}
