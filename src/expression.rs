//! Expression model: prerequisites built from comparison leaves and `and`/`or` nodes.
//!
//! Expressions arrive as JSON-logic documents (`{"and": [{">=": [{"var": "emotions.fear"}, 0.1]}]}`)
//! and are parsed once into an explicit tree. Evaluation never re-reads the JSON.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Tolerance used by `==` comparisons on derived floating point values.
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Comparison operator of a leaf or a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComparisonOperator {
    /// `>=`
    #[serde(rename = ">=")]
    Gte,
    /// `<=`
    #[serde(rename = "<=")]
    Lte,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `==`, within [`EQUALITY_TOLERANCE`].
    #[serde(rename = "==")]
    Eq,
}

impl ComparisonOperator {
    /// Parses an operator token. `===` is accepted as an alias of `==`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            ">=" => Some(Self::Gte),
            "<=" => Some(Self::Lte),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            "==" | "===" => Some(Self::Eq),
            _ => None,
        }
    }

    /// Canonical token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
        }
    }

    /// Applies the comparison `value <op> threshold`.
    #[must_use]
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => value >= threshold,
            Self::Lte => value <= threshold,
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Eq => (value - threshold).abs() <= EQUALITY_TOLERANCE,
        }
    }

    /// `>=` and `>`: the clause asks for a value at least as large as the threshold.
    #[must_use]
    pub const fn is_lower_bound(self) -> bool {
        matches!(self, Self::Gte | Self::Gt)
    }

    /// `<=` and `<`.
    #[must_use]
    pub const fn is_upper_bound(self) -> bool {
        matches!(self, Self::Lte | Self::Lt)
    }

    /// Operator obtained by swapping the operands (`t <= x` is `x >= t`).
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::Gte => Self::Lte,
            Self::Lte => Self::Gte,
            Self::Gt => Self::Lt,
            Self::Lt => Self::Gt,
            Self::Eq => Self::Eq,
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean combinator of a compound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicOperator {
    /// Every child passes.
    And,
    /// At least one child passes.
    Or,
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// One node of a prerequisite logic tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogicNode {
    /// `and` / `or` over children.
    Compound {
        /// Combinator.
        operator: LogicOperator,
        /// Child nodes, in document order.
        children: Vec<LogicNode>,
    },

    /// `variable_path <operator> threshold`.
    Leaf {
        /// Dotted context path such as `emotions.fear` or `moodAxes.threat`.
        variable_path: String,
        /// Comparison.
        operator: ComparisonOperator,
        /// Threshold in the path's own units.
        threshold: f64,
    },
}

impl LogicNode {
    /// Creates a comparison leaf.
    #[must_use]
    pub fn leaf(variable_path: impl Into<String>, operator: ComparisonOperator, threshold: f64) -> Self {
        Self::Leaf {
            variable_path: variable_path.into(),
            operator,
            threshold,
        }
    }

    /// Creates an `and` node.
    #[must_use]
    pub fn and(children: Vec<LogicNode>) -> Self {
        Self::Compound {
            operator: LogicOperator::And,
            children,
        }
    }

    /// Creates an `or` node.
    #[must_use]
    pub fn or(children: Vec<LogicNode>) -> Self {
        Self::Compound {
            operator: LogicOperator::Or,
            children,
        }
    }

    /// Parses a JSON-logic document.
    ///
    /// Supported shapes: `{"and": [...]}`, `{"or": [...]}` and
    /// `{"<op>": [{"var": "path"}, number]}` (operands may be swapped).
    pub fn from_json_logic(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let obj = value.as_object().ok_or_else(|| invalid("logic node must be an object"))?;
        if obj.len() != 1 {
            return Err(invalid(format!(
                "logic node must have exactly one operator key, found {}",
                obj.len()
            )));
        }
        let Some((key, args)) = obj.iter().next() else {
            return Err(invalid("logic node is empty"));
        };

        match key.as_str() {
            "and" | "or" => {
                let items = args
                    .as_array()
                    .ok_or_else(|| invalid(format!("'{key}' expects an array")))?;
                if items.is_empty() {
                    return Err(invalid(format!("'{key}' must have at least one child")));
                }
                let children = items
                    .iter()
                    .map(Self::from_json_logic)
                    .collect::<Result<Vec<_>, _>>()?;
                let operator = if key == "and" {
                    LogicOperator::And
                } else {
                    LogicOperator::Or
                };
                Ok(Self::Compound { operator, children })
            }
            other => {
                let operator = ComparisonOperator::parse(other)
                    .ok_or_else(|| invalid(format!("unsupported operator '{other}'")))?;
                parse_comparison(operator, args)
            }
        }
    }

    /// Serialises back to JSON-logic.
    #[must_use]
    pub fn to_json_logic(&self) -> serde_json::Value {
        match self {
            Self::Compound { operator, children } => {
                let items: Vec<_> = children.iter().map(Self::to_json_logic).collect();
                serde_json::json!({ operator.to_string(): items })
            }
            Self::Leaf {
                variable_path,
                operator,
                threshold,
            } => serde_json::json!({ operator.as_str(): [{ "var": variable_path }, threshold] }),
        }
    }

    /// Calls `f` for every leaf in depth-first document order.
    pub fn visit_leaves<'a>(&'a self, f: &mut impl FnMut(&'a str, ComparisonOperator, f64)) {
        match self {
            Self::Compound { children, .. } => {
                for child in children {
                    child.visit_leaves(f);
                }
            }
            Self::Leaf {
                variable_path,
                operator,
                threshold,
            } => f(variable_path, *operator, *threshold),
        }
    }
}

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidExpression {
        reason: reason.into(),
    }
}

fn parse_comparison(operator: ComparisonOperator, args: &serde_json::Value) -> Result<LogicNode, ValidationError> {
    let items = args
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| invalid(format!("'{operator}' expects exactly two operands")))?;

    let var_of = |v: &serde_json::Value| v.get("var").and_then(serde_json::Value::as_str).map(str::to_string);

    let (variable_path, threshold, operator) = match (var_of(&items[0]), items[1].as_f64()) {
        (Some(path), Some(t)) => (path, t, operator),
        _ => match (items[0].as_f64(), var_of(&items[1])) {
            (Some(t), Some(path)) => (path, t, operator.flipped()),
            _ => {
                return Err(invalid(format!(
                    "'{operator}' operands must be one {{\"var\": path}} and one number"
                )))
            }
        },
    };

    if variable_path.trim().is_empty() {
        return Err(invalid("variable path must not be empty"));
    }
    if !threshold.is_finite() {
        return Err(invalid(format!("threshold for '{variable_path}' must be finite")));
    }

    Ok(LogicNode::Leaf {
        variable_path,
        operator,
        threshold,
    })
}

/// One prerequisite of an expression. All prerequisites must hold for the expression to fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prerequisite {
    /// Logic tree.
    pub logic: LogicNode,
}

impl Prerequisite {
    /// Wraps a logic tree.
    #[must_use]
    pub fn new(logic: LogicNode) -> Self {
        Self { logic }
    }
}

/// An identified, immutable list of prerequisites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    /// Expression identifier.
    pub id: String,
    /// Prerequisites, in declaration order.
    pub prerequisites: Vec<Prerequisite>,
}

impl Expression {
    /// Creates an expression with validation.
    pub fn new(id: impl Into<String>, prerequisites: Vec<Prerequisite>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "id".to_string(),
            });
        }
        Ok(Self { id, prerequisites })
    }

    /// Parses `{"id": "...", "prerequisites": [{"logic": {...}}, ...]}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ValidationError::MissingField {
                field: "id".to_string(),
            })?;
        let prerequisites = value
            .get("prerequisites")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| ValidationError::MissingField {
                field: "prerequisites".to_string(),
            })?
            .iter()
            .map(|p| {
                let logic = p.get("logic").ok_or_else(|| ValidationError::MissingField {
                    field: "prerequisites[].logic".to_string(),
                })?;
                LogicNode::from_json_logic(logic).map(Prerequisite::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(id, prerequisites)
    }

    /// Every leaf variable path, deduplicated and sorted.
    #[must_use]
    pub fn variable_paths(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        for prereq in &self.prerequisites {
            prereq.logic.visit_leaves(&mut |path, _, _| {
                out.insert(path);
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_json_logic() {
        let doc = json!({
            "and": [
                { ">=": [{ "var": "emotions.fear" }, 0.1] },
                { "or": [
                    { "<": [{ "var": "moodAxes.threat" }, -20] },
                    { "==": [{ "var": "sexualArousal" }, 0.5] }
                ]}
            ]
        });
        let node = LogicNode::from_json_logic(&doc).unwrap();
        let LogicNode::Compound { operator, children } = &node else {
            panic!("expected compound");
        };
        assert_eq!(*operator, LogicOperator::And);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], LogicNode::leaf("emotions.fear", ComparisonOperator::Gte, 0.1));
    }

    #[test]
    fn swapped_operands_flip_the_operator() {
        let node = LogicNode::from_json_logic(&json!({ "<=": [50, { "var": "moodAxes.threat" }] })).unwrap();
        assert_eq!(node, LogicNode::leaf("moodAxes.threat", ComparisonOperator::Gte, 50.0));
    }

    #[test]
    fn rejects_unsupported_shapes() {
        assert!(LogicNode::from_json_logic(&json!({ "!": [true] })).is_err());
        assert!(LogicNode::from_json_logic(&json!({ "and": [] })).is_err());
        assert!(LogicNode::from_json_logic(&json!({ ">=": [{ "var": "a" }] })).is_err());
        assert!(LogicNode::from_json_logic(&json!({ ">=": [1, 2] })).is_err());
        assert!(LogicNode::from_json_logic(&json!([1])).is_err());
    }

    #[test]
    fn json_logic_round_trips_through_to_json() {
        let node = LogicNode::and(vec![
            LogicNode::leaf("emotions.fear", ComparisonOperator::Gte, 0.1),
            LogicNode::leaf("moodAxes.threat", ComparisonOperator::Lt, 10.0),
        ]);
        let back = LogicNode::from_json_logic(&node.to_json_logic()).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn expression_from_json_requires_id_and_prerequisites() {
        assert!(Expression::from_json(&json!({ "prerequisites": [] })).is_err());
        assert!(Expression::from_json(&json!({ "id": "x" })).is_err());

        let expr = Expression::from_json(&json!({
            "id": "test:fear_spike",
            "prerequisites": [
                { "logic": { ">=": [{ "var": "emotions.fear" }, 0.1] } },
                { "logic": { ">=": [{ "var": "moodAxes.threat" }, 50] } }
            ]
        }))
        .unwrap();
        assert_eq!(expr.prerequisites.len(), 2);
        let paths: Vec<_> = expr.variable_paths().into_iter().collect();
        assert_eq!(paths, vec!["emotions.fear", "moodAxes.threat"]);
    }

    #[test]
    fn operator_semantics() {
        assert!(ComparisonOperator::Gte.compare(0.5, 0.5));
        assert!(!ComparisonOperator::Gt.compare(0.5, 0.5));
        assert!(ComparisonOperator::Eq.compare(0.3, 0.1 + 0.2));
        assert!(ComparisonOperator::Gt.is_lower_bound());
        assert!(ComparisonOperator::Lt.is_upper_bound());
        assert_eq!(ComparisonOperator::parse("==="), Some(ComparisonOperator::Eq));
    }
}
