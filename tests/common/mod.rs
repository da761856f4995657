#![allow(dead_code)]

use std::sync::Arc;

use exprdiag::{
    ComparisonOperator, Expression, InMemoryPrototypeRegistry, LogicNode, MonteCarloSimulator, Prerequisite,
    Prototype, PrototypeTable,
};

/// Registry with a handful of gated emotion prototypes and one sexual prototype.
pub fn registry() -> InMemoryPrototypeRegistry {
    InMemoryPrototypeRegistry::with_tables(
        PrototypeTable::from_entries([
            ("fear", Prototype::new([("threat", 1.0)], ["threat >= 0.30"])),
            ("relief", Prototype::new([("valence", 1.0)], ["threat <= 0.20"])),
            (
                "confidence",
                Prototype::new(
                    [("agency_control", 1.0), ("valence", 0.5)],
                    ["threat <= 0.20", "agency_control >= 0.10"],
                ),
            ),
            ("calm", Prototype::new([("valence", 0.5), ("threat", -0.5)], [])),
        ]),
        PrototypeTable::from_entries([(
            "lust",
            Prototype::new([("sex_excitation", 1.0), ("sex_inhibition", -0.5)], ["sexual_arousal >= 0.20"]),
        )]),
    )
}

pub fn simulator() -> MonteCarloSimulator {
    MonteCarloSimulator::new(Arc::new(registry()))
}

pub fn leaf(path: &str, operator: ComparisonOperator, threshold: f64) -> LogicNode {
    LogicNode::leaf(path, operator, threshold)
}

pub fn expression_of(id: &str, leaves: Vec<LogicNode>) -> Expression {
    Expression::new(id, vec![Prerequisite::new(LogicNode::and(leaves))]).unwrap()
}

/// `emotions.fear >= 0.1 AND moodAxes.threat >= 50`.
pub fn fear_under_threat() -> Expression {
    expression_of(
        "fear_under_threat",
        vec![
            leaf("emotions.fear", ComparisonOperator::Gte, 0.1),
            leaf("moodAxes.threat", ComparisonOperator::Gte, 50.0),
        ],
    )
}
