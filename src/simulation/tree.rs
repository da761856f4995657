//! Instrumented clause tree.
//!
//! The logic of every prerequisite is flattened into an arena of
//! [`ClauseNode`]s addressed by [`NodeId`]. Nodes are immutable once built;
//! running counters live in a parallel [`ClauseStatsArena`].
//!
//! Nodes are pushed in pre-order, so every child has a larger id than its
//! parent and a reverse scan visits children before parents.

use serde::Serialize;

use crate::context::{NormalizedContext, VariableDomain};
use crate::expression::{ComparisonOperator, Expression, LogicNode, LogicOperator};
use crate::gate::{GateEvaluator, GateTarget};

/// Index of a node in a [`ClauseTree`].
pub type NodeId = usize;

/// Comparison leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseLeaf {
    /// Dotted context path.
    pub variable_path: String,
    /// Comparison.
    pub operator: ComparisonOperator,
    /// Threshold.
    pub threshold: f64,
    /// Integer (raw axis) or float (derived) comparison.
    pub domain: VariableDomain,
    /// Prototype read by the leaf, for prototype paths.
    pub gate_target: Option<GateTarget>,
}

impl ClauseLeaf {
    /// Pass/fail of the leaf against a context with an optional threshold override.
    /// Unresolved paths fail.
    #[must_use]
    pub fn passes(&self, context: &NormalizedContext, threshold: f64) -> bool {
        context
            .resolve(&self.variable_path)
            .is_some_and(|value| self.operator.compare(value, threshold))
    }

    /// Distance by which `value` misses the threshold; `0` when it passes.
    #[must_use]
    pub fn violation(&self, value: f64) -> f64 {
        if self.operator.compare(value, self.threshold) {
            return 0.0;
        }
        match self.operator {
            ComparisonOperator::Gte | ComparisonOperator::Gt => self.threshold - value,
            ComparisonOperator::Lte | ComparisonOperator::Lt => value - self.threshold,
            ComparisonOperator::Eq => (value - self.threshold).abs(),
        }
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClauseKind {
    /// Comparison leaf.
    Leaf(ClauseLeaf),
    /// `and` / `or` node.
    Compound {
        /// Combinator.
        operator: LogicOperator,
        /// Child ids, in document order.
        children: Vec<NodeId>,
    },
}

/// One node of the flattened tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseNode {
    /// Arena index.
    pub id: NodeId,
    /// Stable textual id: `prereq<i>` followed by `.<child index>` segments.
    pub clause_id: String,
    /// Parent node; `None` for prerequisite roots.
    pub parent: Option<NodeId>,
    /// Owning prerequisite.
    pub prerequisite: usize,
    /// Payload.
    pub kind: ClauseKind,
}

/// Replaces one leaf's threshold during a pure evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdOverride {
    /// Leaf to override.
    pub node: NodeId,
    /// Threshold to use instead.
    pub threshold: f64,
}

/// Flattened prerequisites of one expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClauseTree {
    nodes: Vec<ClauseNode>,
    roots: Vec<NodeId>,
}

impl ClauseTree {
    /// Flattens every prerequisite.
    #[must_use]
    pub fn build(expression: &Expression) -> Self {
        let mut tree = Self::default();
        for (i, prereq) in expression.prerequisites.iter().enumerate() {
            let root = tree.push(&prereq.logic, format!("prereq{i}"), None, i);
            tree.roots.push(root);
        }
        tree
    }

    fn push(&mut self, node: &LogicNode, clause_id: String, parent: Option<NodeId>, prerequisite: usize) -> NodeId {
        let id = self.nodes.len();
        match node {
            LogicNode::Leaf {
                variable_path,
                operator,
                threshold,
            } => {
                self.nodes.push(ClauseNode {
                    id,
                    clause_id,
                    parent,
                    prerequisite,
                    kind: ClauseKind::Leaf(ClauseLeaf {
                        variable_path: variable_path.clone(),
                        operator: *operator,
                        threshold: *threshold,
                        domain: VariableDomain::of(variable_path),
                        gate_target: GateEvaluator::resolve_gate_target(variable_path),
                    }),
                });
            }
            LogicNode::Compound { operator, children } => {
                self.nodes.push(ClauseNode {
                    id,
                    clause_id: clause_id.clone(),
                    parent,
                    prerequisite,
                    kind: ClauseKind::Compound {
                        operator: *operator,
                        children: Vec::with_capacity(children.len()),
                    },
                });
                let child_ids: Vec<NodeId> = children
                    .iter()
                    .enumerate()
                    .map(|(j, child)| self.push(child, format!("{clause_id}.{j}"), Some(id), prerequisite))
                    .collect();
                if let ClauseKind::Compound { children, .. } = &mut self.nodes[id].kind {
                    *children = child_ids;
                }
            }
        }
        id
    }

    /// All nodes, indexed by [`NodeId`].
    #[must_use]
    pub fn nodes(&self) -> &[ClauseNode] {
        &self.nodes
    }

    /// One node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ClauseNode> {
        self.nodes.get(id)
    }

    /// Prerequisite roots.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every leaf with its node, in id order.
    pub fn leaves(&self) -> impl Iterator<Item = (&ClauseNode, &ClauseLeaf)> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            ClauseKind::Leaf(leaf) => Some((node, leaf)),
            ClauseKind::Compound { .. } => None,
        })
    }

    /// Node with the given clause id.
    #[must_use]
    pub fn find_clause(&self, clause_id: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.clause_id == clause_id)
    }

    /// Whether every prerequisite holds. Leaves the tree untouched.
    #[must_use]
    pub fn evaluate(&self, context: &NormalizedContext, threshold_override: Option<ThresholdOverride>) -> bool {
        self.roots
            .iter()
            .all(|&root| self.eval_node(root, context, threshold_override))
    }

    fn eval_node(&self, id: NodeId, context: &NormalizedContext, ov: Option<ThresholdOverride>) -> bool {
        match &self.nodes[id].kind {
            ClauseKind::Leaf(leaf) => {
                let threshold = match ov {
                    Some(o) if o.node == id => o.threshold,
                    _ => leaf.threshold,
                };
                leaf.passes(context, threshold)
            }
            ClauseKind::Compound {
                operator: LogicOperator::And,
                children,
            } => children.iter().all(|&c| self.eval_node(c, context, ov)),
            ClauseKind::Compound {
                operator: LogicOperator::Or,
                children,
            } => children.iter().any(|&c| self.eval_node(c, context, ov)),
        }
    }

    /// Evaluates every node without short-circuiting and updates `stats`.
    ///
    /// `outcomes` is resized to the node count and receives each node's result.
    /// An arena built for a smaller tree is grown to fit. Returns whether every
    /// prerequisite holds.
    pub fn evaluate_instrumented(
        &self,
        context: &NormalizedContext,
        stats: &mut ClauseStatsArena,
        in_regime: bool,
        near_miss_epsilon: Option<f64>,
        outcomes: &mut Vec<bool>,
    ) -> bool {
        outcomes.clear();
        outcomes.resize(self.nodes.len(), false);
        if stats.stats.len() < self.nodes.len() {
            stats.stats.resize(self.nodes.len(), ClauseStats::default());
        }

        for id in (0..self.nodes.len()).rev() {
            let passed = match &self.nodes[id].kind {
                ClauseKind::Leaf(leaf) => {
                    let value = context.resolve(&leaf.variable_path);
                    let passed = value.is_some_and(|v| leaf.operator.compare(v, leaf.threshold));
                    let entry = &mut stats.stats[id];
                    entry.record_outcome(passed, in_regime);
                    if let (false, Some(v)) = (passed, value) {
                        let eps = near_miss_epsilon.unwrap_or_else(|| leaf.domain.near_miss_epsilon());
                        entry.record_violation(leaf.violation(v), eps);
                    }
                    passed
                }
                ClauseKind::Compound { operator, children } => {
                    let (failures, failing) = Self::count_failures(children, outcomes);
                    let passed = match operator {
                        LogicOperator::And => failures == 0,
                        LogicOperator::Or => failures < children.len(),
                    };
                    if let (LogicOperator::And, 1, Some(only)) = (*operator, failures, failing) {
                        stats.stats[only].last_mile_fail_count += 1;
                    }
                    stats.stats[id].record_outcome(passed, in_regime);
                    passed
                }
            };
            outcomes[id] = passed;
        }

        let (failures, failing) = Self::count_failures(&self.roots, outcomes);
        if let (1, Some(only)) = (failures, failing) {
            if self.roots.len() > 1 {
                stats.stats[only].last_mile_fail_count += 1;
            }
        }
        failures == 0
    }

    /// Number of failed nodes among `ids`, and the last one that failed.
    fn count_failures(ids: &[NodeId], outcomes: &[bool]) -> (usize, Option<NodeId>) {
        ids.iter()
            .filter(|&&id| !outcomes[id])
            .fold((0, None), |(n, _), &id| (n + 1, Some(id)))
    }
}

/// Gate bookkeeping for a leaf on a prototype path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateClauseStats {
    /// Samples where the prototype's gates passed.
    pub gate_pass_count: u64,
    /// Samples where some gate failed.
    pub gate_fail_count: u64,
    /// Gate passed and the clause passed.
    pub threshold_pass_count: u64,
    /// Gate failed while the raw value already cleared a lower-bound threshold.
    pub lost_pass_count: u64,
    /// Same, restricted to in-regime samples.
    pub lost_pass_in_regime_count: u64,
    /// In-regime samples with the gate passing.
    pub in_regime_gate_pass_count: u64,
    /// In-regime samples with the gate failing.
    pub in_regime_gate_fail_count: u64,
}

/// Running counters for one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClauseStats {
    /// Evaluations.
    pub evaluation_count: u64,
    /// Passes.
    pub pass_count: u64,
    /// Failures.
    pub fail_count: u64,
    /// Evaluations on in-regime samples.
    pub in_regime_evaluation_count: u64,
    /// Failures on in-regime samples.
    pub in_regime_fail_count: u64,
    /// Σ violation over failures with a resolved value.
    pub violation_sum: f64,
    /// Failures with a resolved value.
    pub violation_count: u64,
    /// Failures within epsilon of the threshold.
    pub near_miss_count: u64,
    /// Failures where every sibling under the enclosing AND passed.
    pub last_mile_fail_count: u64,
    /// Prototype gate counters (prototype leaves only).
    pub gate: GateClauseStats,
}

impl ClauseStats {
    fn record_outcome(&mut self, passed: bool, in_regime: bool) {
        self.evaluation_count += 1;
        if in_regime {
            self.in_regime_evaluation_count += 1;
        }
        if passed {
            self.pass_count += 1;
        } else {
            self.fail_count += 1;
            if in_regime {
                self.in_regime_fail_count += 1;
            }
        }
    }

    fn record_violation(&mut self, violation: f64, epsilon: f64) {
        self.violation_sum += violation;
        self.violation_count += 1;
        if violation <= epsilon {
            self.near_miss_count += 1;
        }
    }

    /// Records one gate outcome for a prototype leaf.
    pub fn record_gate_evaluation(&mut self, gate_pass: bool, clause_passed: bool, in_regime: bool) {
        if gate_pass {
            self.gate.gate_pass_count += 1;
            if clause_passed {
                self.gate.threshold_pass_count += 1;
            }
            if in_regime {
                self.gate.in_regime_gate_pass_count += 1;
            }
        } else {
            self.gate.gate_fail_count += 1;
            if in_regime {
                self.gate.in_regime_gate_fail_count += 1;
            }
        }
    }

    /// Records a pass that the prototype's gate vetoed.
    pub fn record_lost_pass_in_regime(&mut self, in_regime: bool) {
        self.gate.lost_pass_count += 1;
        if in_regime {
            self.gate.lost_pass_in_regime_count += 1;
        }
    }
}

/// Counters for every node of a tree, indexed by [`NodeId`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseStatsArena {
    stats: Vec<ClauseStats>,
}

impl ClauseStatsArena {
    /// Zeroed counters sized to `tree`.
    #[must_use]
    pub fn new(tree: &ClauseTree) -> Self {
        Self {
            stats: vec![ClauseStats::default(); tree.nodes.len()],
        }
    }

    /// Counters of one node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&ClauseStats> {
        self.stats.get(id)
    }

    /// Mutable counters of one node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut ClauseStats> {
        self.stats.get_mut(id)
    }
}
