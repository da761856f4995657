//! The sampling loop.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use super::config::{MoodConstraint, SimulationConfig};
use super::population::{
    reservoir_population_id, PopulationHasher, PopulationId, PopulationName, PopulationSummary, StoredContexts, UNCONSTRAINED_REGIME,
};
use super::result::{rate, ClauseFailure, CompoundSummary, ConfidenceInterval, SimulationId, SimulationResult};
use super::tree::{ClauseKind, ClauseStatsArena, ClauseTree};
use crate::context::{ContextBuilder, MoodRegimeAxisHistograms, MoodRegimeSampleReservoir, UnseededVarWarning};
use crate::error::{DiagError, DiagResult};
use crate::expression::{ComparisonOperator, Expression};
use crate::gate::{GateContextCache, GateEvaluator};
use crate::prototype::{PrototypeEvaluationSummary, PrototypeEvaluator};
use crate::registry::{PrototypeKind, PrototypeRegistry};
use crate::sampling::RandomStateGenerator;
use crate::sensitivity::{SensitivityAnalyzer, SensitivityOptions, SensitivityResult};

/// Mixed into the seed of the reservoir RNG so reservoir decisions never
/// consume draws from the sampling stream.
const RESERVOIR_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Label identifying a set of regime constraints.
#[must_use]
pub fn regime_predicate_label(constraints: &[MoodConstraint]) -> String {
    if constraints.is_empty() {
        return UNCONSTRAINED_REGIME.to_string();
    }
    constraints
        .iter()
        .map(MoodConstraint::label)
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Estimates trigger rates of expressions by sampling random states.
///
/// Holds no per-run state; concurrent `simulate()` calls are independent.
#[derive(Clone)]
pub struct MonteCarloSimulator {
    registry: Arc<dyn PrototypeRegistry>,
}

impl std::fmt::Debug for MonteCarloSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonteCarloSimulator").finish_non_exhaustive()
    }
}

impl MonteCarloSimulator {
    /// Creates a simulator over a read-only prototype registry.
    #[must_use]
    pub fn new(registry: Arc<dyn PrototypeRegistry>) -> Self {
        Self { registry }
    }

    /// Registry backing this simulator.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn PrototypeRegistry> {
        &self.registry
    }

    /// Runs one simulation.
    ///
    /// Fails only on invalid configuration. Data problems (unknown paths,
    /// unknown prototypes, malformed gates) are logged and reported on the result.
    pub fn simulate(&self, expression: &Expression, config: &SimulationConfig) -> DiagResult<SimulationResult> {
        config.validate()?;

        let evaluator = Arc::new(PrototypeEvaluator::new(self.registry.as_ref()));
        let builder = ContextBuilder::new(Arc::clone(&evaluator));
        let gates = GateEvaluator::new(Arc::clone(&evaluator));
        let tree = ClauseTree::build(expression);

        let unseeded_var_warnings = Self::collect_unseeded_warnings(expression, &builder);

        let mood_constraints = config.effective_mood_constraints(expression);
        for constraint in &mood_constraints {
            constraint.validate()?;
        }
        let predicate = regime_predicate_label(&mood_constraints);

        let gate_compatibility = gates.compute_gate_compatibility(expression, &mood_constraints);
        let gate_clamp_plan = gates.build_gate_clamp_regime_plan(expression, Some(&tree));

        let tracked_axes: BTreeSet<&str> = gate_clamp_plan
            .tracked_gate_axes
            .iter()
            .map(String::as_str)
            .chain(mood_constraints.iter().filter_map(MoodConstraint::axis))
            .collect();

        let targets = evaluator.prepare_prototype_evaluation_targets(&expression.prerequisites);
        let target_index: BTreeMap<(PrototypeKind, &str), usize> = targets
            .iter()
            .enumerate()
            .map(|(i, t)| ((t.kind, &*t.id), i))
            .collect();
        let mut prototype_summary = PrototypeEvaluationSummary::new(&targets);

        let mut histograms =
            MoodRegimeAxisHistograms::initialize_mood_regime_axis_histograms(tracked_axes.iter().copied());
        let mut reservoir = MoodRegimeSampleReservoir::initialize_mood_regime_sample_reservoir(
            config.mood_regime_sample_reservoir_limit,
            tracked_axes.iter().copied(),
        );

        let seed = config.seed.unwrap_or_else(rand::random);
        let simulation_id = Self::simulation_id(expression, config, seed)?;
        let mut generator = RandomStateGenerator::new(config.distribution, Some(seed))?;
        let mut reservoir_rng = StdRng::seed_from_u64(seed ^ RESERVOIR_SEED_SALT);

        debug!(
            simulation_id = %simulation_id,
            expression_id = %expression.id,
            sample_count = config.sample_count,
            distribution = config.distribution.label(),
            seed,
            regime = %predicate,
            "simulation started"
        );

        let mut stats = ClauseStatsArena::new(&tree);
        let mut outcomes = Vec::with_capacity(tree.nodes().len());
        let mut stored_contexts = StoredContexts::new(
            predicate.clone(),
            Vec::with_capacity(config.stored_context_limit.min(config.sample_count)),
        );
        let mut full_hasher = PopulationHasher::new(UNCONSTRAINED_REGIME);
        let mut regime_hasher = PopulationHasher::new(&predicate);
        let mut trigger_count = 0_u64;
        let mut in_regime_trigger_count = 0_u64;

        for _ in 0..config.sample_count {
            let sample = generator.generate();
            let context = builder.build_context(&sample);
            let in_regime = mood_constraints.iter().all(|c| c.is_satisfied(&context));

            let triggered =
                tree.evaluate_instrumented(&context, &mut stats, in_regime, config.near_miss_epsilon, &mut outcomes);

            let mut cache = GateContextCache::new();
            for (node, leaf) in tree.leaves() {
                let Some(clause_stats) = stats.get_mut(node.id) else {
                    continue;
                };
                GateEvaluator::record_gate_outcome_if_applicable(
                    leaf,
                    clause_stats,
                    &context,
                    outcomes[node.id],
                    in_regime,
                    &mut cache,
                    |target, axes| {
                        target_index
                            .get(&(target.kind, target.prototype_id.as_str()))
                            .map(|&i| PrototypeEvaluator::evaluate_prototype_sample(&targets[i], axes))
                    },
                );
            }

            full_hasher.update_sample(&sample);
            if triggered {
                trigger_count += 1;
            }

            if in_regime {
                if triggered {
                    in_regime_trigger_count += 1;
                }
                regime_hasher.update_sample(&sample);
                histograms.record_mood_regime_axis_histograms(&context);
                reservoir.record_mood_regime_sample_reservoir(&context, &mut reservoir_rng);

                for target in &targets {
                    let axes = GateEvaluator::resolve_gate_context(&mut cache, &context, target.use_previous);
                    let evaluation = PrototypeEvaluator::evaluate_prototype_sample(target, axes);
                    prototype_summary.record_prototype_evaluation(target, &evaluation);
                }

                if stored_contexts.len() < config.stored_context_limit {
                    stored_contexts.push(context);
                }
            }
        }

        prototype_summary.update_prototype_evaluation_summary();

        let sample_count = full_hasher.count();
        let in_regime_sample_count = regime_hasher.count();
        let trigger_rate = rate(trigger_count, sample_count);
        let confidence_interval = ConfidenceInterval::wald(trigger_count, sample_count, config.confidence_level_z);

        let mut clause_failures: Vec<ClauseFailure> = tree
            .leaves()
            .filter_map(|(node, leaf)| {
                let eps = config.near_miss_epsilon.unwrap_or_else(|| leaf.domain.near_miss_epsilon());
                stats.get(node.id).map(|s| ClauseFailure::from_stats(node, leaf, s, eps))
            })
            .collect();
        clause_failures.sort_by(|a, b| {
            b.severity
                .total_cmp(&a.severity)
                .then_with(|| a.clause_id.cmp(&b.clause_id))
        });

        let compound_summaries = tree
            .nodes()
            .iter()
            .filter_map(|node| match &node.kind {
                ClauseKind::Compound { operator, children } => stats.get(node.id).map(|s| CompoundSummary {
                    clause_id: node.clause_id.clone(),
                    operator: *operator,
                    child_count: children.len(),
                    evaluation_count: s.evaluation_count,
                    pass_count: s.pass_count,
                    fail_count: s.fail_count,
                    pass_rate: rate(s.pass_count, s.evaluation_count),
                    last_mile_fail_count: s.last_mile_fail_count,
                }),
                ClauseKind::Leaf(_) => None,
            })
            .collect();

        let population_summary = PopulationSummary {
            full_sample: full_hasher.population_id(PopulationName::FullSample),
            mood_regime: regime_hasher.population_id(PopulationName::MoodRegime),
            stored_global: stored_contexts.is_unfiltered().then(|| stored_contexts.population_id()),
            stored_mood_regime: PopulationId {
                name: PopulationName::StoredMoodRegime,
                ..stored_contexts.population_id()
            },
            mood_regime_reservoir: reservoir_population_id(&reservoir.samples, &predicate),
            mood_regime_predicate: predicate,
            in_regime_sample_count,
            in_regime_rate: rate(in_regime_sample_count, sample_count),
            in_regime_trigger_count,
            in_regime_trigger_rate: rate(in_regime_trigger_count, in_regime_sample_count),
            stored_context_count: stored_contexts.len(),
            stored_context_limit: config.stored_context_limit,
            reservoir_limit: reservoir.limit,
            reservoir_stored_count: reservoir.stored_count(),
        };

        debug!(
            simulation_id = %simulation_id,
            trigger_count,
            trigger_rate,
            in_regime_sample_count,
            full_sample = %population_summary.full_sample,
            mood_regime = %population_summary.mood_regime,
            "simulation finished"
        );

        Ok(SimulationResult {
            simulation_id,
            expression_id: expression.id.clone(),
            seed,
            distribution: config.distribution,
            sample_count,
            trigger_count,
            trigger_rate,
            confidence_interval,
            clause_failures,
            compound_summaries,
            mood_constraints,
            mood_regime_axis_histograms: histograms,
            mood_regime_sample_reservoir: reservoir,
            stored_contexts,
            population_summary,
            gate_compatibility,
            gate_clamp_plan,
            unseeded_var_warnings,
            prototype_evaluation_summary: prototype_summary,
        })
    }

    fn collect_unseeded_warnings(expression: &Expression, builder: &ContextBuilder) -> Vec<UnseededVarWarning> {
        let keys = builder.build_known_context_keys();
        expression
            .variable_paths()
            .into_iter()
            .filter_map(|path| {
                keys.check(path).map(|reason| {
                    warn!(variable_path = %path, reason = %reason, expression_id = %expression.id, "variable path is never seeded");
                    UnseededVarWarning {
                        variable_path: path.to_string(),
                        reason,
                    }
                })
            })
            .collect()
    }

    fn simulation_id(expression: &Expression, config: &SimulationConfig, seed: u64) -> DiagResult<SimulationId> {
        let mut canonical = serde_json::to_vec(&(expression, config))
            .map_err(|e| DiagError::internal(format!("failed to encode simulation inputs: {e}")))?;
        canonical.extend_from_slice(&seed.to_le_bytes());
        Ok(SimulationId::derive(&canonical))
    }

    /// Pass rates of one clause over stored contexts as its threshold varies.
    pub fn compute_threshold_sensitivity(
        stored_contexts: &StoredContexts,
        variable_path: &str,
        operator: ComparisonOperator,
        threshold: f64,
        options: &SensitivityOptions,
    ) -> DiagResult<SensitivityResult> {
        SensitivityAnalyzer::compute_threshold_sensitivity(stored_contexts, variable_path, operator, threshold, options)
    }
}
