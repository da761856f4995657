mod common;

use common::{expression_of, fear_under_threat, leaf, simulator};
use exprdiag::{
    ComparisonOperator, DiagnosticFacts, Expression, InvariantValidator, MoodConstraint, PrototypeKind,
    SamplingDistribution, SimulationConfig, UnseededVarReason,
};

fn seeded(n: usize) -> SimulationConfig {
    SimulationConfig::seeded(n, 42)
}

fn assert_invariants_hold(result: &exprdiag::SimulationResult) {
    let violations = InvariantValidator::violations(&DiagnosticFacts::from_result(result));
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn gated_prototype_above_its_gate_triggers() {
    let result = simulator().simulate(&fear_under_threat(), &seeded(1000)).unwrap();

    assert_eq!(result.sample_count, 1000);
    assert!(result.trigger_rate > 0.0);
    // threat >= 50 over uniform integers in [-100, 100] is 51/201.
    assert!((0.18..0.33).contains(&result.trigger_rate), "{}", result.trigger_rate);
    assert!(result.confidence_interval.contains(result.trigger_rate));
    assert!(result.unseeded_var_warnings.is_empty());
    assert!(result.gate_compatibility.is_fully_compatible());
    assert_invariants_hold(&result);
}

#[test]
fn gate_contradicting_a_leaf_never_triggers() {
    let expression = expression_of(
        "relief_under_threat",
        vec![
            leaf("emotions.relief", ComparisonOperator::Gte, 0.5),
            leaf("moodAxes.threat", ComparisonOperator::Gte, 50.0),
        ],
    );
    let result = simulator().simulate(&expression, &seeded(1000)).unwrap();

    assert_eq!(result.trigger_count, 0);
    assert_eq!(result.trigger_rate, 0.0);

    let relief = result.clause("prereq0.0").unwrap();
    let gate = relief.gate.unwrap();
    assert!(gate.gate_fail_count > 0);
    assert!(gate.lost_pass_count > 0, "valence >= 50 with threat > 20 should lose passes");
    assert!(gate.threshold_pass_count <= gate.gate_pass_count);
    assert_eq!(gate.gate_pass_count + gate.gate_fail_count, 1000);
    assert_invariants_hold(&result);
}

#[test]
fn gate_outside_forced_axes_never_triggers() {
    let expression = expression_of(
        "confidence_when_helpless",
        vec![
            leaf("emotions.confidence", ComparisonOperator::Gte, 0.1),
            leaf("moodAxes.agency_control", ComparisonOperator::Lte, -50.0),
            leaf("moodAxes.threat", ComparisonOperator::Lte, -50.0),
        ],
    );
    let result = simulator().simulate(&expression, &seeded(2000)).unwrap();
    assert_eq!(result.trigger_count, 0);
    assert_invariants_hold(&result);
}

#[test]
fn mood_regime_reports_incompatible_gates() {
    let expression = expression_of(
        "confidence_only",
        vec![leaf("emotions.confidence", ComparisonOperator::Gte, 0.1)],
    );
    let config = SimulationConfig {
        mood_constraints: vec![
            MoodConstraint::new("moodAxes.agency_control", ComparisonOperator::Lte, -50.0),
            MoodConstraint::new("moodAxes.threat", ComparisonOperator::Lte, -50.0),
        ],
        ..seeded(2000)
    };
    let result = simulator().simulate(&expression, &config).unwrap();

    let compat = &result.gate_compatibility.emotions["confidence"];
    assert!(!compat.compatible);
    assert!(compat.reason.as_deref().unwrap().contains("agency_control"));

    let population = &result.population_summary;
    assert!(population.in_regime_sample_count > 0);
    assert_eq!(population.in_regime_trigger_count, 0);
    assert_eq!(
        population.mood_regime_predicate,
        "moodAxes.agency_control <= -50 && moodAxes.threat <= -50"
    );

    let stats = result
        .prototype_evaluation_summary
        .get(PrototypeKind::Emotion, "confidence")
        .unwrap();
    assert_eq!(stats.mood_sample_count, population.in_regime_sample_count);
    assert_eq!(stats.gate_pass_count, 0);
    assert_invariants_hold(&result);
}

#[test]
fn unknown_nested_key_is_warned_once() {
    let expression = expression_of(
        "typo",
        vec![
            leaf("moodAxes.nonexistent_axis", ComparisonOperator::Gte, 0.0),
            leaf("moodAxes.threat", ComparisonOperator::Gte, 0.0),
        ],
    );
    let result = simulator().simulate(&expression, &seeded(300)).unwrap();

    assert_eq!(result.unseeded_var_warnings.len(), 1);
    let warning = &result.unseeded_var_warnings[0];
    assert_eq!(warning.variable_path, "moodAxes.nonexistent_axis");
    assert_eq!(warning.reason, UnseededVarReason::UnknownNestedKey);

    assert_eq!(result.trigger_count, 0);
    let typo = result.clause("prereq0.0").unwrap();
    assert_eq!(typo.fail_count, 300);
    assert_eq!(typo.average_violation, None);
}

#[test]
fn same_seed_same_result() {
    let a = simulator().simulate(&fear_under_threat(), &seeded(500)).unwrap();
    let b = simulator().simulate(&fear_under_threat(), &seeded(500)).unwrap();

    assert_eq!(a.simulation_id, b.simulation_id);
    assert_eq!(a.trigger_count, b.trigger_count);
    assert_eq!(a.clause_failures, b.clause_failures);
    assert_eq!(a.population_summary, b.population_summary);

    let c = simulator()
        .simulate(&fear_under_threat(), &SimulationConfig::seeded(500, 43))
        .unwrap();
    assert_ne!(a.simulation_id, c.simulation_id);
    assert_ne!(a.population_summary.full_sample.hash, c.population_summary.full_sample.hash);
}

#[test]
fn unseeded_run_reports_a_replayable_seed() {
    let config = SimulationConfig {
        sample_count: 400,
        ..SimulationConfig::default()
    };
    let first = simulator().simulate(&fear_under_threat(), &config).unwrap();
    let replay = simulator()
        .simulate(&fear_under_threat(), &SimulationConfig::seeded(400, first.seed))
        .unwrap();
    assert_eq!(first.trigger_count, replay.trigger_count);
    assert_eq!(
        first.population_summary.full_sample.hash,
        replay.population_summary.full_sample.hash
    );
}

#[test]
fn inferred_regime_fills_histograms_and_reservoir() {
    let config = SimulationConfig {
        infer_mood_constraints: true,
        mood_regime_sample_reservoir_limit: 16,
        ..seeded(1000)
    };
    let result = simulator().simulate(&fear_under_threat(), &config).unwrap();
    let population = &result.population_summary;

    assert_eq!(result.mood_constraints.len(), 1);
    assert_eq!(population.mood_regime_predicate, "moodAxes.threat >= 50");
    // Inside the regime fear is threat/100 >= 0.5, so every sample triggers.
    assert_eq!(population.in_regime_trigger_count, population.in_regime_sample_count);
    assert_eq!(result.trigger_count, population.in_regime_sample_count);

    let threat = result.mood_regime_axis_histograms.get("threat").unwrap();
    assert_eq!(threat.total(), population.in_regime_sample_count);
    let first_in_regime_bin = threat.bin_index(50.0);
    assert!(threat.bins[..first_in_regime_bin].iter().all(|&c| c == 0));

    let reservoir = &result.mood_regime_sample_reservoir;
    assert_eq!(reservoir.sample_count, population.in_regime_sample_count);
    assert_eq!(reservoir.stored_count(), 16);
    assert!(reservoir.samples.iter().all(|s| s["threat"] >= 50.0));

    assert_eq!(result.stored_contexts.len() as u64, population.in_regime_sample_count);
    assert_invariants_hold(&result);
}

#[test]
fn stored_contexts_respect_their_limit() {
    let config = SimulationConfig {
        stored_context_limit: 25,
        ..seeded(400)
    };
    let result = simulator().simulate(&fear_under_threat(), &config).unwrap();
    assert_eq!(result.stored_contexts.len(), 25);
    assert_eq!(result.population_summary.stored_context_count, 25);
    assert_eq!(result.population_summary.stored_global.as_ref().unwrap().sample_count, 25);
}

#[test]
fn clause_failures_are_sorted_by_severity() {
    let expression = expression_of(
        "mixed",
        vec![
            leaf("moodAxes.valence", ComparisonOperator::Gte, 90.0),
            leaf("moodAxes.arousal", ComparisonOperator::Gte, -90.0),
            leaf("emotions.calm", ComparisonOperator::Gte, 0.2),
        ],
    );
    let result = simulator().simulate(&expression, &seeded(1500)).unwrap();
    let severities: Vec<f64> = result.clause_failures.iter().map(|c| c.severity).collect();
    assert!(severities.windows(2).all(|w| w[0] >= w[1]), "{severities:?}");
    assert_eq!(result.clause_failures[0].clause_id, "prereq0.0");
    assert!(result.clause_failures[0].last_mile_fail_count > 0);
}

#[test]
fn or_nodes_get_compound_summaries() {
    let expression = Expression::from_json(&serde_json::json!({
        "id": "either",
        "prerequisites": [
            { "logic": { "or": [
                { ">=": [{ "var": "emotions.fear" }, 0.8] },
                { ">=": [{ "var": "emotions.calm" }, 0.8] }
            ] } },
            { "logic": { "<=": [{ "var": "sexualArousal" }, 1.0] } }
        ]
    }))
    .unwrap();
    let result = simulator().simulate(&expression, &seeded(800)).unwrap();

    let or_node = result
        .compound_summaries
        .iter()
        .find(|c| c.clause_id == "prereq0")
        .unwrap();
    assert_eq!(or_node.child_count, 2);
    assert_eq!(or_node.evaluation_count, 800);
    assert_eq!(or_node.pass_count + or_node.fail_count, 800);
    // The second prerequisite always holds.
    assert_eq!(result.trigger_count, or_node.pass_count);
    assert_invariants_hold(&result);
}

#[test]
fn sexual_prototypes_are_tracked() {
    let expression = expression_of(
        "wanting",
        vec![leaf("sexualStates.lust", ComparisonOperator::Gte, 0.3)],
    );
    let config = SimulationConfig {
        distribution: SamplingDistribution::Gaussian { std_dev_fraction: 0.6 },
        ..seeded(1000)
    };
    let result = simulator().simulate(&expression, &config).unwrap();

    assert!(result.gate_clamp_plan.tracked_gate_axes.contains(&"sexual_arousal".to_string()));
    assert!(result.mood_regime_axis_histograms.get("sexual_arousal").is_some());
    let lust = result
        .prototype_evaluation_summary
        .get(PrototypeKind::Sexual, "lust")
        .unwrap();
    assert_eq!(lust.mood_sample_count, 1000);
    assert!(lust.gate_pass_count > 0 && lust.gate_fail_count > 0);
    assert_invariants_hold(&result);
}

#[test]
fn invalid_config_is_rejected() {
    let err = simulator()
        .simulate(&fear_under_threat(), &SimulationConfig::seeded(0, 1))
        .unwrap_err();
    assert!(err.is_validation());

    let config = SimulationConfig {
        mood_constraints: vec![MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gte, f64::NAN)],
        ..seeded(10)
    };
    assert!(simulator().simulate(&fear_under_threat(), &config).unwrap_err().is_validation());
}

#[test]
fn config_deserializes_from_camel_case() {
    let config: SimulationConfig = serde_json::from_value(serde_json::json!({
        "sampleCount": 250,
        "seed": 9,
        "distribution": { "kind": "correlated", "delta_std_dev": 12.0 },
        "moodConstraints": [{ "varPath": "moodAxes.threat", "operator": ">=", "threshold": 0.0 }]
    }))
    .unwrap();
    assert_eq!(config.sample_count, 250);
    let result = simulator().simulate(&fear_under_threat(), &config).unwrap();
    assert_eq!(result.sample_count, 250);
    assert_eq!(result.population_summary.mood_regime_predicate, "moodAxes.threat >= 0");
}

#[test]
fn strict_regime_bound_on_a_gate_threshold_is_incompatible() {
    let expression = expression_of(
        "relief_above_threat",
        vec![leaf("emotions.relief", ComparisonOperator::Gte, 0.0)],
    );
    let config = SimulationConfig {
        mood_constraints: vec![MoodConstraint::new("moodAxes.threat", ComparisonOperator::Gt, 20.0)],
        ..seeded(3000)
    };
    let result = simulator().simulate(&expression, &config).unwrap();

    let compat = &result.gate_compatibility.emotions["relief"];
    assert!(!compat.compatible, "{compat:?}");
    assert!(compat.reason.as_deref().unwrap().contains("threat <= 0.20"));

    let stats = result
        .prototype_evaluation_summary
        .get(PrototypeKind::Emotion, "relief")
        .unwrap();
    assert!(stats.mood_sample_count > 0);
    assert_eq!(stats.gate_pass_count, 0);
}

#[test]
fn previous_only_prototype_is_summarised_at_the_previous_timepoint() {
    let expression = expression_of(
        "fear_last_turn",
        vec![leaf("previousEmotions.fear", ComparisonOperator::Gte, 0.1)],
    );
    let result = simulator().simulate(&expression, &seeded(1000)).unwrap();

    let stats = result
        .prototype_evaluation_summary
        .get(PrototypeKind::Emotion, "fear")
        .unwrap();
    assert!(stats.previous_timepoint);
    assert_eq!(stats.mood_sample_count, 1000);

    let previous_passes = result
        .stored_contexts
        .iter()
        .filter(|c| c.gate_trace.previous_emotions["fear"].gate_pass)
        .count() as u64;
    assert_eq!(stats.gate_pass_count, previous_passes);

    let mixed = expression_of(
        "fear_both_turns",
        vec![
            leaf("previousEmotions.fear", ComparisonOperator::Gte, 0.1),
            leaf("emotions.fear", ComparisonOperator::Gte, 0.1),
        ],
    );
    let result = simulator().simulate(&mixed, &seeded(500)).unwrap();
    let stats = result
        .prototype_evaluation_summary
        .get(PrototypeKind::Emotion, "fear")
        .unwrap();
    assert!(!stats.previous_timepoint);
    let current_passes = result
        .stored_contexts
        .iter()
        .filter(|c| c.gate_trace.emotions["fear"].gate_pass)
        .count() as u64;
    assert_eq!(stats.gate_pass_count, current_passes);
}
