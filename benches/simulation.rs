use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use exprdiag::{
    ComparisonOperator, Expression, InMemoryPrototypeRegistry, LogicNode, MonteCarloSimulator, Prerequisite,
    Prototype, PrototypeTable, SensitivityAnalyzer, SensitivityOptions, SimulationConfig,
};

fn simulator() -> MonteCarloSimulator {
    let registry = InMemoryPrototypeRegistry::with_tables(
        PrototypeTable::from_entries([
            ("fear", Prototype::new([("threat", 1.0), ("valence", -0.3)], ["threat >= 0.30"])),
            (
                "confidence",
                Prototype::new(
                    [("agency_control", 1.0), ("valence", 0.5)],
                    ["threat <= 0.20", "agency_control >= 0.10"],
                ),
            ),
        ]),
        PrototypeTable::from_entries([(
            "lust",
            Prototype::new([("sex_excitation", 1.0), ("sex_inhibition", -0.5)], ["sexual_arousal >= 0.20"]),
        )]),
    );
    MonteCarloSimulator::new(Arc::new(registry))
}

fn expression() -> Expression {
    Expression::new(
        "bench",
        vec![
            Prerequisite::new(LogicNode::and(vec![
                LogicNode::leaf("emotions.fear", ComparisonOperator::Gte, 0.4),
                LogicNode::leaf("moodAxes.threat", ComparisonOperator::Gte, 30.0),
            ])),
            Prerequisite::new(LogicNode::or(vec![
                LogicNode::leaf("emotions.confidence", ComparisonOperator::Lte, 0.2),
                LogicNode::leaf("sexualStates.lust", ComparisonOperator::Gte, 0.3),
            ])),
        ],
    )
    .unwrap()
}

fn bench_simulate(c: &mut Criterion) {
    let simulator = simulator();
    let expression = expression();

    let mut group = c.benchmark_group("simulate");
    for samples in [1_000_usize, 10_000] {
        let config = SimulationConfig {
            infer_mood_constraints: true,
            ..SimulationConfig::seeded(samples, 7)
        };
        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &config, |b, config| {
            b.iter(|| black_box(simulator.simulate(&expression, config).unwrap()));
        });
    }
    group.finish();
}

fn bench_sensitivity(c: &mut Criterion) {
    let expression = expression();
    let result = simulator()
        .simulate(&expression, &SimulationConfig::seeded(10_000, 7))
        .unwrap();
    let options = SensitivityOptions::default();

    c.bench_function("sensitivity/analyze", |b| {
        b.iter(|| black_box(SensitivityAnalyzer::analyze(&expression, &result, &options)));
    });
}

criterion_group!(simulation, bench_simulate, bench_sensitivity);
criterion_main!(simulation);
