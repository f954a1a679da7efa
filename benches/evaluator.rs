//! Benchmarks for candidate evaluation and batch dispatch.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use gridmix_evolve::{
    compute::{
        build_context,
        evolution::{Dispatcher, FitnessEvaluator, ParallelDispatcher, SequentialDispatcher},
    },
    schema::{ConstraintConfig, CostConfig, ScenarioConfig},
    SimulationContext,
};

fn evaluator(supply: &str, hours: usize) -> FitnessEvaluator<SimulationContext> {
    let scenario = ScenarioConfig {
        supply: supply.to_string(),
        hours,
        ..Default::default()
    };
    let context = build_context(&scenario).unwrap();
    FitnessEvaluator::new(
        context,
        &CostConfig::default(),
        &ConstraintConfig::default(),
    )
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");

    for supply in ["ccgt", "coal-ccgt", "re100", "replacement"] {
        let evaluator = evaluator(supply, 8760);
        let genes = vec![5.0; evaluator.dimension()];

        group.bench_with_input(BenchmarkId::from_parameter(supply), &genes, |b, genes| {
            b.iter(|| evaluator.evaluate(black_box(genes)).unwrap());
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.sample_size(20);

    let evaluator = evaluator("re100", 8760);
    let batch: Vec<Vec<f64>> = (0..16)
        .map(|i| vec![1.0 + i as f64 * 0.5; evaluator.dimension()])
        .collect();
    let evaluate = |genes: &[f64]| evaluator.evaluate(genes);

    let sequential: Box<dyn Dispatcher> = Box::new(SequentialDispatcher::new(true));
    let parallel: Box<dyn Dispatcher> = Box::new(ParallelDispatcher::new(4, true).unwrap());
    let dispatchers = [("sequential", sequential), ("parallel-4", parallel)];

    for (name, dispatcher) in &dispatchers {
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| dispatcher.map(&evaluate, black_box(&batch)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_dispatch);
criterion_main!(benches);
