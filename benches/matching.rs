//! Benchmarks for complex matching and event throughput.
//!
//! Measures:
//! - `match_complex` on rings of growing size (worst case for the anchor search)
//! - full index builds against incremental events on a bind/unbind system

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sink::complex::get_complexes;
use sink::index::MatchingIndex;
use sink::pattern::{match_complex, PatternComplex};
use sink::{Mixture, Rule, SimulationConfig, SimulationEngine};

/// `A(l!n,r!1),A(l!1,r!2),...` closed into a ring of `n` agents.
fn ring(n: usize) -> String {
    (1..=n)
        .map(|i| {
            let left = if i == 1 { n } else { i - 1 };
            format!("A(l!{},r!{})", left, i)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn bench_match_complex(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_complex");
    for n in [4usize, 16, 64] {
        let mixture = Mixture::from_expression(&ring(n).parse().unwrap()).unwrap();
        let complex = get_complexes(&mixture).unwrap().remove(0);
        let pattern = PatternComplex::from_expression(&ring(n).parse().unwrap()).remove(0);
        let open = PatternComplex::from_expression(&"A(l!1),A(r!1,l!2),A(r!2)".parse().unwrap()).remove(0);

        group.bench_function(BenchmarkId::new("whole_ring", n), |b| {
            b.iter(|| black_box(match_complex(&pattern, &mixture, &complex)))
        });
        group.bench_function(BenchmarkId::new("path_of_three", n), |b| {
            b.iter(|| black_box(match_complex(&open, &mixture, &complex)))
        });
    }
    group.finish();
}

const SYSTEM: &str = "\
%init: 200 A(a,s~u)
%init: 200 B(b)
A(a),B(b) -> A(a!1),B(b!1) [1]
A(a!1),B(b!1) -> A(a),B(b) [1]
A(a!_,s~u) -> A(a!_,s~p) [0.5]
A(s~p) -> A(s~u) [0.5]
";

fn bench_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("events");
    group.sample_size(10); // smaller sample for speed

    group.bench_function("index_build", |b| {
        let engine = SimulationEngine::from_description(SYSTEM, SimulationConfig::default()).unwrap();
        b.iter(|| black_box(MatchingIndex::build(engine.mixture(), engine.rules()).unwrap()))
    });

    group.bench_function("iterate_1000", |b| {
        b.iter_with_setup(
            || {
                let config = SimulationConfig {
                    seed: Some(42),
                    ..SimulationConfig::default()
                };
                SimulationEngine::from_description(SYSTEM, config).unwrap()
            },
            |mut engine| {
                for _ in 0..1000 {
                    engine.iterate().unwrap();
                }
                black_box(engine.time())
            },
        )
    });

    group.bench_function("rule_compile", |b| {
        b.iter(|| black_box("A(a!1,s~u),B(b!1) -> A(a,s~p),B(b) [1]".parse::<Rule>().unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_match_complex, bench_events);
criterion_main!(benches);
