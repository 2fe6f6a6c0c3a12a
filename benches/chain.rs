use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use fxgraph::chain::{ChainSpec, EffectKind, RoutingMode};
use fxgraph::graph::{EffectNodeRegistry, GraphBuilder};
use fxgraph::params::ParameterStore;

const SAMPLE_RATE: u32 = 48000;
const BUFFER_SIZE: usize = 128;

fn chain_with(enabled: usize, mode: RoutingMode) -> ChainSpec {
    let mut chain = ChainSpec::default();
    for kind in EffectKind::ALL.into_iter().take(enabled) {
        chain.set_enabled(kind, true);
        chain.set_mode(kind, mode);
    }
    chain
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("Graph Build");
    let params = ParameterStore::new();

    for mode in [RoutingMode::Serial, RoutingMode::Parallel] {
        for enabled in [1, 4, EffectKind::ALL.len()] {
            let chain = chain_with(enabled, mode);
            let id = BenchmarkId::new(format!("{mode:?}"), enabled);

            group.bench_with_input(id, &chain, |b, chain| {
                // Nodes are created once; rebuilds only rewire
                let mut registry = EffectNodeRegistry::new(SAMPLE_RATE, BUFFER_SIZE, 1.0);
                let builder = GraphBuilder::default();
                builder.build(chain, &params, &mut registry, BUFFER_SIZE).unwrap();

                b.iter(|| {
                    black_box(
                        builder
                            .build(black_box(chain), &params, &mut registry, BUFFER_SIZE)
                            .unwrap(),
                    );
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_graph_build);
criterion_main!(benches);
