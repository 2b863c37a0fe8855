//! Collapse strategy and messaging bus benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use qarma_register::collapse::MultiDimCriteria;
use qarma_register::{
    BusConfig, CollapseStrategy, MessageBus, MessageType, QuantumRegister, BROADCAST,
};

fn executed_register(count: usize) -> QuantumRegister<i64> {
    let mut reg = QuantumRegister::new(count).expect("register");
    for i in 0..count {
        let value = ((i * 7919) % 1000) as i64;
        reg.qubit_init(
            i,
            move |out: &mut i64| {
                *out = value;
                Ok(())
            },
            0,
            8,
        )
        .expect("qubit");
    }
    reg.set_wait_all(false);
    reg.set_evaluate(|v: &i64| *v as i32);
    reg.set_combine(|results: &[&i64], out: &mut i64| *out = results.iter().copied().sum());
    reg.set_multidim(MultiDimCriteria {
        quality: Some(Arc::new(|v: &i64| *v as i32)),
        speed: Some(Arc::new(|v: &i64| 1000 - *v as i32)),
        resource: None,
        quality_weight: 70,
        speed_weight: 30,
        resource_weight: 0,
    });
    reg.set_temporal(count, 30).expect("temporal");
    reg.set_ensemble(&[
        (CollapseStrategy::Best, 50),
        (CollapseStrategy::MultiDim, 30),
        (CollapseStrategy::LastWins, 20),
    ])
    .expect("ensemble");
    reg.execute().expect("execute");
    reg
}

fn bench_collapse_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("collapse");

    let strategies = [
        CollapseStrategy::FirstWins,
        CollapseStrategy::Best,
        CollapseStrategy::Combine,
        CollapseStrategy::Fuzzy,
        CollapseStrategy::Progressive,
        CollapseStrategy::Speculative,
        CollapseStrategy::MultiDim,
        CollapseStrategy::Temporal,
        CollapseStrategy::Ensemble,
    ];

    for count in [8usize, 64] {
        let mut reg = executed_register(count);
        for strategy in strategies {
            reg.set_strategy(strategy);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", strategy), count),
                &count,
                |b, _| {
                    b.iter(|| {
                        // re-arm the cached output without re-running qubits
                        reg.reset();
                        reg.execute().expect("execute");
                        criterion::black_box(*reg.collapse().expect("collapse"));
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_bus_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus");

    group.bench_function("send_receive_64", |b| {
        let bus = MessageBus::new(BusConfig::default());
        b.iter(|| {
            for i in 0..64u32 {
                let _ = bus.send(i, MessageType::PartialResult, &i.to_le_bytes(), BROADCAST);
            }
            while let Some(m) = bus.receive(u32::MAX) {
                criterion::black_box(m);
            }
        });
    });

    group.bench_function("broadcast_best", |b| {
        let bus = MessageBus::new(BusConfig::default());
        let mut quality = 0u32;
        b.iter(|| {
            quality = quality.wrapping_add(1);
            let _ = bus.broadcast_best(1, b"candidate", quality);
            bus.receive(0);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_collapse_strategies, bench_bus_throughput);
criterion_main!(benches);
