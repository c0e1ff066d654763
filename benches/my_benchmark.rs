use criterion::{criterion_group, criterion_main, Criterion};
use leakage_simulator::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Synthetic execution of `count` instructions cycling through all categories
fn events(count: u32) -> Vec<InstructionEvent> {
    const OPCODES: [&str; 5] = ["MOVS", "ADDS", "LDR", "STR", "BX"];
    (0..count)
        .map(|i| {
            InstructionEvent::new(
                0x1000 + 2 * u64::from(i),
                OPCODES[i as usize % OPCODES.len()],
                vec![i.wrapping_mul(0x9E37_79B9), i],
            )
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let coefficients = Arc::new(
        Coefficients::from_file(Path::new("tests/data/coefficients.json"))
            .expect("Benchmark coefficients missing"),
    );
    let events = events(2000);

    let mut group = c.benchmark_group("leakage_performance");
    group.warm_up_time(std::time::Duration::from_secs(1));
    group.measurement_time(std::time::Duration::from_secs(10));
    group.sample_size(10);
    for threads in [1, 4] {
        let model = ModelKind::Power.build(Arc::clone(&coefficients));
        let simulation = Simulation::new(model, Arc::clone(&coefficients), threads)
            .expect("Failed to start simulation");
        group.bench_function(format!("trace 2000 instructions, {} threads", threads), |b| {
            b.iter(|| simulation.trace_events(&events).expect("Trace failed"))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
