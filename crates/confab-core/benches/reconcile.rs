use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use confab_core::stream::{reconcile, StreamState};

fn snapshot(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Benchmark for snapshot reconciliation
fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for size in [256, 4096, 65536].iter() {
        let base = snapshot(*size);

        // New snapshot extends the previous one, the common decode case.
        group.bench_with_input(BenchmarkId::new("append_only", size), size, |b, &size| {
            let current = snapshot(size + 64);
            b.iter(|| {
                let _delta = black_box(reconcile(&base, &current));
            });
        });

        // Unchanged snapshot, a poll that landed between tokens.
        group.bench_with_input(BenchmarkId::new("identical", size), size, |b, _| {
            b.iter(|| {
                let _delta = black_box(reconcile(&base, &base));
            });
        });

        // Divergence halfway through, as after a rewritten stop sequence.
        group.bench_with_input(BenchmarkId::new("mid_divergence", size), size, |b, &size| {
            let mut current = snapshot(size);
            current[size / 2] = b'#';
            b.iter(|| {
                let _delta = black_box(reconcile(&base, &current));
            });
        });
    }

    group.finish();
}

/// Benchmark for a full streaming session
fn bench_stream_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_state");

    // Messages grow word by word, the shape a decode loop produces.
    let words: Vec<&str> = "the quick brown fox jumps over the lazy dog"
        .split(' ')
        .collect();
    let mut snapshots = Vec::new();
    let mut message = String::new();
    for round in 0..64 {
        for word in &words {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(word);
            if round % 7 == 0 {
                continue;
            }
            snapshots.push(message.clone());
        }
    }

    group.bench_function("advance_sequence", |b| {
        b.iter(|| {
            let mut state = StreamState::new();
            for snapshot in &snapshots {
                let _delta = black_box(state.advance(snapshot));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile, bench_stream_state);
criterion_main!(benches);
