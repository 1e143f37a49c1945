use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;

use dabtist::{TimestampHandle, TICKS_PER_SECOND};

/// MNSC cycle decoding to 2023-03-05T10:12:34, sync_to_frame set.
const TIME_CYCLE: [u16; 4] = [0x0000, 0x9234, 0x0510, 0x2303];

fn bench_update_eti(c: &mut Criterion) {
    let mut rng = rand::thread_rng();
    let ticks: Vec<u32> = (0..1024).map(|_| rng.gen_range(0..TICKS_PER_SECOND)).collect();

    let tist = TimestampHandle::new(0.002);
    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(ticks.len() as u64));
    group.bench_function("eti", |b| {
        b.iter(|| {
            for (i, t) in ticks.iter().enumerate() {
                let phase = (i % 4) as u8;
                tist.update_eti(phase, TIME_CYCLE[phase as usize], *t, i as i32);
            }
        });
    });
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let tist = TimestampHandle::new(0.002);
    tist.update_edi(1_700_000_000, 8_192_000, 1234, 0);

    let mut group = c.benchmark_group("snapshot");
    group.bench_function("produce", |b| {
        b.iter(|| {
            let _ = tist.snapshot();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_update_eti, bench_snapshot);
criterion_main!(benches);
