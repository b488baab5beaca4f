use criterion::{
    black_box,
    criterion_group,
    criterion_main,
    BatchSize,
    Bencher,
    Criterion,
    Throughput,
};
use intrusive_hash_wheel_timer::wheel::TimerWheel;
use intrusive_hash_wheel_timer::{TimerEntry, Timeval, UuidOnlyTimerEntry};
use rand::prelude::*;
use std::{sync::Arc, time::Duration};

const NUM_ELEMENTS: usize = 10000;

type Entry = Arc<TimerEntry<UuidOnlyTimerEntry>>;

fn new_wheel() -> TimerWheel<UuidOnlyTimerEntry> {
    TimerWheel::new(Timeval::ZERO, 1).expect("wheel")
}

fn new_entry(delay_ms: u64) -> Entry {
    let entry = Arc::new(TimerEntry::new(UuidOnlyTimerEntry::with_random_id(
        Duration::from_millis(delay_ms),
    )));
    entry.set_due(Timeval::from_millis(delay_ms as i64));
    entry
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("wheel-throughput");
    group.throughput(Throughput::Elements(NUM_ELEMENTS as u64));
    group.bench_function("write-only-dense", write_only_dense_bench);
    group.bench_function("write-only-uniform", write_only_uniform_bench);
    group.bench_function("write-only-single", write_only_single_bench);
    group.bench_function("read-only", read_only_bench);
    group.bench_function("read-only-single", read_only_single_bench);
    group.bench_function("read-write", read_write_bench);
    group.finish();
}

fn write_only_dense_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        || {
            let wheel = new_wheel();
            let entries: Vec<Entry> = (1..=NUM_ELEMENTS).map(|i| new_entry(i as u64)).collect();
            (wheel, entries)
        },
        |input| {
            let (wheel, entries) = input;
            for entry in entries {
                let _ = wheel.insert(entry);
            }
            wheel
        },
        BatchSize::PerIteration,
    );
}

fn write_only_uniform_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        || {
            let wheel = new_wheel();
            let mut rng = rand_xoshiro::Xoshiro256PlusPlus::seed_from_u64(42);
            let entries: Vec<Entry> = (1..=NUM_ELEMENTS)
                .map(|_| {
                    let mut delay: u32 = rng.gen();
                    if delay == 0 {
                        // make sure the entry does not land in the current slot
                        delay = 1;
                    }
                    new_entry(delay as u64)
                })
                .collect();
            (wheel, entries)
        },
        |input| {
            let (wheel, entries) = input;
            for entry in entries {
                let _ = wheel.insert(entry);
            }
            wheel
        },
        BatchSize::PerIteration,
    );
}

fn write_only_single_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        || {
            let wheel = new_wheel();
            let entries: Vec<Entry> = (1..=NUM_ELEMENTS).map(|_| new_entry(1)).collect();
            (wheel, entries)
        },
        |input| {
            let (wheel, entries) = input;
            for entry in entries {
                let _ = wheel.insert(entry);
            }
            wheel
        },
        BatchSize::PerIteration,
    );
}

fn read_only_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        || {
            let wheel = new_wheel();
            for i in 1..=NUM_ELEMENTS {
                wheel.insert(new_entry(i as u64)).unwrap();
            }
            wheel
        },
        |wheel| {
            let fired = wheel.tick(Timeval::from_millis(NUM_ELEMENTS as i64), |_, entry, _| {
                black_box(entry);
            });
            assert_eq!(fired as usize, NUM_ELEMENTS);
            wheel
        },
        BatchSize::PerIteration,
    );
}

fn read_only_single_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        || {
            let wheel = new_wheel();
            for _ in 1..=NUM_ELEMENTS {
                wheel.insert(new_entry(1)).unwrap();
            }
            wheel
        },
        |wheel| {
            let fired = wheel.tick(Timeval::from_millis(1), |_, entry, _| {
                black_box(entry);
            });
            assert_eq!(fired as usize, NUM_ELEMENTS);
            wheel
        },
        BatchSize::PerIteration,
    );
}

fn read_write_bench(bencher: &mut Bencher) {
    bencher.iter_batched(
        new_wheel,
        |wheel| {
            let entry = new_entry(1);
            for i in 1..=NUM_ELEMENTS {
                let _ = wheel.insert(entry.clone());
                wheel.tick(Timeval::from_millis(i as i64), |_, entry, now| {
                    entry.set_due(now + Duration::from_millis(1));
                    black_box(entry);
                });
            }
            wheel
        },
        BatchSize::PerIteration,
    );
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
