use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, RwLock};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const SIZE: usize = 1 << 14;
const READERS: usize = 4;

// Run `read` on `READERS` threads while a single writer repeatedly overwrites values.
fn run<T: Sync>(map: &T, read: impl Fn(&T, usize) + Sync, write: impl Fn(&T, usize) + Sync) {
    let barrier = Barrier::new(READERS + 1);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let (barrier, done, read, write) = (&barrier, &done, &read, &write);

        let handles: Vec<_> = (0..READERS)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    for i in 0..SIZE {
                        read(map, i);
                    }
                })
            })
            .collect();

        s.spawn(move || {
            barrier.wait();
            let mut i = 0;
            while !done.load(Ordering::Relaxed) {
                write(map, i % SIZE);
                i += 1;
            }
        });

        for handle in handles {
            handle.join().unwrap();
        }

        done.store(true, Ordering::Relaxed);
    });
}

fn read_heavy(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_heavy");

    group.bench_function("probemap", |b| {
        let m = probemap::HashMap::<usize, usize>::with_capacity(SIZE * 2);
        for i in 0..SIZE {
            m.pin().insert(i, i).unwrap();
        }

        b.iter(|| {
            run(
                &m,
                |m, i| {
                    black_box(m.pin().get(&i));
                },
                |m, i| {
                    m.pin().insert(i, i).unwrap();
                },
            )
        });
    });

    group.bench_function("dashmap", |b| {
        let m = dashmap::DashMap::<usize, usize>::default();
        for i in 0..SIZE {
            m.insert(i, i);
        }

        b.iter(|| {
            run(
                &m,
                |m, i| {
                    black_box(m.get(&i).map(|v| *v));
                },
                |m, i| {
                    m.insert(i, i);
                },
            )
        });
    });

    group.bench_function("std", |b| {
        let m = RwLock::new(HashMap::<usize, usize>::default());
        for i in 0..SIZE {
            m.write().unwrap().insert(i, i);
        }

        b.iter(|| {
            run(
                &m,
                |m, i| {
                    black_box(m.read().unwrap().get(&i).copied());
                },
                |m, i| {
                    m.write().unwrap().insert(i, i);
                },
            )
        });
    });

    group.finish();
}

criterion_group!(benches, read_heavy);
criterion_main!(benches);
