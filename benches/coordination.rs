//! Benchmarks for the coordination hot paths: container push/pop per
//! perspective, transfer with conversion, and the two work-stealing
//! constructions side by side.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use tack_runtime::{codec, ElemType, Perspective, Stack, Task, TaskDeque, WorkStealStack};

fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_push_pop");
    for (name, perspective) in [("lifo", Perspective::Lifo), ("fifo", Perspective::Fifo)] {
        group.bench_function(name, |b| {
            let stack = Stack::new(ElemType::Int, perspective);
            b.iter(|| {
                for v in 0..64i64 {
                    stack.push(codec::encode_int(v)).unwrap();
                }
                for _ in 0..64 {
                    black_box(stack.pop().unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_bring(c: &mut Criterion) {
    c.bench_function("bring_str_to_int", |b| {
        let src = Stack::new(ElemType::Str, Perspective::Lifo);
        let dst = Stack::new(ElemType::Int, Perspective::Lifo);
        b.iter(|| {
            src.push(b"123456".to_vec()).unwrap();
            dst.bring(&src).unwrap();
            black_box(dst.pop().unwrap());
        });
    });
}

fn bench_worksteal(c: &mut Criterion) {
    let mut group = c.benchmark_group("worksteal_owner_loop");

    group.bench_function("ring_deque", |b| {
        let deque = TaskDeque::with_capacity(128);
        b.iter(|| {
            for id in 0..64u64 {
                deque
                    .push(Task {
                        id,
                        payload: id.to_be_bytes().to_vec(),
                    })
                    .unwrap();
            }
            while let Some(task) = deque.pop() {
                black_box(task.id);
            }
        });
    });

    group.bench_function("stack_two_views", |b| {
        let queue = WorkStealStack::new(ElemType::Uint, 128);
        b.iter(|| {
            for id in 0..64u64 {
                queue.push(&codec::encode_uint(id)).unwrap();
            }
            while let Some(bytes) = queue.pop().unwrap() {
                black_box(codec::decode_uint(&bytes).unwrap());
                queue.recycle(bytes);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_bring, bench_worksteal);
criterion_main!(benches);
