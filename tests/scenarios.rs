//! End-to-end scenarios exercising the runtime the way compiled programs
//! drive it: perspective switching, atomic transfer under failure,
//! work-stealing through views, blocking handoff, quorum waits, and the
//! error-stack forcing function.
//!
//! The global error stack is process-wide, so every test here serialises on
//! one mutex and leaves the error stack clean behind itself.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tack_runtime::{
    codec, consider, expect, fault, reduce, Considered, ElemType, Perspective, Stack, StackError,
    Status, View,
};

static SERIAL: Mutex<()> = Mutex::new(());

fn serial() -> MutexGuard<'static, ()> {
    // A previously failed test only poisons the guard, not the state.
    let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    while fault::take_error().is_some() {}
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
    guard
}

fn int(v: i64) -> Vec<u8> {
    codec::encode_int(v)
}

#[test]
fn perspective_switch_walks_one_container_three_ways() {
    let _serial = serial();
    let s = Stack::new(ElemType::Int, Perspective::Lifo);
    s.push(int(10)).unwrap();
    s.push(int(20)).unwrap();
    s.push(int(30)).unwrap();

    assert_eq!(s.peek().unwrap(), int(30));
    s.set_perspective(Perspective::Fifo).unwrap();
    assert_eq!(s.peek().unwrap(), int(10));
    s.set_perspective(Perspective::Indexed).unwrap();
    assert_eq!(s.peek_at(1).unwrap(), int(20));
}

#[test]
fn failed_bring_leaves_no_trace_on_either_stack() {
    let _serial = serial();
    let src = Stack::new(ElemType::Str, Perspective::Lifo);
    let dst = Stack::new(ElemType::Int, Perspective::Lifo);
    src.push(b"not_a_number".to_vec()).unwrap();

    let err = dst.bring_radix(&src, 10).unwrap_err();
    assert!(matches!(err, StackError::Parse(_, ElemType::Int)));
    assert_eq!(src.len(), 1);
    assert_eq!(dst.len(), 0);
    assert_eq!(src.peek().unwrap(), b"not_a_number".to_vec());
}

#[test]
fn bring_is_atomic_under_concurrent_observers() {
    let _serial = serial();
    const N: i64 = 200;
    let src = Stack::new(ElemType::Int, Perspective::Lifo);
    let dst = Stack::new(ElemType::Int, Perspective::Lifo);
    for v in 0..N {
        src.push(int(v)).unwrap();
    }

    let mover = {
        let (src, dst) = (src.clone(), dst.clone());
        thread::spawn(move || {
            for _ in 0..N {
                dst.bring(&src).unwrap();
            }
        })
    };
    let observer = {
        let (src, dst) = (src.clone(), dst.clone());
        thread::spawn(move || {
            // The two reads are not atomic together, so brings completing
            // between them can push the sum above N. What atomicity rules
            // out is a sum below N: an element visible in neither stack.
            for _ in 0..1000 {
                let total = src.len() + dst.len();
                assert!(total >= N as usize, "element lost from both stacks: {total}");
            }
        })
    };
    mover.join().unwrap();
    observer.join().unwrap();
    assert_eq!(src.len(), 0);
    assert_eq!(dst.len() as i64, N);
}

#[test]
fn work_stealing_views_split_a_shared_queue() {
    let _serial = serial();
    let queue = Stack::new(ElemType::Int, Perspective::Lifo);
    for v in 1..=100 {
        queue.push(int(v)).unwrap();
    }

    let owner = {
        let queue = queue.clone();
        thread::spawn(move || {
            let view = View::new(Perspective::Lifo);
            view.attach(&queue);
            let mut got = Vec::new();
            loop {
                match view.pop() {
                    Ok(bytes) => got.push(codec::decode_int(&bytes).unwrap()),
                    Err(StackError::Empty) => break,
                    Err(e) => panic!("owner pop failed: {e}"),
                }
            }
            got
        })
    };
    let thief = {
        let queue = queue.clone();
        thread::spawn(move || {
            let view = View::new(Perspective::Fifo);
            view.attach(&queue);
            let mut got = Vec::new();
            loop {
                match view.pop() {
                    Ok(bytes) => got.push(codec::decode_int(&bytes).unwrap()),
                    Err(StackError::Empty) => break,
                    Err(e) => panic!("thief pop failed: {e}"),
                }
            }
            got
        })
    };

    let owner_seq = owner.join().unwrap();
    let thief_seq = thief.join().unwrap();

    // Owner consumes newest-first, thief oldest-first.
    assert!(owner_seq.windows(2).all(|w| w[0] > w[1]));
    assert!(thief_seq.windows(2).all(|w| w[0] < w[1]));

    let mut all: Vec<i64> = owner_seq.into_iter().chain(thief_seq).collect();
    all.sort_unstable();
    assert_eq!(all, (1..=100).collect::<Vec<i64>>());
    assert!(queue.is_empty());
}

#[test]
fn blocking_take_waits_for_its_producer() {
    let _serial = serial();
    let s = Stack::new(ElemType::Int, Perspective::Lifo);
    let producer = {
        let s = s.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            s.push(int(42)).unwrap();
        })
    };

    let started = Instant::now();
    let value = s.take(None).unwrap();
    let waited = started.elapsed();

    assert_eq!(value, int(42));
    assert!(waited >= Duration::from_millis(50));
    assert!(waited < Duration::from_millis(500), "woke far too late: {waited:?}");
    producer.join().unwrap();
}

#[test]
fn close_wakes_a_parked_receiver_promptly() {
    let _serial = serial();
    let s = Stack::new(ElemType::Int, Perspective::Lifo);
    let closer = {
        let s = s.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            s.close().unwrap();
        })
    };
    let started = Instant::now();
    assert_eq!(s.take(None), Err(StackError::Closed));
    assert!(started.elapsed() < Duration::from_millis(500));
    closer.join().unwrap();
}

#[test]
fn quorum_of_two_returns_arrivals_and_cancels_the_rest() {
    let _serial = serial();
    let a = Stack::new(ElemType::Int, Perspective::Lifo);
    let b = Stack::new(ElemType::Int, Perspective::Lifo);
    let c = Stack::new(ElemType::Int, Perspective::Lifo);

    let p1 = {
        let a = a.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            a.push(int(1)).unwrap();
        })
    };
    let p2 = {
        let c = c.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            c.push(int(3)).unwrap();
        })
    };

    let quorum = expect(
        &[a.clone(), b.clone(), c.clone()],
        2,
        Some(Duration::from_millis(500)),
    )
    .unwrap();

    assert_eq!(quorum.status, Status::Ok);
    assert_eq!(quorum.results.len(), 2);
    assert_eq!(quorum.origins, vec![0, 2]);
    assert_eq!(quorum.results.pop().unwrap(), int(1));
    assert_eq!(quorum.results.pop().unwrap(), int(3));
    assert!(b.is_empty());

    p1.join().unwrap();
    p2.join().unwrap();
}

#[test]
fn pending_error_poisons_the_next_operation_before_any_mutation() {
    let _serial = serial();
    fault::raise("boom");

    let s = Stack::new(ElemType::Int, Perspective::Lifo);
    assert_eq!(
        s.push(int(1)),
        Err(StackError::ErrorsPending("boom".to_string()))
    );
    assert_eq!(s.len(), 0, "the guarded push must not touch the stack");

    // Every guarded entry point refuses while the error is pending.
    assert_eq!(s.peek(), Err(StackError::ErrorsPending("boom".to_string())));
    assert_eq!(
        s.take(Some(Duration::ZERO)),
        Err(StackError::ErrorsPending("boom".to_string()))
    );
    assert!(matches!(
        expect(&[s.clone()], 1, Some(Duration::ZERO)),
        Err(StackError::ErrorsPending(_))
    ));

    // Only consider's error arm clears it, one error per pass.
    assert_eq!(consider(Status::Ok), Considered::Error(b"boom".to_vec()));
    assert_eq!(fault::pending(), 0);
    s.push(int(1)).unwrap();
    assert_eq!(s.len(), 1);
}

#[test]
fn consider_drains_errors_most_recent_first() {
    let _serial = serial();
    fault::raise("first");
    fault::raise("second");

    assert_eq!(consider(Status::Error), Considered::Error(b"second".to_vec()));
    assert_eq!(consider(Status::Error), Considered::Error(b"first".to_vec()));
    assert_eq!(consider(Status::Ok), Considered::Ok);
}

#[test]
fn walk_feeds_a_destination_and_sidelines_failures() {
    let _serial = serial();
    let src = Stack::new(ElemType::Int, Perspective::Fifo);
    for v in 1..=5 {
        src.push(int(v)).unwrap();
    }
    let dst = Stack::new(ElemType::Int, Perspective::Fifo);
    let errs = Stack::new(ElemType::Bytes, Perspective::Lifo);

    let delivered = dst
        .walk_from(
            &src,
            |bytes| {
                let v = codec::decode_int(bytes).map_err(|e| e.to_string())?;
                if v % 2 == 0 {
                    Err(format!("no evens: {v}"))
                } else {
                    Ok(codec::encode_int(v * v))
                }
            },
            Some(&errs),
        )
        .unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(errs.len(), 2);
    assert_eq!(src.len(), 5);
    let squares: HashSet<i64> = dst
        .snapshot()
        .unwrap()
        .iter()
        .map(|b| codec::decode_int(b).unwrap())
        .collect();
    assert_eq!(squares, HashSet::from([1, 9, 25]));

    let sum = reduce(
        &src,
        int(0),
        |acc, b| {
            let a = codec::decode_int(acc).map_err(|e| e.to_string())?;
            let v = codec::decode_int(b).map_err(|e| e.to_string())?;
            Ok(codec::encode_int(a + v))
        },
        None,
    )
    .unwrap();
    assert_eq!(codec::decode_int(&sum), Ok(15));
}
