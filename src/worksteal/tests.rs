use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use super::*;
use crate::codec;

fn task(id: u64) -> Task {
    Task {
        id,
        payload: id.to_be_bytes().to_vec(),
    }
}

#[test]
fn owner_end_is_lifo_thief_end_is_fifo() {
    let d = TaskDeque::with_capacity(8);
    for id in 1..=4 {
        d.push(task(id)).unwrap();
    }
    assert_eq!(d.len(), 4);
    assert_eq!(d.pop().unwrap().id, 4);
    assert_eq!(d.steal().unwrap().id, 1);
    assert_eq!(d.pop().unwrap().id, 3);
    assert_eq!(d.steal().unwrap().id, 2);
    assert!(d.is_empty());
    assert!(d.pop().is_none());
    assert!(d.steal().is_none());
}

#[test]
fn push_fails_when_the_ring_is_full() {
    let d = TaskDeque::with_capacity(2);
    d.push(task(1)).unwrap();
    d.push(task(2)).unwrap();
    assert_eq!(d.push(task(3)), Err(StackError::Full));
    // Stealing frees a slot and the ring wraps.
    assert_eq!(d.steal().unwrap().id, 1);
    d.push(task(3)).unwrap();
    assert_eq!(d.pop().unwrap().id, 3);
}

#[test]
fn owner_and_thieves_split_the_work_exactly() {
    const TOTAL: u64 = 2000;
    let d = Arc::new(TaskDeque::with_capacity(TOTAL as usize));
    for id in 0..TOTAL {
        d.push(task(id)).unwrap();
    }

    let mut thieves = Vec::new();
    for _ in 0..3 {
        let d = Arc::clone(&d);
        thieves.push(thread::spawn(move || {
            let mut got = Vec::new();
            loop {
                match d.steal() {
                    Some(t) => got.push(t.id),
                    None if d.is_empty() => break,
                    None => thread::yield_now(),
                }
            }
            got
        }));
    }
    let owner = {
        let d = Arc::clone(&d);
        thread::spawn(move || {
            let mut got = Vec::new();
            while let Some(t) = d.pop() {
                got.push(t.id);
            }
            got
        })
    };

    let mut seen: Vec<u64> = owner.join().unwrap();
    for t in thieves {
        let ids = t.join().unwrap();
        // Each thief's sequence is increasing: steals only move forward.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        seen.extend(ids);
    }
    let unique: HashSet<u64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "a task was delivered twice");
    assert_eq!(seen.len() as u64, TOTAL, "a task was lost");
}

#[test]
fn view_based_queue_matches_the_deque_shape() {
    let q = WorkStealStack::new(ElemType::Int, 16);
    for v in 1..=4i64 {
        q.push(&codec::encode_int(v)).unwrap();
    }
    assert_eq!(q.len(), 4);
    let newest = q.pop().unwrap().unwrap();
    assert_eq!(codec::decode_int(&newest), Ok(4));
    q.recycle(newest);
    let oldest = q.steal().unwrap().unwrap();
    assert_eq!(codec::decode_int(&oldest), Ok(1));
    q.recycle(oldest);
    assert_eq!(q.len(), 2);
    assert_eq!(q.pop().unwrap().map(|b| codec::decode_int(&b).unwrap()), Some(3));
    assert_eq!(q.steal().unwrap().map(|b| codec::decode_int(&b).unwrap()), Some(2));
    assert_eq!(q.pop().unwrap(), None);
    assert_eq!(q.steal().unwrap(), None);
}

#[test]
fn view_based_queue_is_safe_under_contention() {
    let q = Arc::new(WorkStealStack::new(ElemType::Int, 256));
    let owner = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut got = Vec::new();
            for v in 0..200i64 {
                q.push(&codec::encode_int(v)).unwrap();
                if v % 3 == 0 {
                    if let Some(b) = q.pop().unwrap() {
                        got.push(codec::decode_int(&b).unwrap());
                        q.recycle(b);
                    }
                }
            }
            while let Some(b) = q.pop().unwrap() {
                got.push(codec::decode_int(&b).unwrap());
            }
            got
        })
    };
    let thief = {
        let q = Arc::clone(&q);
        thread::spawn(move || {
            let mut got = Vec::new();
            for _ in 0..400 {
                if let Some(b) = q.steal().unwrap() {
                    got.push(codec::decode_int(&b).unwrap());
                    q.recycle(b);
                } else {
                    thread::yield_now();
                }
            }
            got
        })
    };

    let mut seen = owner.join().unwrap();
    seen.extend(thief.join().unwrap());
    // Late steals may still drain stragglers the owner missed.
    while let Some(b) = q.steal().unwrap() {
        seen.push(codec::decode_int(&b).unwrap());
    }
    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len());
    assert_eq!(seen.len(), 200);
}
