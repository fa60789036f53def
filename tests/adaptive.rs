use istif::Stack;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_lifo_single_thread() {
    let stack = Stack::new();
    stack.push(1);
    stack.push(2);
    stack.push(3);

    assert_eq!(stack.top(), Some(3));
    assert_eq!(stack.len(), 3);
    assert_eq!(stack.pop(), Some(3));
    assert_eq!(stack.pop(), Some(2));
    assert_eq!(stack.pop(), Some(1));
    assert_eq!(stack.pop(), None);
}

#[test]
fn test_fresh_stack_is_empty() {
    let stack = Stack::<u32>::new();
    assert!(stack.is_empty());
    assert_eq!(stack.len(), 0);
    assert_eq!(stack.pop(), None);
    assert_eq!(stack.top(), None);
    assert!(!stack.is_using_cas());
}

#[test]
fn test_single_thread_never_promotes() {
    // Aggressive tuning, but one thread never reaches an active count of
    // two, so the stack must stay in array mode.
    let stack = Stack::with_tuning(0, 2, 2);
    for i in 1..=10 {
        stack.push(i);
    }
    assert!(!stack.is_using_cas());
    for expected in (1..=10).rev() {
        assert_eq!(stack.pop(), Some(expected));
    }
    assert_eq!(stack.pop(), None);
    assert!(!stack.is_using_cas());
}

#[test]
fn test_tuning_floors_are_enforced() {
    // thread_threshold clamps to 2: a single thread must not count as
    // contention even with a zero threshold and an instant streak.
    let stack = Stack::with_tuning(0, 0, 0);
    for i in 0..1000 {
        stack.push(i);
    }
    assert!(!stack.is_using_cas());
}

#[test]
fn test_reserve_changes_nothing_observable() {
    let stack = Stack::new();
    stack.push(5);
    stack.reserve(1024);
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.top(), Some(5));
    assert!(!stack.is_empty());
}

#[test]
fn test_with_capacity_behaves_like_new() {
    let stack = Stack::with_capacity(64);
    assert!(stack.is_empty());
    stack.push(1);
    assert_eq!(stack.pop(), Some(1));
}

#[test]
fn test_quiescent_reads_are_stable() {
    let stack = Stack::new();
    stack.push(7);
    for _ in 0..3 {
        assert_eq!(stack.top(), Some(7));
        assert_eq!(stack.len(), 1);
        assert!(!stack.is_empty());
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_pushes_promote() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 1000;

    let stack = Arc::new(Stack::with_tuning(0, 2, 1));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let stack = stack.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    stack.push(tid * PER_THREAD + i);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert!(stack.is_using_cas());
    assert_eq!(stack.len(), THREADS * PER_THREAD);

    for _ in 0..THREADS * PER_THREAD {
        assert!(stack.pop().is_some());
    }
    assert_eq!(stack.pop(), None);

    // Promotion is one-way.
    assert!(stack.is_using_cas());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_promotion_preserves_lifo_order() {
    const BASE: usize = 10;
    const SENTINEL_BASE: usize = 1_000;

    let stack = Arc::new(Stack::with_tuning(0, 2, 1));
    for i in 1..=BASE {
        stack.push(i);
    }
    assert!(!stack.is_using_cas());

    // Two contending pushers of sentinel values drive the promotion; the
    // base values must survive the migration in order, below them.
    let barrier = Arc::new(Barrier::new(2));
    let promoted = Arc::new(AtomicBool::new(false));
    let handles: Vec<_> = (0..2)
        .map(|tid| {
            let stack = stack.clone();
            let barrier = barrier.clone();
            let promoted = promoted.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut i = 0;
                while !promoted.load(Ordering::Relaxed) {
                    stack.push(SENTINEL_BASE + tid * 1_000_000 + i);
                    i += 1;
                    if stack.is_using_cas() {
                        promoted.store(true, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert!(stack.is_using_cas());

    let mut base_values = Vec::new();
    while let Some(v) = stack.pop() {
        if v <= BASE {
            base_values.push(v);
        }
    }
    let expected: Vec<usize> = (1..=BASE).rev().collect();
    assert_eq!(base_values, expected);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_push_pop_conservation() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 10_000;

    let stack = Arc::new(Stack::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let stack = stack.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let mut popped = 0usize;
                for i in 0..PER_THREAD {
                    stack.push(tid * PER_THREAD + i);
                    if i % 2 == 1 && stack.pop().is_some() {
                        popped += 1;
                    }
                }
                popped
            })
        })
        .collect();

    let total_popped: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let mut drained = 0usize;
    while stack.pop().is_some() {
        drained += 1;
    }
    assert_eq!(total_popped + drained, THREADS * PER_THREAD);
    assert!(stack.is_empty());
}
