//! Adaptive stack walkthrough: array mode, then promotion under load.

use istif::Stack;
use std::sync::{Arc, Barrier};
use std::thread;

fn main() {
    println!("Adaptive Stack Example");
    println!("======================\n");

    // Single-threaded: the stack stays in its array representation.
    println!("Single-threaded (array mode):");
    {
        let stack = Stack::new();
        for i in 1..=5 {
            stack.push(i);
        }

        assert_eq!(stack.top(), Some(5));
        assert!(!stack.is_using_cas());

        print!("  popped:");
        while let Some(v) = stack.pop() {
            print!(" {v}");
        }
        println!();
        println!("  promoted: {}", stack.is_using_cas());
    }

    // Contended: concurrent pushers trip the heuristic and the stack
    // migrates into its lock-free representation.
    println!("\nContended (4 threads, 10000 pushes each):");
    {
        let stack = Arc::new(Stack::with_tuning(0, 2, 16));
        let barrier = Arc::new(Barrier::new(4));
        let mut handles = vec![];

        for tid in 0..4 {
            let stack = stack.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for i in 0..10_000 {
                    stack.push(tid * 10_000 + i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        println!("  size after join: {}", stack.len());
        println!("  promoted: {}", stack.is_using_cas());

        let mut drained = 0;
        while stack.pop().is_some() {
            drained += 1;
        }
        println!("  drained: {drained}");
    }

    println!("\nDone.");
}
