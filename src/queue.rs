//! Michael–Scott queue: lock-free FIFO with a dummy head.
//!
//! The node at `head` is purely structural; the first real value lives at
//! `head->next`. `tail` may lag one node behind the true last node, and
//! any thread that observes the lag helps advance it before retrying its
//! own operation, so a stalled enqueuer never blocks the queue.
//!
//! Traversal uses two hazard slots per thread: slot 0 for the node under
//! observation, slot 1 for its successor. Publications are revalidated
//! against `head` (or against the link that produced them, for the tail
//! walk) before any dereference is trusted.

use crate::guard;
use crate::utils::CacheAligned;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    /// Uninitialized on the dummy; consumed by the winning dequeuer the
    /// moment the node is promoted to dummy.
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    fn dummy() -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value: MaybeUninit::uninit(),
        }))
    }

    fn new(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            next: AtomicPtr::new(ptr::null_mut()),
            value: MaybeUninit::new(value),
        }))
    }
}

/// A lock-free unbounded FIFO queue.
///
/// Push and pop are lock-free with cooperative tail advancement. The size
/// counter is relaxed and advisory under concurrent mutation; reads of an
/// empty queue return `None`.
///
/// # Example
///
/// ```rust
/// use istif::Queue;
///
/// let queue = Queue::new();
/// queue.push(10);
/// queue.push(20);
/// assert_eq!(queue.front(), Some(10));
/// assert_eq!(queue.pop(), Some(10));
/// assert_eq!(queue.pop(), Some(20));
/// assert_eq!(queue.pop(), None);
/// ```
pub struct Queue<T: 'static> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    len: CacheAligned<AtomicUsize>,
}

// SAFETY: values are moved in and out whole; links are published only
// through atomics and the hazard protocol.
unsafe impl<T: Send + 'static> Send for Queue<T> {}
unsafe impl<T: Send + 'static> Sync for Queue<T> {}

impl<T: 'static> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Queue<T> {
    /// Creates an empty queue (one dummy node, `head == tail`).
    pub fn new() -> Self {
        let dummy = Node::<T>::dummy();
        Self {
            head: CacheAligned::new(AtomicPtr::new(dummy)),
            tail: CacheAligned::new(AtomicPtr::new(dummy)),
            len: CacheAligned::new(AtomicUsize::new(0)),
        }
    }

    /// Appends a value at the back of the queue.
    pub fn push(&self, value: T) {
        let node = Node::new(value);

        loop {
            // Tail is never null: the dummy guarantees at least one node.
            let tail = guard::protect(0, &self.tail.data);
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };
            if self.tail.load(Ordering::Acquire) != tail {
                continue;
            }

            if next.is_null() {
                // SAFETY: `tail` is hazarded and revalidated above.
                let linked = unsafe {
                    (*tail)
                        .next
                        .compare_exchange_weak(
                            ptr::null_mut(),
                            node,
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                };
                if linked {
                    // Failure is fine: another thread already helped.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    self.len.fetch_add(1, Ordering::Relaxed);
                    guard::clear_all();
                    return;
                }
            } else {
                // Mid-advance: help move tail forward, then retry.
                let _ = self.tail.compare_exchange_weak(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
            }
        }
    }

    /// Appends every value of an iterator, front to back.
    pub fn push_range<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.push(value);
        }
    }

    /// Removes and returns the front value, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        loop {
            let head = guard::protect(0, &self.head.data);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            guard::publish(1, next);
            if self.head.load(Ordering::Acquire) != head {
                continue;
            }

            if next.is_null() {
                guard::clear_all();
                return None;
            }

            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                // Tail lags behind the real last node; help and retry.
                let _ = self.tail.compare_exchange_weak(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }

            if self
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.len.fetch_sub(1, Ordering::Relaxed);
                // SAFETY: the winning CAS promoted `next` to dummy; only
                // this thread consumes its value, exactly once.
                let value = unsafe { (*next).value.assume_init_read() };
                guard::clear_all();
                // SAFETY: the old dummy is unlinked and its value slot
                // was consumed when it became the dummy (or never
                // existed); dealloc will not touch it.
                unsafe { guard::retire(head) };
                return Some(value);
            }
        }
    }

    /// Returns a clone of the front value without removing it.
    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        loop {
            let head = guard::protect(0, &self.head.data);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            guard::publish(1, next);
            if self.head.load(Ordering::Acquire) != head {
                continue;
            }

            if next.is_null() {
                guard::clear_all();
                return None;
            }

            // SAFETY: `next` is hazarded and was the first real node at
            // revalidation; its value is initialized and its storage
            // cannot be reclaimed under us.
            let value = unsafe { (*next).value.assume_init_ref().clone() };
            guard::clear_all();
            return Some(value);
        }
    }

    /// Returns a clone of the back value without removing it.
    ///
    /// Walks the chain from the front, so this is O(n); it exists for
    /// completeness, not speed.
    pub fn back(&self) -> Option<T>
    where
        T: Clone,
    {
        loop {
            let head = guard::protect(0, &self.head.data);
            let mut current = unsafe { (*head).next.load(Ordering::Acquire) };
            guard::publish(1, current);
            if self.head.load(Ordering::Acquire) != head {
                continue;
            }

            if current.is_null() {
                guard::clear_all();
                return None;
            }

            // Shift the window: slot 0 follows the walk, slot 1 guards
            // each successor before it is trusted.
            guard::publish(0, current);
            guard::publish(1, ptr::null_mut::<Node<T>>());

            loop {
                let next = unsafe { (*current).next.load(Ordering::Acquire) };
                if next.is_null() {
                    // SAFETY: `current` is hazarded; last-node values are
                    // initialized.
                    let value = unsafe { (*current).value.assume_init_ref().clone() };
                    guard::clear_all();
                    return Some(value);
                }

                guard::publish(1, next);
                // A concurrent enqueue may extend the chain between the
                // load and the publication; re-read before following.
                if unsafe { (*current).next.load(Ordering::Acquire) } != next {
                    continue;
                }

                current = next;
                guard::publish(0, current);
                guard::publish(1, ptr::null_mut::<Node<T>>());
            }
        }
    }

    /// Whether the queue is empty at some recent linearization point.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Relaxed) == 0
    }

    /// Advisory number of values; exact only when quiescent.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

impl<T: 'static> Drop for Queue<T> {
    fn drop(&mut self) {
        // Exclusive access. The first node is the dummy: its value slot
        // is spent, so only the box is freed. Every later node still owns
        // its value.
        let head = self.head.load(Ordering::Relaxed);
        let mut next = {
            // SAFETY: head is never null and is no longer shared.
            let dummy = unsafe { Box::from_raw(head) };
            dummy.next.load(Ordering::Relaxed)
        };
        while !next.is_null() {
            let mut boxed = unsafe { Box::from_raw(next) };
            next = boxed.next.load(Ordering::Relaxed);
            // SAFETY: in-band non-dummy nodes hold initialized values.
            unsafe { boxed.value.assume_init_drop() };
        }
        guard::flush();
    }
}
