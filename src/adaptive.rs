//! Adaptive LIFO: a spinlock-guarded vector that promotes once, under
//! sustained contention, to the lock-free Treiber stack.
//!
//! Exactly one representation is authoritative at any instant, selected
//! by the `using_cas` flag. Every operation holds the mode lock shared;
//! promotion holds it exclusive, so nobody observes a half-migrated
//! state. The contiguous representation has better cache behavior and a
//! cheaper push under low contention; the linked one scales with the
//! producer/consumer count. Migration is one-way, which avoids
//! oscillation and keeps the invariants simple.

use crate::treiber::TreiberStack;
use crate::ttas::TTas;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

// Fast promotion under practical workload contention.
const DEFAULT_THREAD_THRESHOLD: usize = 3;
const DEFAULT_STREAK_THRESHOLD: usize = 64;

const MIN_THREAD_THRESHOLD: usize = 2;
const MIN_STREAK_THRESHOLD: usize = 1;

/// A dual-mode LIFO stack.
///
/// Starts as a contiguous buffer guarded by a [`TTas`] spinlock. Each
/// operation observes how many operations are in flight; once the count
/// stays at or above the thread threshold for a full streak, the next
/// mutating operation migrates every value into a lock-free
/// [`TreiberStack`] and all further traffic takes the CAS path. The
/// transition preserves LIFO order and is irreversible.
///
/// # Example
///
/// ```rust
/// use istif::Stack;
///
/// let stack = Stack::new();
/// stack.push(1);
/// stack.push(2);
/// assert_eq!(stack.top(), Some(2));
/// assert_eq!(stack.pop(), Some(2));
/// assert_eq!(stack.pop(), Some(1));
/// assert_eq!(stack.pop(), None);
/// ```
pub struct Stack<T: 'static> {
    /// Shared for every operation, exclusive for promotion.
    mode: RwLock<()>,

    array_data: TTas<Vec<T>>,
    link_data: TreiberStack<T>,
    using_cas: AtomicBool,

    thread_threshold: usize,
    streak_threshold: usize,

    active_ops: AtomicUsize,
    streak: AtomicUsize,
    promotion_requested: AtomicBool,
}

/// Tracks one in-flight operation and feeds the contention heuristic.
struct OpScope<'a, T: 'static> {
    stack: &'a Stack<T>,
}

impl<'a, T: 'static> OpScope<'a, T> {
    fn enter(stack: &'a Stack<T>) -> Self {
        let active_now = stack.active_ops.fetch_add(1, Ordering::Relaxed) + 1;
        stack.observe_contention(active_now);
        Self { stack }
    }
}

impl<T: 'static> Drop for OpScope<'_, T> {
    fn drop(&mut self) {
        self.stack.active_ops.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<T: 'static> Default for Stack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Stack<T> {
    /// Creates an empty stack with default contention tuning.
    pub fn new() -> Self {
        Self::with_tuning(0, DEFAULT_THREAD_THRESHOLD, DEFAULT_STREAK_THRESHOLD)
    }

    /// Creates an empty stack whose array mode pre-allocates room for
    /// `reserve_hint` values.
    pub fn with_capacity(reserve_hint: usize) -> Self {
        Self::with_tuning(reserve_hint, DEFAULT_THREAD_THRESHOLD, DEFAULT_STREAK_THRESHOLD)
    }

    /// Creates an empty stack with explicit contention tuning.
    ///
    /// `thread_threshold` is the number of simultaneously active
    /// operations that counts as contention (clamped to at least 2);
    /// `streak_threshold` is how many consecutive contended entries
    /// request promotion (clamped to at least 1).
    pub fn with_tuning(
        reserve_hint: usize,
        thread_threshold: usize,
        streak_threshold: usize,
    ) -> Self {
        Self {
            mode: RwLock::new(()),
            array_data: TTas::new(Vec::with_capacity(reserve_hint)),
            link_data: TreiberStack::new(),
            using_cas: AtomicBool::new(false),
            thread_threshold: thread_threshold.max(MIN_THREAD_THRESHOLD),
            streak_threshold: streak_threshold.max(MIN_STREAK_THRESHOLD),
            active_ops: AtomicUsize::new(0),
            streak: AtomicUsize::new(0),
            promotion_requested: AtomicBool::new(false),
        }
    }

    // The streak counter races between concurrent entries and may request
    // a spurious promotion. Accepted: promotion is one-way and the
    // heuristic only needs to be directionally correct.
    fn observe_contention(&self, active_now: usize) {
        if self.using_cas.load(Ordering::Relaxed) {
            return;
        }

        if active_now >= self.thread_threshold {
            let streak = self.streak.fetch_add(1, Ordering::Relaxed) + 1;
            if streak >= self.streak_threshold {
                self.promotion_requested.store(true, Ordering::Relaxed);
            }
        } else {
            self.streak.store(0, Ordering::Relaxed);
        }
    }

    /// One-way migration into the lock-free representation.
    fn maybe_promote(&self) {
        if self.using_cas.load(Ordering::Acquire)
            || !self.promotion_requested.load(Ordering::Relaxed)
        {
            return;
        }

        let _mode = self.mode.write().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Relaxed) {
            return;
        }

        let moved = {
            let mut data = self.array_data.lock();
            mem::take(&mut *data)
        };

        // Bottom of the vector first, so the relative LIFO order is
        // unchanged: the old array top ends up on top of the link stack.
        for value in moved {
            self.link_data.push(value);
        }

        self.using_cas.store(true, Ordering::Release);
    }

    /// Pushes a value onto the stack.
    ///
    /// The value is constructed by the caller, so nothing slow ever runs
    /// inside the spinlock's critical section.
    pub fn push(&self, value: T) {
        let _scope = OpScope::enter(self);
        self.maybe_promote();

        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            self.link_data.push(value);
        } else {
            let mut data = self.array_data.lock();
            data.push(value);
        }
    }

    /// Pops the most recently pushed value, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        let _scope = OpScope::enter(self);
        self.maybe_promote();

        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            return self.link_data.pop();
        }

        let mut data = self.array_data.lock();
        data.pop()
    }

    /// Returns a clone of the top value without removing it.
    pub fn top(&self) -> Option<T>
    where
        T: Clone,
    {
        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            return self.link_data.top();
        }

        let data = self.array_data.lock();
        data.last().cloned()
    }

    /// Pre-allocates room for `n` more values in array mode; a no-op
    /// after promotion.
    pub fn reserve(&self, n: usize) {
        let _scope = OpScope::enter(self);
        self.maybe_promote();

        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            return;
        }

        let mut data = self.array_data.lock();
        data.reserve(n);
    }

    /// Whether the stack is empty at some recent linearization point.
    pub fn is_empty(&self) -> bool {
        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            return self.link_data.is_empty();
        }

        self.array_data.lock().is_empty()
    }

    /// Number of values; advisory under concurrent mutation once the
    /// stack has promoted.
    pub fn len(&self) -> usize {
        let _mode = self.mode.read().unwrap_or_else(PoisonError::into_inner);

        if self.using_cas.load(Ordering::Acquire) {
            return self.link_data.len();
        }

        self.array_data.lock().len()
    }

    /// Whether the stack has migrated to the lock-free representation.
    /// Monotone: once `true`, `true` forever.
    #[inline]
    pub fn is_using_cas(&self) -> bool {
        self.using_cas.load(Ordering::Acquire)
    }
}
