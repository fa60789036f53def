//! TTAS (Test-Test-And-Set) spinlock.

use std::cell::UnsafeCell;
use std::hint::spin_loop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};

/// A cache-line-padded TTAS (Test-Test-And-Set) spinlock owning its data.
///
/// The lock word is a single `AtomicU32` (0 = free, 1 = held). `lock`
/// attempts an immediate acquire exchange and only falls into the spin
/// loop under contention, where it reads relaxed (staying in cache) and
/// issues a CPU spin hint each iteration before retrying the exchange.
///
/// Intended for short critical sections only; the holder is never
/// descheduled cooperatively.
// Alignment covers the largest destructive interference size among
// supported targets (aarch64: 128B), so the lock word never shares a
// line with neighboring state.
#[repr(align(128))]
pub struct TTas<T: ?Sized> {
    state: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for TTas<T> {}
unsafe impl<T: ?Sized + Send> Sync for TTas<T> {}

impl<T> TTas<T> {
    /// Create a new lock wrapping `data`.
    pub const fn new(data: T) -> Self {
        Self {
            state: AtomicU32::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Consume the lock and return the inner data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Acquire the lock, spinning until it is free.
    #[inline]
    pub fn lock(&self) -> TTasGuard<'_, T> {
        // Uncontended fast path: a single exchange.
        if self.state.swap(1, Ordering::Acquire) == 0 {
            return TTasGuard { ttas: self };
        }

        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.state.load(Ordering::Relaxed) != 0 {
                spin_loop();
            }
            // Test-and-set phase: attempt to acquire
            if self.state.swap(1, Ordering::Acquire) == 0 {
                return TTasGuard { ttas: self };
            }
        }
    }

    /// Attempt to acquire the lock with a single exchange.
    #[inline]
    pub fn try_lock(&self) -> Option<TTasGuard<'_, T>> {
        if self.state.swap(1, Ordering::Acquire) == 0 {
            Some(TTasGuard { ttas: self })
        } else {
            None
        }
    }

    /// Access the data without locking. Requires exclusive access.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// RAII guard for [`TTas`]. Releases the lock on drop.
pub struct TTasGuard<'a, T: ?Sized> {
    ttas: &'a TTas<T>,
}

impl<T: ?Sized> Deref for TTasGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.ttas.data.get() }
    }
}

impl<T: ?Sized> DerefMut for TTasGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.ttas.data.get() }
    }
}

impl<T: ?Sized> Drop for TTasGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.ttas.state.store(0, Ordering::Release);
    }
}
