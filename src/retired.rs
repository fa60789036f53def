//! Type-erased entries for the per-thread retire lists.

/// Type-erased deallocation function
pub(crate) type DeallocFn = unsafe fn(*mut u8);

/// A node unlinked from its container, awaiting deferred reclamation.
///
/// The entry pairs the erased node pointer with a monomorphized
/// deallocator so a single retire list can serve every container type.
/// Dropping a `Retired` without calling [`free`](Retired::free) leaks the
/// node; the thread-teardown path relies on exactly that for nodes still
/// hazarded by other threads.
pub(crate) struct Retired {
    pub(crate) ptr: *mut u8,
    dealloc: DeallocFn,
}

impl Retired {
    /// Build an entry for a node allocated through `Box<N>`.
    ///
    /// # Safety
    ///
    /// - `ptr` must come from `Box::into_raw` and must not be freed by
    ///   any other path.
    /// - Dropping an `N` must not touch values already moved out of the
    ///   node (containers store them as `ManuallyDrop`/`MaybeUninit`) and
    ///   must not re-enter the reclamation system.
    pub(crate) unsafe fn new<N>(ptr: *mut N) -> Self {
        unsafe fn dealloc<N>(ptr: *mut u8) {
            // SAFETY: `ptr` was produced by Box::into_raw in the caller
            // of `Retired::new` and is freed at most once, by `free`.
            unsafe { drop(Box::from_raw(ptr as *mut N)) }
        }
        Self {
            ptr: ptr as *mut u8,
            dealloc: dealloc::<N> as DeallocFn,
        }
    }

    /// Free the node, consuming the entry.
    ///
    /// # Safety
    ///
    /// No hazard record may publish `self.ptr` at the time of the call.
    #[inline]
    pub(crate) unsafe fn free(self) {
        unsafe { (self.dealloc)(self.ptr) }
    }
}
