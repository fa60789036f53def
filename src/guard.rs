//! Thread-local hazard handle: protect/publish/clear, retire lists, scan.
//!
//! Every thread lazily claims up to [`SLOTS_PER_THREAD`] records from the
//! global table and keeps a private retire list. Readers run the
//! publish-then-revalidate dance through [`protect`]; unlinkers hand
//! nodes to [`retire`], which scans once the list reaches the threshold.
//! The handle's drop is the thread-exit releaser: one final scan, then
//! the records go back to the table.

use crate::retired::Retired;
use crate::slot::{HazardRecord, MAX_HAZARDS, SCAN_THRESHOLD, SLOTS_PER_THREAD, global};
use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Thread-local hazard state.
///
/// Records are claimed on first use and cached per local index. The
/// retire list is ordered; a node enters it exactly once and leaves by
/// being freed in a scan (or leaked at teardown if still hazarded).
struct Handle {
    /// Thread id (lazily allocated; 0 = unassigned)
    tid: Cell<u64>,
    records: [Cell<Option<&'static HazardRecord>>; SLOTS_PER_THREAD],
    retired: RefCell<Vec<Retired>>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            tid: Cell::new(0),
            records: [const { Cell::new(None) }; SLOTS_PER_THREAD],
            retired: RefCell::new(Vec::new()),
        }
    }

    #[inline]
    fn tid(&self) -> u64 {
        match self.tid.get() {
            0 => {
                let tid = global().alloc_tid();
                self.tid.set(tid);
                tid
            }
            tid => tid,
        }
    }

    /// Get or claim the record for a local slot index.
    #[inline]
    fn record(&self, index: usize) -> &'static HazardRecord {
        match self.records[index].get() {
            Some(record) => record,
            None => {
                let record = global().acquire(self.tid());
                self.records[index].set(Some(record));
                record
            }
        }
    }

    /// Publish-then-revalidate until the published snapshot is current.
    ///
    /// Any reclaimer retiring the node between the snapshot and the
    /// publication cannot free it, because its scan must observe the slot
    /// before freeing; any reclaimer retiring it after the publication is
    /// blocked by the hazard until the reader clears it.
    fn protect<N>(&self, index: usize, src: &AtomicPtr<N>) -> *mut N {
        let record = self.record(index);
        let mut snapshot = src.load(Ordering::Acquire);
        loop {
            record.protected.store(snapshot as *mut u8, Ordering::Release);
            let current = src.load(Ordering::Acquire);
            if current == snapshot {
                return snapshot;
            }
            snapshot = current;
        }
    }

    /// Raw publication without revalidation. The caller revalidates
    /// against whichever atomic governs its traversal.
    #[inline]
    fn publish<N>(&self, index: usize, ptr: *mut N) {
        self.record(index).protected.store(ptr as *mut u8, Ordering::Release);
    }

    #[inline]
    fn clear(&self, index: usize) {
        // Never claims a record: clearing an unused slot is a no-op.
        if let Some(record) = self.records[index].get() {
            record.protected.store(ptr::null_mut(), Ordering::Release);
        }
    }

    fn clear_all(&self) {
        for index in 0..SLOTS_PER_THREAD {
            self.clear(index);
        }
    }

    fn retire(&self, entry: Retired) {
        let mut retired = self.retired.borrow_mut();
        retired.push(entry);
        if retired.len() >= SCAN_THRESHOLD {
            Self::scan(&mut retired);
        }
    }

    /// Partition the retire list against a snapshot of every hazard slot:
    /// hazarded nodes stay, everything else is freed. Thread-local; no
    /// coordination with other threads' retire lists.
    fn scan(retired: &mut Vec<Retired>) {
        let mut hazards = [ptr::null_mut(); MAX_HAZARDS];
        global().snapshot(&mut hazards);

        let mut kept = Vec::new();
        for entry in retired.drain(..) {
            if hazards.contains(&entry.ptr) {
                kept.push(entry);
            } else {
                // SAFETY: the node was unlinked before retirement and no
                // hazard record publishes it in this snapshot. A reader
                // that loads the pointer from now on must revalidate its
                // source, which no longer reaches this node.
                unsafe { entry.free() };
            }
        }
        *retired = kept;
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // Final scan frees whatever is safe. Survivors are still hazarded
        // by other threads and leak: the teardown path cannot wait.
        let retired = self.retired.get_mut();
        Self::scan(retired);
        retired.clear();

        for cell in &self.records {
            if let Some(record) = cell.get() {
                global().release(record);
            }
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

/// Protect: publish the current value of `src` into local slot `index`
/// and revalidate until stable.
#[inline]
pub(crate) fn protect<N>(index: usize, src: &AtomicPtr<N>) -> *mut N {
    // During process teardown TLS may be destroyed. Fall back to a raw
    // load; the only threads running then are past any shared mutation.
    HANDLE
        .try_with(|handle| handle.protect(index, src))
        .unwrap_or_else(|_| src.load(Ordering::Acquire))
}

/// Publish `ptr` into local slot `index` without revalidation.
#[inline]
pub(crate) fn publish<N>(index: usize, ptr: *mut N) {
    let _ = HANDLE.try_with(|handle| handle.publish(index, ptr));
}

/// Clear local slot `index`.
#[inline]
pub(crate) fn clear(index: usize) {
    let _ = HANDLE.try_with(|handle| handle.clear(index));
}

/// Clear every local slot.
#[inline]
pub(crate) fn clear_all() {
    let _ = HANDLE.try_with(|handle| handle.clear_all());
}

/// Retire an unlinked node for deferred reclamation.
///
/// # Safety
///
/// - `ptr` must come from `Box::into_raw` and be unreachable from its
///   container (no new reader can load it after revalidation).
/// - The node must not be retired more than once.
/// - Dropping an `N` must not touch values already moved out of it and
///   must not re-enter the reclamation system.
#[inline]
pub(crate) unsafe fn retire<N>(ptr: *mut N) {
    // SAFETY: forwarded contract.
    let entry = unsafe { Retired::new(ptr) };
    // During process teardown TLS may be destroyed; the entry is dropped
    // without freeing, leaking the node to the OS.
    let _ = HANDLE.try_with(|handle| handle.retire(entry));
}

/// Run one reclamation scan over the calling thread's retire list.
///
/// Frees every retired node that no hazard slot currently protects and
/// keeps the rest queued. Container destructors call this so a drop on a
/// quiescent container promptly returns node memory; long-running threads
/// that stop using the containers may call it for the same reason.
///
/// This only covers nodes retired by the calling thread. Other threads
/// drain their own lists on their next scan or at thread exit.
pub fn flush() {
    let _ = HANDLE.try_with(|handle| Handle::scan(&mut handle.retired.borrow_mut()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    struct Tracked {
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn retire_tracked(drops: &Arc<AtomicUsize>) -> *mut Tracked {
        let node = Box::into_raw(Box::new(Tracked {
            drops: drops.clone(),
        }));
        unsafe { retire(node) };
        node
    }

    #[test]
    fn test_flush_frees_unhazarded_nodes() {
        let drops = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            retire_tracked(&drops);
        }
        flush();
        assert_eq!(drops.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_scan_keeps_hazarded_node() {
        let drops = Arc::new(AtomicUsize::new(0));
        let node = retire_tracked(&drops);

        publish(0, node);
        flush();
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        clear(0);
        flush();
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_threshold_triggers_scan() {
        // Start from an empty retire list so the count below is exact.
        flush();
        let drops = Arc::new(AtomicUsize::new(0));
        for _ in 0..SCAN_THRESHOLD {
            retire_tracked(&drops);
        }
        // The final retire crossed the threshold and scanned on its own.
        assert_eq!(drops.load(Ordering::Relaxed), SCAN_THRESHOLD);
    }

    #[test]
    fn test_protect_returns_current_value() {
        let target = Box::into_raw(Box::new(7usize));
        let src = AtomicPtr::new(target);
        assert_eq!(protect(0, &src), target);
        clear(0);
        unsafe { drop(Box::from_raw(target)) };
    }
}
