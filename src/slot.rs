//! Hazard records and global registry state.
//!
//! The registry is a fixed-size, process-wide table of cache-line-padded
//! hazard records. A record is claimed by CAS-ing its owner field from
//! "unset" to the claiming thread's id, and returned by resetting both
//! fields. Reclaimers read every record's protected pointer without any
//! coordination; that snapshot is the sole input to a scan.

use crate::utils::CacheAligned;
use once_cell::race::OnceBox;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

/// Number of hazard records in the process-wide table: room for 32
/// queue-reading threads (two slots each); single-slot readers stretch
/// further. One table serves every container type in the process.
pub(crate) const MAX_HAZARDS: usize = 64;

/// Hazard slots each thread may own: slot 0 for head/tail-style single
/// protection, slot 1 for the queue's successor protection.
pub(crate) const SLOTS_PER_THREAD: usize = 2;

/// Retired nodes accumulated per thread before a scan runs.
pub(crate) const SCAN_THRESHOLD: usize = 64;

/// One hazard cell: the owning thread id plus the pointer it publishes.
///
/// `owner == 0` means the record is unclaimed. The protected pointer is a
/// publication channel: between a store to it and the reader's
/// revalidation of the source atomic, any reclaimer that still sees the
/// pointer as current must keep the node alive.
pub(crate) struct HazardRecord {
    pub(crate) owner: AtomicU64,
    pub(crate) protected: AtomicPtr<u8>,
}

impl HazardRecord {
    const fn unset() -> Self {
        Self {
            owner: AtomicU64::new(0),
            protected: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

/// Process-wide registry: the record table plus the thread id allocator.
pub(crate) struct Registry {
    records: [CacheAligned<HazardRecord>; MAX_HAZARDS],
    next_tid: AtomicU64,
}

impl Registry {
    fn new() -> Self {
        Self {
            records: std::array::from_fn(|_| CacheAligned::new(HazardRecord::unset())),
            // Thread ids start at 1; 0 marks an unclaimed record.
            next_tid: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh thread id. Ids are never recycled; freed records
    /// are reused by resetting their owner instead.
    #[inline]
    pub(crate) fn alloc_tid(&self) -> u64 {
        self.next_tid.fetch_add(1, Ordering::Relaxed)
    }

    /// Claim the first unowned record for `tid`.
    ///
    /// This is a static-capacity design: a full table is a configuration
    /// error, not a recoverable condition.
    pub(crate) fn acquire(&self, tid: u64) -> &HazardRecord {
        for record in &self.records {
            if record
                .owner
                .compare_exchange(0, tid, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return record;
            }
        }
        panic!(
            "istif: hazard table exhausted ({MAX_HAZARDS} records, up to {SLOTS_PER_THREAD} per thread)"
        );
    }

    /// Return a record to the table. The pointer is cleared before the
    /// owner so a concurrent scan never attributes a stale protection to
    /// the next claimant.
    pub(crate) fn release(&self, record: &HazardRecord) {
        record.protected.store(ptr::null_mut(), Ordering::Release);
        record.owner.store(0, Ordering::Release);
    }

    /// Snapshot every record's protected pointer.
    pub(crate) fn snapshot(&self, out: &mut [*mut u8; MAX_HAZARDS]) {
        for (slot, record) in out.iter_mut().zip(&self.records) {
            *slot = record.protected.load(Ordering::Acquire);
        }
    }
}

/// Global singleton instance
static GLOBAL: OnceBox<Registry> = OnceBox::new();

/// Get reference to the global registry
#[inline]
pub(crate) fn global() -> &'static Registry {
    GLOBAL.get_or_init(|| Box::new(Registry::new()))
}
