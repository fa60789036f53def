use std::ops::{Deref, DerefMut};

// Cache line sizes per architecture.
// x86/x86_64: 64B, aarch64: 128B (Apple M-series / Neoverse), s390x: 256B.
// Fallback: 64B (most common).

#[cfg(target_arch = "s390x")]
#[repr(align(256))]
#[derive(Default, Debug)]
pub(crate) struct CacheAligned<T> {
    pub(crate) data: T,
}

#[cfg(target_arch = "aarch64")]
#[repr(align(128))]
#[derive(Default, Debug)]
pub(crate) struct CacheAligned<T> {
    pub(crate) data: T,
}

#[cfg(not(any(target_arch = "s390x", target_arch = "aarch64")))]
#[repr(align(64))]
#[derive(Default, Debug)]
pub(crate) struct CacheAligned<T> {
    pub(crate) data: T,
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for CacheAligned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> CacheAligned<T> {
    pub(crate) const fn new(t: T) -> Self {
        Self { data: t }
    }
}
