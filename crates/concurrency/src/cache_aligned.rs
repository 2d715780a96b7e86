//! Cache-line padding for hot shared words
//!
//! Lock words, partition latches and per-worker counters sit next to each
//! other in arrays. Wrapping each one in [`CacheAligned`] gives it a cache
//! line of its own so that workers hammering neighbouring slots do not
//! invalidate each other's lines.

use static_assertions::const_assert_eq;

/// Cache line size in bytes (x86-64 and AArch64).
pub const CACHE_LINE_BYTES: usize = 64;

/// Wraps a value so it starts on, and fills, whole cache lines.
#[repr(C, align(64))]
pub struct CacheAligned<T> {
    value: T,
}

const_assert_eq!(std::mem::align_of::<CacheAligned<u8>>(), CACHE_LINE_BYTES);
const_assert_eq!(std::mem::size_of::<CacheAligned<u64>>(), CACHE_LINE_BYTES);

impl<T> CacheAligned<T> {
    /// Wrap `value`.
    #[inline]
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    /// Unwrap, returning the inner value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Default> Default for CacheAligned<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> std::ops::DerefMut for CacheAligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}
