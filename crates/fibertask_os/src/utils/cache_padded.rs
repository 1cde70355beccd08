use std::fmt;
use std::ops::{Deref, DerefMut};

// Most common architectures have 64-byte cache lines. A few (notably Apple
// Silicon and some POWER variants) use wider 128-byte lines; padding to 128
// there too avoids false sharing on hardware that prefetches adjacent lines.
#[cfg_attr(
    any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    ),
    repr(align(128))
)]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        target_arch = "aarch64",
        target_arch = "powerpc64",
    )),
    repr(align(64))
)]
/// Pads and aligns a value so it occupies an entire cache line, preventing
/// false sharing when multiple `CachePadded<T>`s are adjacent in memory (as
/// in each worker's head/tail queue cursors).
pub struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    /// Wraps `value` in cache-line padding.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    /// Unwraps the padded value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for CachePadded<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePadded").field("value", &self.value).finish()
    }
}

impl<T: Default> Default for CachePadded<T> {
    fn default() -> Self {
        CachePadded::new(T::default())
    }
}

impl<T: Clone> Clone for CachePadded<T> {
    fn clone(&self) -> Self {
        CachePadded::new(self.value.clone())
    }
}

impl<T> From<T> for CachePadded<T> {
    fn from(value: T) -> Self {
        CachePadded::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::CachePadded;
    use std::mem::{align_of, size_of};

    #[test]
    fn pads_to_at_least_a_cache_line() {
        assert!(size_of::<CachePadded<u8>>() >= 64);
        assert!(align_of::<CachePadded<u8>>() >= 64);
    }

    #[test]
    fn derefs_to_inner_value() {
        let padded = CachePadded::new(42u32);
        assert_eq!(*padded, 42);
    }
}
