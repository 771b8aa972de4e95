//! Single-slot scratch arena for transient decoder strings.
//!
//! Every string value, member name and number literal seen while decoding a
//! value is assembled in one fixed array. The arena hands out at most one
//! slot at a time:
//! - `request` grants a fresh slot (any previous grant is invalidated)
//! - `grow` extends the live slot in place, never copying
//! - `release` does nothing
//!
//! A request larger than the capacity is refused, so an oversized string
//! fails deterministically instead of allocating.
//!
//! # Example
//!
//! ```
//! use iotwire::protocol::ScratchArena;
//!
//! let mut arena = ScratchArena::new();
//! assert!(arena.request(16).is_some());
//! assert!(arena.grow(32).is_some());
//! assert!(arena.request(arena.capacity() + 1).is_none());
//! ```

/// Capacity of the scratch buffer in bytes.
pub const MAX_STRING_LEN: usize = 256;

/// Capability-checked arena backed by a fixed array.
///
/// No free-list and no persistence across requests. Content is NOT cleared
/// between grants; callers track the length they wrote.
pub struct ScratchArena {
    buf: [u8; MAX_STRING_LEN],
    /// Size of the live grant.
    granted: usize,
}

impl ScratchArena {
    /// Create an arena with a zeroed buffer.
    #[inline]
    pub const fn new() -> Self {
        Self {
            buf: [0u8; MAX_STRING_LEN],
            granted: 0,
        }
    }

    /// Buffer capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        MAX_STRING_LEN
    }

    /// Size of the current grant.
    #[inline]
    pub fn granted(&self) -> usize {
        self.granted
    }

    /// Grant a new slot of `size` bytes.
    ///
    /// Returns `None` if `size` exceeds the capacity.
    pub fn request(&mut self, size: usize) -> Option<&mut [u8]> {
        if size > MAX_STRING_LEN {
            return None;
        }
        self.granted = size;
        Some(&mut self.buf[..size])
    }

    /// Resize the live slot. Bytes already written stay where they are.
    pub fn grow(&mut self, size: usize) -> Option<&mut [u8]> {
        if size > MAX_STRING_LEN {
            return None;
        }
        self.granted = size;
        Some(&mut self.buf[..size])
    }

    /// Read access to the first `len` bytes of the live slot.
    #[inline]
    pub fn slot(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.granted)]
    }

    /// No-op; the next `request` reuses the buffer.
    #[inline]
    pub fn release(&mut self) {}
}

impl Default for ScratchArena {
    fn default() -> Self {
        Self::new()
    }
}
