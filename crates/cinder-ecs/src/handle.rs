//! Generational handles and the dense/sparse pool that mints them.
//!
//! A [`Handle`] is a 64-bit value that packs a *generation* counter in the
//! high 32 bits and a slot *index* in the low 32 bits. The generation is
//! bumped every time a slot is released, so a copy of a released handle can
//! never alias the slot's next occupant.
//!
//! [`HandlePool`] keeps two parallel arrays:
//!
//! - `dense[0..len)` holds exactly the live handles; `dense[len..cap)` holds
//!   the next handle each free index will be reissued as.
//! - `sparse[index]` is the position of that index's handle inside `dense`.
//!
//! Allocation and release are both O(1): release swaps the freed handle with
//! the last live one, so the live range stays contiguous.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generation value reserved to mean "no handle".
pub const EMPTY_GENERATION: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// An opaque generational handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(u64);

impl Handle {
    /// The "no handle" value. Never returned by [`HandlePool::allocate`].
    pub const NONE: Handle = Handle::new(u32::MAX, EMPTY_GENERATION);

    /// Construct a handle from an index and generation.
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// The index portion (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Whether this is the reserved "no handle" value.
    #[inline]
    pub fn is_none(self) -> bool {
        self.generation() == EMPTY_GENERATION
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The same index with the next generation, skipping the reserved value.
    #[inline]
    fn next_generation(self) -> Self {
        let mut generation = self.generation().wrapping_add(1);
        if generation == EMPTY_GENERATION {
            generation = 0;
        }
        Self::new(self.index(), generation)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return f.write_str("Handle(none)");
        }
        write!(f, "Handle({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// HandlePool
// ---------------------------------------------------------------------------

/// Allocates and recycles [`Handle`]s with generational tracking.
///
/// Invariant: for every live handle `h`,
/// `dense[sparse[h.index()]] == h` and `sparse[h.index()] < len`.
#[derive(Debug, Clone)]
pub struct HandlePool {
    /// Live handles in `[0, len)`, next-to-issue handles in `[len, cap)`.
    dense: Vec<Handle>,
    /// Index -> position in `dense`.
    sparse: Vec<u32>,
    /// Number of live handles.
    len: usize,
}

impl HandlePool {
    /// Create a pool with room for `capacity` handles before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            dense: Vec::new(),
            sparse: Vec::new(),
            len: 0,
        };
        pool.grow_to(capacity);
        pool
    }

    /// Number of live handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no handle is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots before the next growth.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.dense.len()
    }

    /// Allocate a handle, doubling capacity first if the pool is full.
    ///
    /// The returned handle is either fresh (generation 0) or the recycled
    /// index with a bumped generation.
    pub fn allocate(&mut self) -> Handle {
        if self.len == self.dense.len() {
            let new_cap = (self.dense.len() * 2).max(1);
            self.grow_to(new_cap);
        }
        let handle = self.dense[self.len];
        debug_assert_eq!(self.sparse[handle.index() as usize] as usize, self.len);
        self.len += 1;
        handle
    }

    /// Release a live handle.
    ///
    /// The freed handle trades places with the last live handle so that
    /// `dense[0..len)` stays packed. Its index is reissued later with the
    /// next generation.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not currently valid.
    pub fn release(&mut self, handle: Handle) {
        assert!(
            self.is_valid(handle),
            "release of invalid handle {handle:?}"
        );
        let pos = self.sparse[handle.index() as usize] as usize;
        let last = self.len - 1;
        let moved = self.dense[last];

        self.dense[pos] = moved;
        self.sparse[moved.index() as usize] = pos as u32;

        self.dense[last] = handle.next_generation();
        self.sparse[handle.index() as usize] = last as u32;

        self.len = last;
    }

    /// Whether `handle` is live: its index maps into the live range and the
    /// stored handle matches exactly, generation included.
    #[inline]
    pub fn is_valid(&self, handle: Handle) -> bool {
        let idx = handle.index() as usize;
        if handle.is_none() || idx >= self.sparse.len() {
            return false;
        }
        let pos = self.sparse[idx] as usize;
        pos < self.len && self.dense[pos] == handle
    }

    /// The live handle at dense position `pos`.
    #[inline]
    pub fn handle_at(&self, pos: usize) -> Handle {
        debug_assert!(pos < self.len, "handle_at({pos}) outside live range {}", self.len);
        self.dense[pos]
    }

    /// The live handles, in swap-remove order.
    #[inline]
    pub fn live(&self) -> &[Handle] {
        &self.dense[..self.len]
    }

    /// Release every live handle, bumping each generation.
    pub fn clear(&mut self) {
        for pos in 0..self.len {
            self.dense[pos] = self.dense[pos].next_generation();
        }
        self.len = 0;
    }

    fn grow_to(&mut self, new_cap: usize) {
        let old_cap = self.dense.len();
        if new_cap <= old_cap {
            return;
        }
        assert!(
            new_cap <= u32::MAX as usize,
            "handle pool capacity {new_cap} exceeds the index range"
        );
        self.dense.reserve_exact(new_cap - old_cap);
        self.sparse.reserve_exact(new_cap - old_cap);
        for i in old_cap..new_cap {
            self.dense.push(Handle::new(i as u32, 0));
            self.sparse.push(i as u32);
        }
    }
}

impl Default for HandlePool {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_unique_indices() {
        let mut pool = HandlePool::with_capacity(4);
        let handles: Vec<Handle> = (0..100).map(|_| pool.allocate()).collect();
        let mut indices: Vec<u32> = handles.iter().map(|h| h.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
        assert_eq!(pool.len(), 100);
    }

    #[test]
    fn capacity_doubles_when_full() {
        let mut pool = HandlePool::with_capacity(2);
        pool.allocate();
        pool.allocate();
        assert_eq!(pool.capacity(), 2);
        pool.allocate();
        assert_eq!(pool.capacity(), 4);
    }

    #[test]
    fn zero_capacity_pool_grows() {
        let mut pool = HandlePool::with_capacity(0);
        let h = pool.allocate();
        assert!(pool.is_valid(h));
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut pool = HandlePool::with_capacity(1);
        let h0 = pool.allocate();
        assert_eq!(h0.generation(), 0);
        pool.release(h0);
        let h1 = pool.allocate();
        assert_eq!(h1.index(), h0.index());
        assert_eq!(h1.generation(), 1);
    }

    #[test]
    fn stale_handle_detected_after_recycle() {
        let mut pool = HandlePool::with_capacity(2);
        let h0 = pool.allocate();
        pool.release(h0);
        assert!(!pool.is_valid(h0));
        let h1 = pool.allocate();
        assert_eq!(h1.index(), h0.index());
        assert!(!pool.is_valid(h0), "stale handle valid after recycle");
        assert!(pool.is_valid(h1));
    }

    #[test]
    fn release_keeps_live_range_packed() {
        let mut pool = HandlePool::with_capacity(8);
        let a = pool.allocate();
        let b = pool.allocate();
        let c = pool.allocate();
        pool.release(a);
        assert_eq!(pool.len(), 2);
        let live = pool.live();
        assert!(live.contains(&b));
        assert!(live.contains(&c));
        // c was last, so it moved into a's position.
        assert_eq!(pool.handle_at(0), c);
    }

    #[test]
    #[should_panic(expected = "release of invalid handle")]
    fn double_release_panics() {
        let mut pool = HandlePool::with_capacity(2);
        let h = pool.allocate();
        pool.release(h);
        pool.release(h);
    }

    #[test]
    fn none_is_never_valid() {
        let mut pool = HandlePool::with_capacity(2);
        pool.allocate();
        assert!(!pool.is_valid(Handle::NONE));
        assert!(Handle::NONE.is_none());
        assert_eq!(Handle::default(), Handle::NONE);
    }

    #[test]
    fn generation_skips_reserved_value() {
        let h = Handle::new(3, EMPTY_GENERATION - 1);
        let next = h.next_generation();
        assert_eq!(next.index(), 3);
        assert_eq!(next.generation(), 0);
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut pool = HandlePool::with_capacity(4);
        let hs: Vec<_> = (0..3).map(|_| pool.allocate()).collect();
        pool.clear();
        assert!(pool.is_empty());
        for h in hs {
            assert!(!pool.is_valid(h));
        }
    }

    #[test]
    fn handle_roundtrip() {
        let h = Handle::new(42, 7);
        assert_eq!(h.index(), 42);
        assert_eq!(h.generation(), 7);
        assert_eq!(Handle::from_raw(h.to_raw()), h);
        assert_eq!(format!("{h}"), "42v7");
    }
}
