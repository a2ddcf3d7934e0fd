//! Archetype masks and per-archetype slot layout.
//!
//! An [`Archetype`] is a bitmask over registered [`ComponentKind`]s. Every
//! distinct archetype gets its own [`ComponentPool`](crate::pool::ComponentPool)
//! whose slots are laid out by [`SlotLayout::compute`]: each present kind, in
//! increasing bit order, starts at the next multiple of [`SLOT_ALIGN`], and the
//! slot stride is rounded up to the same boundary.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use serde::{Deserialize, Serialize};

use crate::component::{ComponentKind, KindTable, MAX_KINDS};

/// Alignment of every component inside a slot, and of the slot stride.
pub const SLOT_ALIGN: usize = 16;

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// A set of component kinds, one bit per kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Archetype(u64);

impl Archetype {
    /// The empty set.
    pub const EMPTY: Archetype = Archetype(0);

    /// Build from raw bits.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// The archetype containing only `kind`.
    #[inline]
    pub fn of(kind: ComponentKind) -> Self {
        Self(kind.bit())
    }

    /// The archetype containing every kind in `kinds`.
    pub fn from_kinds(kinds: &[ComponentKind]) -> Self {
        kinds.iter().copied().collect()
    }

    /// A copy with `kind` added.
    #[inline]
    pub fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Whether `kind` is in the set.
    #[inline]
    pub fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether every kind in `other` is also in `self`.
    #[inline]
    pub fn contains_all(self, other: Archetype) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of kinds in the set.
    #[inline]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// The kinds in the set, lowest bit first.
    pub fn kinds(self) -> Kinds {
        Kinds(self.0)
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Archetype")?;
        f.debug_set().entries(self.kinds().map(|k| k.index())).finish()
    }
}

impl From<ComponentKind> for Archetype {
    fn from(kind: ComponentKind) -> Self {
        Self::of(kind)
    }
}

impl FromIterator<ComponentKind> for Archetype {
    fn from_iter<I: IntoIterator<Item = ComponentKind>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, kind| bits | kind.bit()))
    }
}

impl BitOr for Archetype {
    type Output = Archetype;
    fn bitor(self, rhs: Archetype) -> Archetype {
        Archetype(self.0 | rhs.0)
    }
}

impl BitOr<ComponentKind> for Archetype {
    type Output = Archetype;
    fn bitor(self, rhs: ComponentKind) -> Archetype {
        self.with(rhs)
    }
}

impl BitOr for ComponentKind {
    type Output = Archetype;
    fn bitor(self, rhs: ComponentKind) -> Archetype {
        Archetype(self.bit() | rhs.bit())
    }
}

impl BitOrAssign for Archetype {
    fn bitor_assign(&mut self, rhs: Archetype) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Archetype {
    type Output = Archetype;
    fn bitand(self, rhs: Archetype) -> Archetype {
        Archetype(self.0 & rhs.0)
    }
}

/// Set difference.
impl Sub for Archetype {
    type Output = Archetype;
    fn sub(self, rhs: Archetype) -> Archetype {
        Archetype(self.0 & !rhs.0)
    }
}

/// Iterator over the kinds of an [`Archetype`], lowest bit first.
#[derive(Debug, Clone)]
pub struct Kinds(u64);

impl Iterator for Kinds {
    type Item = ComponentKind;

    fn next(&mut self) -> Option<ComponentKind> {
        if self.0 == 0 {
            return None;
        }
        let index = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(ComponentKind(index as u8))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Kinds {}

// ---------------------------------------------------------------------------
// SlotLayout
// ---------------------------------------------------------------------------

/// Where one component kind lives inside a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentView {
    /// Byte offset from the start of the slot. Multiple of [`SLOT_ALIGN`].
    pub offset: usize,
    /// Byte size of the component.
    pub size: usize,
}

/// The view table and stride of one archetype.
///
/// A pure function of the archetype mask and the kind table's sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLayout {
    archetype: Archetype,
    views: [ComponentView; MAX_KINDS],
    stride: usize,
}

impl SlotLayout {
    /// Compute the layout of `archetype`.
    ///
    /// # Panics
    ///
    /// Panics if a kind in `archetype` is not registered in `kinds`.
    pub fn compute(archetype: Archetype, kinds: &KindTable) -> Self {
        let mut views = [ComponentView::default(); MAX_KINDS];
        let mut running = 0usize;
        for kind in archetype.kinds() {
            assert!(
                kinds.contains(kind),
                "{kind:?} in {archetype:?} is not registered"
            );
            let size = kinds.info(kind).size;
            let offset = align_up(running, SLOT_ALIGN);
            views[kind.index()] = ComponentView { offset, size };
            running = offset + size;
        }
        Self {
            archetype,
            views,
            stride: align_up(running, SLOT_ALIGN),
        }
    }

    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Slot size in bytes. Multiple of [`SLOT_ALIGN`]; zero when every kind
    /// is zero-sized.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The view of `kind`.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is not part of this layout's archetype.
    #[inline]
    pub fn view(&self, kind: ComponentKind) -> ComponentView {
        assert!(
            self.archetype.contains(kind),
            "{kind:?} is not part of {:?}",
            self.archetype
        );
        self.views[kind.index()]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
