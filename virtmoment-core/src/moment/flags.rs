//! Structural listing flags understood by the generic moment tree.

use bitflags::{bitflags, Flags};

use crate::error::{MomentError, Result};

/// Build a flag set from raw caller bits, rejecting unknown ones.
pub fn try_from_bits<F: Flags<Bits = u32>>(bits: u32) -> Result<F> {
    F::from_bits(bits).ok_or(MomentError::InvalidFlags {
        flags: bits,
        supported: F::all().bits(),
    })
}

bitflags! {
    /// Listing flags of [`MomentObjList::get_names`](super::MomentObjList::get_names).
    ///
    /// These only cover the tree shape. Type specific filtering (snapshot
    /// state, location) is expressed through the predicate passed alongside.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MomentListFlags: u32 {
        /// No filtering, insertion order.
        const NONE = 0;
        /// Without a starting moment: only entries at the top of the forest.
        const ROOTS = 1 << 0;
        /// With a starting moment: all descendants instead of direct children.
        const DESCENDANTS = 1 << 0;
        /// Every parent is listed before its children.
        const TOPOLOGICAL = 1 << 1;
        /// Only moments without children.
        const LEAVES = 1 << 2;
        /// Only moments with children.
        const NO_LEAVES = 1 << 3;
        /// Only moments that carry metadata.
        const METADATA = 1 << 4;
        /// Only moments without metadata.
        const NO_METADATA = 1 << 5;

        /// The leaf filter group.
        const FILTERS_LEAVES = Self::LEAVES.bits() | Self::NO_LEAVES.bits();
        /// The metadata filter group.
        const FILTERS_METADATA = Self::METADATA.bits() | Self::NO_METADATA.bits();
        /// Every known bit.
        const ALL = Self::ROOTS.bits()
            | Self::TOPOLOGICAL.bits()
            | Self::FILTERS_LEAVES.bits()
            | Self::FILTERS_METADATA.bits();
    }
}

/// A set of mutually exclusive filter bits.
///
/// Setting every bit of a group asks for "this or that or the other",
/// which is the same as not filtering on the group at all. Treating the
/// full group as empty lets callers pass every bit they know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterGroup {
    /// Group name, for diagnostics.
    pub name: &'static str,
    /// All bits belonging to the group.
    pub mask: u32,
}

/// Filter groups of the generic listing flags.
pub const MOMENT_FILTER_GROUPS: &[FilterGroup] = &[
    FilterGroup {
        name: "leaves",
        mask: MomentListFlags::FILTERS_LEAVES.bits(),
    },
    FilterGroup {
        name: "metadata",
        mask: MomentListFlags::FILTERS_METADATA.bits(),
    },
];

/// Clear every group of `groups` whose bits are all set in `flags`.
pub fn cancel_full_groups(mut flags: u32, groups: &[FilterGroup]) -> u32 {
    for group in groups {
        if flags & group.mask == group.mask {
            flags &= !group.mask;
        }
    }
    flags
}
