//! Public snapshot listing flags and their mapping onto the generic tree.

use bitflags::bitflags;

use super::def::{SnapshotDef, SnapshotState};
use crate::error::Result;
use crate::moment::{cancel_full_groups, try_from_bits, FilterGroup, MomentListFlags};

bitflags! {
    /// Listing flags accepted by the public snapshot API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SnapshotListFlags: u32 {
        /// No filtering.
        const NONE = 0;
        /// Without a starting snapshot: only roots.
        const ROOTS = 1 << 0;
        /// With a starting snapshot: all descendants.
        const DESCENDANTS = 1 << 0;
        /// Only snapshots with tracked metadata.
        const METADATA = 1 << 1;
        /// Only snapshots without children.
        const LEAVES = 1 << 2;
        /// Only snapshots with children.
        const NO_LEAVES = 1 << 3;
        /// Only snapshots without tracked metadata.
        const NO_METADATA = 1 << 4;
        /// Guest was shut off.
        const INACTIVE = 1 << 5;
        /// Guest was running, paused or otherwise alive.
        const ACTIVE = 1 << 6;
        /// Disks only, no guest state.
        const DISK_ONLY = 1 << 7;
        /// Every disk and the memory state live inside the images.
        const INTERNAL = 1 << 8;
        /// Memory or at least one disk lives in a separate file.
        const EXTERNAL = 1 << 9;
        /// Every parent is listed before its children.
        const TOPOLOGICAL = 1 << 10;

        /// The metadata filter group.
        const FILTERS_METADATA = Self::METADATA.bits() | Self::NO_METADATA.bits();
        /// The leaf filter group.
        const FILTERS_LEAVES = Self::LEAVES.bits() | Self::NO_LEAVES.bits();
        /// The guest status filter group.
        const FILTERS_STATUS =
            Self::INACTIVE.bits() | Self::ACTIVE.bits() | Self::DISK_ONLY.bits();
        /// The storage location filter group.
        const FILTERS_LOCATION = Self::INTERNAL.bits() | Self::EXTERNAL.bits();

        /// Every known bit.
        const ALL = Self::ROOTS.bits()
            | Self::TOPOLOGICAL.bits()
            | Self::FILTERS_METADATA.bits()
            | Self::FILTERS_LEAVES.bits()
            | Self::FILTERS_STATUS.bits()
            | Self::FILTERS_LOCATION.bits();
    }
}

/// Filter groups of the public snapshot flags.
pub const SNAPSHOT_FILTER_GROUPS: &[FilterGroup] = &[
    FilterGroup {
        name: "metadata",
        mask: SnapshotListFlags::FILTERS_METADATA.bits(),
    },
    FilterGroup {
        name: "leaves",
        mask: SnapshotListFlags::FILTERS_LEAVES.bits(),
    },
    FilterGroup {
        name: "status",
        mask: SnapshotListFlags::FILTERS_STATUS.bits(),
    },
    FilterGroup {
        name: "location",
        mask: SnapshotListFlags::FILTERS_LOCATION.bits(),
    },
];

/// Public bit to generic bit. Bits missing here are snapshot specific and
/// handled by [`SnapshotFilter`].
const SNAPSHOT_TO_MOMENT: &[(SnapshotListFlags, MomentListFlags)] = &[
    (SnapshotListFlags::ROOTS, MomentListFlags::ROOTS),
    (SnapshotListFlags::TOPOLOGICAL, MomentListFlags::TOPOLOGICAL),
    (SnapshotListFlags::LEAVES, MomentListFlags::LEAVES),
    (SnapshotListFlags::NO_LEAVES, MomentListFlags::NO_LEAVES),
    (SnapshotListFlags::METADATA, MomentListFlags::METADATA),
    (SnapshotListFlags::NO_METADATA, MomentListFlags::NO_METADATA),
];

impl SnapshotListFlags {
    /// Validate caller bits and cancel every fully set filter group.
    pub fn normalize(bits: u32) -> Result<Self> {
        let flags: Self = try_from_bits(bits)?;
        Ok(Self::from_bits_truncate(cancel_full_groups(
            flags.bits(),
            SNAPSHOT_FILTER_GROUPS,
        )))
    }

    /// The generic tree flags these public flags translate to.
    pub fn to_moment_flags(self) -> MomentListFlags {
        SNAPSHOT_TO_MOMENT
            .iter()
            .filter(|(public, _)| self.contains(*public))
            .fold(MomentListFlags::NONE, |acc, (_, moment)| acc | *moment)
    }

    /// The snapshot specific part of these flags.
    pub fn filter(self) -> SnapshotFilter {
        SnapshotFilter {
            flags: self & (Self::FILTERS_STATUS | Self::FILTERS_LOCATION),
        }
    }
}

/// Predicate over snapshot state and location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotFilter {
    flags: SnapshotListFlags,
}

impl SnapshotFilter {
    /// Whether `def` passes the status and location filters.
    pub fn matches(&self, def: &SnapshotDef) -> bool {
        let flags = self.flags;
        if flags.is_empty() {
            return true;
        }

        if flags.intersects(SnapshotListFlags::FILTERS_STATUS) {
            let wanted = match def.state {
                SnapshotState::Shutoff => SnapshotListFlags::INACTIVE,
                SnapshotState::DiskSnapshot => SnapshotListFlags::DISK_ONLY,
                _ => SnapshotListFlags::ACTIVE,
            };
            if !flags.contains(wanted) {
                return false;
            }
        }

        let external = def.is_external();
        if flags.contains(SnapshotListFlags::INTERNAL) && external {
            return false;
        }
        if flags.contains(SnapshotListFlags::EXTERNAL) && !external {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::def::SnapshotLocation;

    #[test]
    fn test_public_bit_values() {
        assert_eq!(SnapshotListFlags::ROOTS.bits(), 1);
        assert_eq!(SnapshotListFlags::METADATA.bits(), 2);
        assert_eq!(SnapshotListFlags::NO_METADATA.bits(), 16);
        assert_eq!(SnapshotListFlags::EXTERNAL.bits(), 512);
        assert_eq!(SnapshotListFlags::TOPOLOGICAL.bits(), 1024);
        assert_eq!(SnapshotListFlags::ALL.bits(), 0x7ff);
    }

    #[test]
    fn test_unknown_bits_rejected() {
        assert!(SnapshotListFlags::normalize(1 << 11).is_err());
        assert!(SnapshotListFlags::normalize(0x7ff).is_ok());
    }

    #[test]
    fn test_full_groups_cancel() {
        let flags = SnapshotListFlags::normalize(SnapshotListFlags::ALL.bits()).unwrap();
        assert_eq!(flags, SnapshotListFlags::ROOTS | SnapshotListFlags::TOPOLOGICAL);

        let flags = SnapshotListFlags::normalize(
            (SnapshotListFlags::INACTIVE | SnapshotListFlags::ACTIVE).bits(),
        )
        .unwrap();
        assert_eq!(flags, SnapshotListFlags::INACTIVE | SnapshotListFlags::ACTIVE);
    }

    #[test]
    fn test_translation_table() {
        let public = SnapshotListFlags::ROOTS
            | SnapshotListFlags::METADATA
            | SnapshotListFlags::NO_LEAVES
            | SnapshotListFlags::TOPOLOGICAL
            | SnapshotListFlags::EXTERNAL;
        assert_eq!(
            public.to_moment_flags(),
            MomentListFlags::ROOTS
                | MomentListFlags::METADATA
                | MomentListFlags::NO_LEAVES
                | MomentListFlags::TOPOLOGICAL
        );
        assert_eq!(
            SnapshotListFlags::NO_METADATA.to_moment_flags(),
            MomentListFlags::NO_METADATA
        );
        assert!(SnapshotListFlags::FILTERS_STATUS.to_moment_flags().is_empty());
    }

    #[test]
    fn test_status_filter() {
        let shutoff = SnapshotDef::new("a").with_state(SnapshotState::Shutoff);
        let running = SnapshotDef::new("b").with_state(SnapshotState::Running);
        let paused = SnapshotDef::new("c").with_state(SnapshotState::Paused);
        let disk = SnapshotDef::new("d").with_state(SnapshotState::DiskSnapshot);

        let inactive = SnapshotListFlags::INACTIVE.filter();
        assert!(inactive.matches(&shutoff));
        assert!(!inactive.matches(&running));

        let active = SnapshotListFlags::ACTIVE.filter();
        assert!(active.matches(&running));
        assert!(active.matches(&paused));
        assert!(!active.matches(&disk));

        let either = (SnapshotListFlags::INACTIVE | SnapshotListFlags::DISK_ONLY).filter();
        assert!(either.matches(&shutoff));
        assert!(either.matches(&disk));
        assert!(!either.matches(&running));
    }

    #[test]
    fn test_location_filter() {
        let internal = SnapshotDef::new("i").with_disk("vda", SnapshotLocation::Internal);
        let external = SnapshotDef::new("e").with_disk("vda", SnapshotLocation::External);

        assert!(SnapshotListFlags::INTERNAL.filter().matches(&internal));
        assert!(!SnapshotListFlags::INTERNAL.filter().matches(&external));
        assert!(SnapshotListFlags::EXTERNAL.filter().matches(&external));
        assert!(!SnapshotListFlags::EXTERNAL.filter().matches(&internal));
        assert!(SnapshotListFlags::NONE.filter().matches(&external));
    }
}
