//! Checkpoint list wrapper.

use std::sync::Arc;

use bitflags::bitflags;

use super::def::CheckpointDef;
use crate::error::{MomentError, Result};
use crate::moment::{
    cancel_full_groups, try_from_bits, DeleteOutcome, DeletePolicy, FilterGroup, MomentId,
    MomentListFlags, MomentObj, MomentObjList,
};
use crate::types::{CheckpointHandle, DomainRef};

bitflags! {
    /// Listing flags accepted by the public checkpoint API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CheckpointListFlags: u32 {
        /// No filtering.
        const NONE = 0;
        /// Without a starting checkpoint: only roots.
        const ROOTS = 1 << 0;
        /// With a starting checkpoint: all descendants.
        const DESCENDANTS = 1 << 0;
        /// Every parent is listed before its children.
        const TOPOLOGICAL = 1 << 1;
        /// Only checkpoints without children.
        const LEAVES = 1 << 2;
        /// Only checkpoints with children.
        const NO_LEAVES = 1 << 3;

        /// The leaf filter group.
        const FILTERS_LEAVES = Self::LEAVES.bits() | Self::NO_LEAVES.bits();
        /// Every known bit.
        const ALL = Self::ROOTS.bits() | Self::TOPOLOGICAL.bits() | Self::FILTERS_LEAVES.bits();
    }
}

/// Filter groups of the public checkpoint flags.
pub const CHECKPOINT_FILTER_GROUPS: &[FilterGroup] = &[FilterGroup {
    name: "leaves",
    mask: CheckpointListFlags::FILTERS_LEAVES.bits(),
}];

const CHECKPOINT_TO_MOMENT: &[(CheckpointListFlags, MomentListFlags)] = &[
    (CheckpointListFlags::ROOTS, MomentListFlags::ROOTS),
    (CheckpointListFlags::TOPOLOGICAL, MomentListFlags::TOPOLOGICAL),
    (CheckpointListFlags::LEAVES, MomentListFlags::LEAVES),
    (CheckpointListFlags::NO_LEAVES, MomentListFlags::NO_LEAVES),
];

impl CheckpointListFlags {
    /// Validate caller bits and translate them to generic tree flags.
    pub fn to_moment_flags(bits: u32) -> Result<MomentListFlags> {
        let flags: Self = try_from_bits(bits)?;
        let flags =
            Self::from_bits_truncate(cancel_full_groups(flags.bits(), CHECKPOINT_FILTER_GROUPS));
        Ok(CHECKPOINT_TO_MOMENT
            .iter()
            .filter(|(public, _)| flags.contains(*public))
            .fold(MomentListFlags::NONE, |acc, (_, moment)| acc | *moment))
    }
}

/// The checkpoint forest of one domain.
#[derive(Debug, Default)]
pub struct CheckpointObjList {
    base: MomentObjList<CheckpointDef>,
}

impl CheckpointObjList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> &MomentObjList<CheckpointDef> {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut MomentObjList<CheckpointDef> {
        &mut self.base
    }

    pub fn assign_def(&mut self, def: CheckpointDef) -> Result<MomentId> {
        def.validate()?;
        self.base.assign_def(def)
    }

    pub fn find_by_name(&self, name: &str) -> Option<MomentId> {
        self.base.find_by_name(name)
    }

    pub fn get(&self, id: MomentId) -> Option<&MomentObj<CheckpointDef>> {
        self.base.get(id)
    }

    pub fn size(&self) -> usize {
        self.base.size()
    }

    pub fn current(&self) -> Option<MomentId> {
        self.base.current()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.base.current_name()
    }

    pub fn set_current(&mut self, id: Option<MomentId>) {
        self.base.set_current(id)
    }

    pub fn remove(&mut self, id: MomentId) -> bool {
        self.base.remove(id)
    }

    pub fn remove_all(&mut self) {
        self.base.remove_all()
    }

    /// Rebuild relations and return the leaf of the forest when it is a
    /// single chain, the natural candidate for the current checkpoint.
    pub fn update_relations(&mut self) -> Result<Option<MomentId>> {
        self.base.update_relations()?;
        Ok(self.base.find_leaf())
    }

    pub fn delete(&mut self, id: MomentId, policy: DeletePolicy) -> Result<DeleteOutcome> {
        self.base.delete(id, policy)
    }

    pub fn get_names(&self, from: Option<MomentId>, flags: u32) -> Result<Vec<String>> {
        let flags = CheckpointListFlags::to_moment_flags(flags)?;
        self.base.get_names(from, flags, |_| true)
    }

    pub fn num(&self, from: Option<MomentId>, flags: u32) -> Result<usize> {
        let flags = CheckpointListFlags::to_moment_flags(flags)?;
        Ok(self.base.num(from, flags, |_| true))
    }

    /// Public handles for the listed checkpoints, all or nothing.
    pub fn list_checkpoints(
        &self,
        from: Option<MomentId>,
        domain: &Arc<DomainRef>,
        flags: u32,
    ) -> Result<Vec<CheckpointHandle>> {
        let names = self.get_names(from, flags)?;
        let mut handles = Vec::new();
        handles
            .try_reserve_exact(names.len())
            .map_err(|_| MomentError::AllocationFailed)?;
        for name in &names {
            handles.push(CheckpointHandle::new(Arc::clone(domain), name)?);
        }
        Ok(handles)
    }
}
