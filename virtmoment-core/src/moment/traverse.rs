//! Filtered, optionally topological listing of moments.

use super::flags::{cancel_full_groups, MomentListFlags, MOMENT_FILTER_GROUPS};
use super::{MomentDef, MomentId, MomentObj, MomentObjList};
use crate::error::{MomentError, Result};

impl<D: MomentDef> MomentObjList<D> {
    /// Names of the moments selected by `from`, `flags` and `filter`.
    ///
    /// Without `from` the whole list is considered (only the top level
    /// with [`MomentListFlags::ROOTS`]); with `from` its direct children
    /// (all descendants with [`MomentListFlags::DESCENDANTS`]). Leaf
    /// filters look at the child count at call time, and `filter` gets the
    /// final say on every candidate. With [`MomentListFlags::TOPOLOGICAL`]
    /// each parent precedes its children; otherwise insertion order holds.
    pub fn get_names<F>(
        &self,
        from: Option<MomentId>,
        flags: MomentListFlags,
        filter: F,
    ) -> Result<Vec<String>>
    where
        F: Fn(&MomentObj<D>) -> bool,
    {
        let ids = self.get_ids(from, flags, filter)?;
        let mut names = Vec::new();
        names
            .try_reserve_exact(ids.len())
            .map_err(|_| MomentError::AllocationFailed)?;
        names.extend(
            ids.into_iter()
                .filter_map(|id| self.name_of(id))
                .map(str::to_string),
        );
        Ok(names)
    }

    /// Ids selected the same way as [`MomentObjList::get_names`].
    pub fn get_ids<F>(
        &self,
        from: Option<MomentId>,
        flags: MomentListFlags,
        filter: F,
    ) -> Result<Vec<MomentId>>
    where
        F: Fn(&MomentObj<D>) -> bool,
    {
        let mut ids = Vec::new();
        self.visit_matching(from, flags, filter, |id| ids.push(id));
        Ok(ids)
    }

    /// How many moments [`MomentObjList::get_names`] would return.
    pub fn num<F>(&self, from: Option<MomentId>, flags: MomentListFlags, filter: F) -> usize
    where
        F: Fn(&MomentObj<D>) -> bool,
    {
        let mut count = 0;
        self.visit_matching(from, flags, filter, |_| count += 1);
        count
    }

    fn visit_matching<F, S>(&self, from: Option<MomentId>, flags: MomentListFlags, filter: F, mut sink: S)
    where
        F: Fn(&MomentObj<D>) -> bool,
        S: FnMut(MomentId),
    {
        let flags = MomentListFlags::from_bits_truncate(cancel_full_groups(
            flags.bits(),
            MOMENT_FILTER_GROUPS,
        ));

        // Every moment tracked here carries metadata.
        if flags.contains(MomentListFlags::NO_METADATA) {
            return;
        }

        let candidates = match from {
            Some(from) => {
                if !self.contains(from) {
                    return;
                }
                if flags.contains(MomentListFlags::DESCENDANTS) {
                    self.descendants(from)
                } else {
                    self.children(from).to_vec()
                }
            }
            None if flags.contains(MomentListFlags::ROOTS) => self.roots().to_vec(),
            None if flags.contains(MomentListFlags::TOPOLOGICAL) => {
                let mut out = Vec::with_capacity(self.size());
                self.collect_preorder(self.roots(), &mut out);
                // Unlinked entries have no parent to come after, but may
                // still head a subtree left behind by `remove`.
                let unlinked: Vec<MomentId> = self
                    .iter()
                    .filter(|(_, obj)| !obj.is_linked())
                    .map(|(id, _)| id)
                    .collect();
                self.collect_preorder(&unlinked, &mut out);
                out
            }
            None => self.ids(),
        };

        for id in candidates {
            let Some(obj) = self.get(id) else { continue };
            if flags.contains(MomentListFlags::LEAVES) && obj.nchildren() > 0 {
                continue;
            }
            if flags.contains(MomentListFlags::NO_LEAVES) && obj.nchildren() == 0 {
                continue;
            }
            if filter(obj) {
                sink(id);
            }
        }
    }
}
