//! Arena-backed container of moments with name index and current pointer.

use std::collections::HashMap;
use tracing::debug;

use super::{Link, MomentDef, MomentId, MomentObj};
use crate::error::{MomentError, Result};

/// Forest of moments belonging to one domain.
///
/// The list owns every entry and its definition. Iteration follows
/// insertion order. No locking happens here: the owner serializes
/// mutation against readers, typically under its per-domain lock.
#[derive(Debug, Clone)]
pub struct MomentObjList<D> {
    /// Insertion-ordered arena; removed entries leave a vacant slot until
    /// the next relation rebuild.
    slots: Vec<Option<MomentObj<D>>>,
    /// Name to slot index.
    names: HashMap<String, usize>,
    /// Entries linked at the top of the forest, in link order.
    roots: Vec<MomentId>,
    current: Option<MomentId>,
    epoch: u64,
}

impl<D> Default for MomentObjList<D> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            names: HashMap::new(),
            roots: Vec::new(),
            current: None,
            epoch: 0,
        }
    }
}

impl<D: MomentDef> MomentObjList<D> {
    /// Create an empty list with no current moment.
    pub fn new() -> Self {
        Self::default()
    }

    fn id_at(&self, index: usize) -> MomentId {
        MomentId { index, epoch: self.epoch }
    }

    /// Resolve an id, `None` if it was removed or belongs to an older epoch.
    pub fn get(&self, id: MomentId) -> Option<&MomentObj<D>> {
        if id.epoch != self.epoch {
            return None;
        }
        self.slots.get(id.index)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: MomentId) -> Option<&mut MomentObj<D>> {
        if id.epoch != self.epoch {
            return None;
        }
        self.slots.get_mut(id.index)?.as_mut()
    }

    /// Whether `id` still refers to an entry of this list.
    pub fn contains(&self, id: MomentId) -> bool {
        self.get(id).is_some()
    }

    /// Name of the entry behind `id`.
    pub fn name_of(&self, id: MomentId) -> Option<&str> {
        self.get(id).map(MomentObj::name)
    }

    /// Wrap `def` in a new, unlinked entry.
    ///
    /// Fails without touching the list when the name is taken or room for
    /// the entry cannot be reserved.
    pub fn assign_def(&mut self, def: D) -> Result<MomentId> {
        let name = def.name().to_string();
        if self.names.contains_key(&name) {
            return Err(MomentError::DuplicateName(name));
        }

        self.slots
            .try_reserve(1)
            .map_err(|_| MomentError::AllocationFailed)?;
        self.names
            .try_reserve(1)
            .map_err(|_| MomentError::AllocationFailed)?;

        let index = self.slots.len();
        self.slots.push(Some(MomentObj::new(def)));
        debug!(moment = %name, "Moment assigned");
        self.names.insert(name, index);

        Ok(self.id_at(index))
    }

    /// Exact lookup by name.
    pub fn find_by_name(&self, name: &str) -> Option<MomentId> {
        self.names.get(name).map(|&index| self.id_at(index))
    }

    /// Lookup by name returning the entry itself.
    pub fn get_by_name(&self, name: &str) -> Option<&MomentObj<D>> {
        self.find_by_name(name).and_then(|id| self.get(id))
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.names.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (MomentId, &MomentObj<D>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(move |(index, slot)| slot.as_ref().map(|obj| (self.id_at(index), obj)))
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<MomentId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Entries linked at the top of the forest.
    pub fn roots(&self) -> &[MomentId] {
        &self.roots
    }

    /// Direct children of `id`; empty for unknown ids.
    pub fn children(&self, id: MomentId) -> &[MomentId] {
        self.get(id).map(MomentObj::children).unwrap_or(&[])
    }

    /// Visit every entry, stopping at the first error the visitor returns.
    pub fn for_each<E, F>(&self, mut visitor: F) -> std::result::Result<(), E>
    where
        F: FnMut(&str, &MomentObj<D>) -> std::result::Result<(), E>,
    {
        for (_, obj) in self.iter() {
            visitor(obj.name(), obj)?;
        }
        Ok(())
    }

    /// Visit the direct children of `id`.
    pub fn for_each_child<E, F>(&self, id: MomentId, mut visitor: F) -> std::result::Result<(), E>
    where
        F: FnMut(MomentId, &MomentObj<D>) -> std::result::Result<(), E>,
    {
        for &child in self.children(id) {
            if let Some(obj) = self.get(child) {
                visitor(child, obj)?;
            }
        }
        Ok(())
    }

    /// Visit all descendants of `id`, every parent before its children.
    pub fn for_each_descendant<E, F>(&self, id: MomentId, mut visitor: F) -> std::result::Result<(), E>
    where
        F: FnMut(MomentId, &MomentObj<D>) -> std::result::Result<(), E>,
    {
        for child in self.descendants(id) {
            if let Some(obj) = self.get(child) {
                visitor(child, obj)?;
            }
        }
        Ok(())
    }

    /// Descendants of `id` in pre-order.
    pub fn descendants(&self, id: MomentId) -> Vec<MomentId> {
        let mut out = Vec::new();
        self.collect_preorder(self.children(id), &mut out);
        out
    }

    /// Pre-order walk below `start`. The linked structure is kept acyclic,
    /// so the walk terminates.
    pub(crate) fn collect_preorder(&self, start: &[MomentId], out: &mut Vec<MomentId>) {
        let mut stack: Vec<MomentId> = start.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(obj) = self.get(id) {
                out.push(id);
                stack.extend(obj.children.iter().rev().copied());
            }
        }
    }

    // =========================================================================
    // Linkage primitives
    // =========================================================================

    /// Attach a detached entry under `link`. Does not check for cycles.
    pub(crate) fn attach(&mut self, id: MomentId, link: Link) {
        match link {
            Link::Detached => {}
            Link::Root => self.roots.push(id),
            Link::Child(parent) => {
                if !self.contains(parent) {
                    return self.attach(id, Link::Root);
                }
                if let Some(obj) = self.get_mut(parent) {
                    obj.children.push(id);
                }
            }
        }
        if let Some(obj) = self.get_mut(id) {
            obj.link = link;
        }
    }

    /// Unlink `id` from its parent (or from the roots), leaving it detached.
    pub fn drop_parent(&mut self, id: MomentId) {
        let link = match self.get(id) {
            Some(obj) => obj.link,
            None => return,
        };
        match link {
            Link::Detached => {}
            Link::Root => self.roots.retain(|&r| r != id),
            Link::Child(parent) => {
                if let Some(obj) = self.get_mut(parent) {
                    obj.children.retain(|&c| c != id);
                }
            }
        }
        if let Some(obj) = self.get_mut(id) {
            obj.link = Link::Detached;
        }
    }

    /// Forget all children of `id`; they are left detached.
    pub fn drop_children(&mut self, id: MomentId) {
        let children = match self.get_mut(id) {
            Some(obj) => std::mem::take(&mut obj.children),
            None => return,
        };
        for child in children {
            if let Some(obj) = self.get_mut(child) {
                obj.link = Link::Detached;
            }
        }
    }

    /// Reattach every child of `from` below `to` (`None` = top level).
    pub fn move_children(&mut self, from: MomentId, to: Option<MomentId>) {
        let children = match self.get_mut(from) {
            Some(obj) => std::mem::take(&mut obj.children),
            None => return,
        };
        let link = match to {
            Some(parent) if self.contains(parent) => Link::Child(parent),
            _ => Link::Root,
        };
        for child in children {
            if let Some(obj) = self.get_mut(child) {
                obj.link = Link::Detached;
            }
            self.attach(child, link);
        }
    }

    /// Link `id` below `parent` (`None` = top level), unlinking it first.
    ///
    /// Refuses to hang an entry below itself or one of its descendants.
    pub fn set_parent(&mut self, id: MomentId, parent: Option<MomentId>) -> Result<()> {
        let name = self
            .name_of(id)
            .ok_or_else(|| MomentError::Internal("set_parent on removed moment".to_string()))?
            .to_string();

        let link = match parent {
            None => Link::Root,
            Some(parent) => {
                if !self.contains(parent) {
                    return Err(MomentError::Internal(format!(
                        "parent of '{}' is not in the list",
                        name
                    )));
                }
                if parent == id || self.descendants(id).contains(&parent) {
                    return Err(MomentError::CycleDetected { name });
                }
                Link::Child(parent)
            }
        };

        self.drop_parent(id);
        self.attach(id, link);
        Ok(())
    }

    /// Unlink every entry, keeping the entries themselves.
    pub(crate) fn detach_all(&mut self) {
        self.roots.clear();
        for obj in self.slots.iter_mut().flatten() {
            obj.link = Link::Detached;
            obj.children.clear();
        }
    }

    /// Drop the vacant slots left by removals. Only valid while every
    /// entry is detached. Starts a new epoch, so older ids stop resolving.
    pub(crate) fn compact(&mut self) {
        let vacant = self.slots.len() - self.names.len();
        if vacant == 0 {
            return;
        }

        let current = self.current_name().map(str::to_string);
        self.slots.retain(Option::is_some);
        self.epoch += 1;

        self.names.clear();
        for (index, obj) in self.slots.iter().enumerate() {
            if let Some(obj) = obj {
                self.names.insert(obj.name().to_string(), index);
            }
        }
        self.current = current.and_then(|name| self.find_by_name(&name));
        debug!(vacant, "Moment slots compacted");
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove a single entry and its definition.
    ///
    /// The entry is unlinked from its parent so child counts stay exact.
    /// Its own children are left detached; reparent them first (see
    /// [`MomentObjList::delete`]). Returns whether the entry was current,
    /// in which case no moment is current afterwards.
    pub fn remove(&mut self, id: MomentId) -> bool {
        if !self.contains(id) {
            return false;
        }

        self.drop_parent(id);
        self.drop_children(id);

        if let Some(obj) = self.slots[id.index].take() {
            self.names.remove(obj.name());
            debug!(moment = %obj.name(), "Moment removed");
        }

        if self.current == Some(id) {
            self.current = None;
            return true;
        }
        false
    }

    /// Remove every entry, e.g. when the owning domain goes away.
    pub fn remove_all(&mut self) {
        let count = self.size();
        self.slots.clear();
        self.names.clear();
        self.roots.clear();
        self.current = None;
        self.epoch += 1;
        debug!(count, "All moments removed");
    }

    // =========================================================================
    // Current moment
    // =========================================================================

    /// The current moment, if any.
    pub fn current(&self) -> Option<MomentId> {
        self.current.filter(|&id| self.contains(id))
    }

    /// Name of the current moment, if any.
    pub fn current_name(&self) -> Option<&str> {
        self.current().and_then(|id| self.name_of(id))
    }

    /// Whether `name` is the current moment.
    pub fn is_current_name(&self, name: &str) -> bool {
        self.current_name() == Some(name)
    }

    /// Replace the current moment (`None` clears it).
    ///
    /// The id is not validated against the list; an id that does not
    /// resolve simply reads back as no current moment.
    pub fn set_current(&mut self, id: Option<MomentId>) {
        self.current = id;
    }
}
