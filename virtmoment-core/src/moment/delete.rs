//! Deleting moments while keeping the forest connected.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MomentDef, MomentId, MomentObjList};
use crate::error::{MomentError, Result};

/// What happens to the descendants of a deleted moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Delete the moment only; its children move up to its parent.
    #[default]
    Reparent,
    /// Delete the moment and all of its descendants.
    Children,
    /// Delete all descendants but keep the moment itself.
    ChildrenOnly,
}

/// Result of [`MomentObjList::delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Deleted moments, each one after all of its descendants.
    pub removed: Vec<String>,
    /// Moments whose recorded parent was rewritten by reattachment.
    pub reparented: Vec<String>,
    /// Whether the current moment changed.
    pub current_changed: bool,
    /// The current moment afterwards.
    pub current: Option<String>,
}

impl<D: MomentDef> MomentObjList<D> {
    /// Delete `id` according to `policy`.
    ///
    /// When the current moment goes away, the nearest surviving ancestor
    /// becomes current: the parent of `id` for [`DeletePolicy::Reparent`]
    /// and [`DeletePolicy::Children`], `id` itself for
    /// [`DeletePolicy::ChildrenOnly`]. A deleted root leaves no current
    /// moment.
    pub fn delete(&mut self, id: MomentId, policy: DeletePolicy) -> Result<DeleteOutcome> {
        let obj = self
            .get(id)
            .ok_or_else(|| MomentError::Internal("delete of removed moment".to_string()))?;
        let parent = obj.parent();
        let name = obj.name().to_string();
        let current_before = self.current();

        let mut outcome = DeleteOutcome::default();

        match policy {
            DeletePolicy::Reparent => {
                outcome.reparented = self.reparent_children(id, parent);
                self.remove(id);
                outcome.removed.push(name.clone());
            }
            DeletePolicy::Children | DeletePolicy::ChildrenOnly => {
                let mut doomed = self.descendants(id);
                // Post-order: every moment goes after its descendants.
                doomed.reverse();
                for victim in doomed {
                    if let Some(victim_name) = self.name_of(victim).map(str::to_string) {
                        self.remove(victim);
                        outcome.removed.push(victim_name);
                    }
                }
                if policy == DeletePolicy::Children {
                    self.remove(id);
                    outcome.removed.push(name.clone());
                }
            }
        }

        if let Some(current) = current_before {
            if !self.contains(current) {
                let survivor = match policy {
                    DeletePolicy::ChildrenOnly => Some(id),
                    DeletePolicy::Reparent | DeletePolicy::Children => parent,
                };
                self.set_current(survivor);
                outcome.current_changed = true;
            }
        }
        outcome.current = self.current_name().map(str::to_string);

        debug!(
            moment = %name,
            policy = ?policy,
            removed = outcome.removed.len(),
            reparented = outcome.reparented.len(),
            "Moment deleted"
        );
        Ok(outcome)
    }

    /// Move the children of `id` below `parent`, rewriting the parent name
    /// recorded in each child's definition. Returns the moved names.
    fn reparent_children(&mut self, id: MomentId, parent: Option<MomentId>) -> Vec<String> {
        let parent_name = parent.and_then(|p| self.name_of(p)).map(str::to_string);
        let children = self.children(id).to_vec();

        let mut moved = Vec::with_capacity(children.len());
        for child in children {
            if let Some(obj) = self.get_mut(child) {
                obj.def.set_parent_name(parent_name.clone());
                moved.push(obj.def.name().to_string());
            }
        }
        self.move_children(id, parent);
        moved
    }
}
