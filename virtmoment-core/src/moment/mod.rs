//! Generic moment trees shared by snapshots and checkpoints.
//!
//! A moment is a named point-in-time record of a domain. Every moment
//! names its parent, and the set of moments of one domain forms a forest:
//!
//! ```text
//!            (roots)
//!           /       \
//!         S1         S4
//!        /  \
//!      S2    S5
//!      |
//!      S3   <- current
//! ```
//!
//! [`MomentObjList`] owns every entry in an arena indexed by [`MomentId`].
//! Parent and current references are plain ids, so removing an entry can
//! never leave a dangling pointer behind: a stale id simply stops
//! resolving. Definitions are loaded in arbitrary order, so parent links
//! are resolved in a second pass by [`MomentObjList::update_relations`].

mod delete;
mod flags;
mod list;
mod relations;
mod traverse;

pub use delete::{DeleteOutcome, DeletePolicy};
pub use flags::{
    cancel_full_groups, try_from_bits, FilterGroup, MomentListFlags, MOMENT_FILTER_GROUPS,
};
pub use list::MomentObjList;

/// Accessors the tree needs from an otherwise opaque definition payload.
///
/// Snapshot and checkpoint definitions implement this; the tree never
/// looks at anything else inside them.
pub trait MomentDef {
    /// Unique name of the moment within its domain.
    fn name(&self) -> &str;

    /// Name of the parent moment, `None` for a root.
    fn parent_name(&self) -> Option<&str>;

    /// Rewrite the recorded parent, used when children are reattached.
    fn set_parent_name(&mut self, parent: Option<String>);
}

/// Non-owning reference to an entry of a [`MomentObjList`].
///
/// An id never resolves to a different entry than the one it was handed
/// out for. Slots of removed entries stay vacant until
/// [`MomentObjList::update_relations`] reclaims them; that, like
/// [`MomentObjList::remove_all`], starts a new epoch so ids handed out
/// before it no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MomentId {
    index: usize,
    epoch: u64,
}

/// Where an entry hangs in the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    /// Assigned but not linked yet.
    Detached,
    /// Linked at the top of the forest.
    Root,
    /// Linked below another entry.
    Child(MomentId),
}

/// One snapshot or checkpoint in the forest.
#[derive(Debug, Clone)]
pub struct MomentObj<D> {
    def: D,
    link: Link,
    children: Vec<MomentId>,
}

impl<D: MomentDef> MomentObj<D> {
    fn new(def: D) -> Self {
        Self {
            def,
            link: Link::Detached,
            children: Vec::new(),
        }
    }

    /// The definition payload.
    pub fn def(&self) -> &D {
        &self.def
    }

    /// Moment name.
    pub fn name(&self) -> &str {
        self.def.name()
    }

    /// Resolved parent, `None` for roots and entries not linked yet.
    pub fn parent(&self) -> Option<MomentId> {
        match self.link {
            Link::Child(parent) => Some(parent),
            Link::Detached | Link::Root => None,
        }
    }

    /// Whether the entry is linked at the top of the forest.
    pub fn is_root(&self) -> bool {
        self.link == Link::Root
    }

    /// Whether relations have placed this entry in the forest.
    pub fn is_linked(&self) -> bool {
        self.link != Link::Detached
    }

    /// Number of direct children.
    pub fn nchildren(&self) -> usize {
        self.children.len()
    }

    /// Direct children in link order.
    pub fn children(&self) -> &[MomentId] {
        &self.children
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Minimal payload for exercising the tree.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TestDef {
        pub name: String,
        pub parent: Option<String>,
    }

    impl TestDef {
        pub fn root(name: &str) -> Self {
            Self { name: name.to_string(), parent: None }
        }

        pub fn child(name: &str, parent: &str) -> Self {
            Self { name: name.to_string(), parent: Some(parent.to_string()) }
        }
    }

    impl MomentDef for TestDef {
        fn name(&self) -> &str {
            &self.name
        }

        fn parent_name(&self) -> Option<&str> {
            self.parent.as_deref()
        }

        fn set_parent_name(&mut self, parent: Option<String>) {
            self.parent = parent;
        }
    }

    /// Build a list from definitions and link it.
    pub fn linked(defs: Vec<TestDef>) -> MomentObjList<TestDef> {
        let mut list = MomentObjList::new();
        for def in defs {
            list.assign_def(def).unwrap();
        }
        list.update_relations().unwrap();
        list
    }

    /// `S1 <- S2 <- S3`
    pub fn chain() -> MomentObjList<TestDef> {
        linked(vec![
            TestDef::root("S1"),
            TestDef::child("S2", "S1"),
            TestDef::child("S3", "S2"),
        ])
    }

    pub fn id(list: &MomentObjList<TestDef>, name: &str) -> MomentId {
        list.find_by_name(name).unwrap()
    }

    pub fn nchildren(list: &MomentObjList<TestDef>, name: &str) -> usize {
        list.get(id(list, name)).unwrap().nchildren()
    }
}
