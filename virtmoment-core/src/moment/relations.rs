//! Resolving recorded parent names into tree links.

use tracing::{debug, warn};

use super::{Link, MomentDef, MomentId, MomentObjList};
use crate::error::{MomentError, Result};

impl<D: MomentDef> MomentObjList<D> {
    /// Rebuild every parent link and child count from the parent names
    /// recorded in the definitions.
    ///
    /// Runs as a second pass once all definitions are assigned, since they
    /// arrive in no particular order. A missing parent or a circular chain
    /// is reported through the first error found (in insertion order); the
    /// offending entry is linked at the top level so the forest stays
    /// acyclic and traversable, but the caller should treat the list as
    /// inconsistent.
    ///
    /// Slots vacated by earlier removals are reclaimed here. When that
    /// happens ids handed out before the call no longer resolve; look the
    /// moments up again by name.
    pub fn update_relations(&mut self) -> Result<()> {
        self.detach_all();
        self.compact();

        let ids = self.ids();
        let mut first_err: Option<MomentError> = None;

        for &id in &ids {
            let Some(obj) = self.get(id) else { continue };
            let link = match obj.def().parent_name() {
                None => Link::Root,
                Some(parent) => match self.find_by_name(parent) {
                    Some(parent_id) => Link::Child(parent_id),
                    None => {
                        warn!(moment = %obj.name(), parent = %parent, "Impossible to find parent");
                        first_err.get_or_insert(MomentError::MissingParent {
                            name: obj.name().to_string(),
                            parent: parent.to_string(),
                        });
                        Link::Root
                    }
                },
            };
            self.attach(id, link);
        }

        // Cycles only show once every link exists.
        let limit = self.size();
        for &id in &ids {
            if !self.reaches_itself(id, limit) {
                continue;
            }
            let name = self.name_of(id).unwrap_or_default().to_string();
            warn!(moment = %name, "Circular moment relationship");
            self.drop_parent(id);
            self.attach(id, Link::Root);
            first_err.get_or_insert(MomentError::CycleDetected { name });
        }

        match first_err {
            Some(err) => Err(err),
            None => {
                debug!(count = limit, roots = self.roots().len(), "Moment relations updated");
                Ok(())
            }
        }
    }

    /// Whether following parents from `id` comes back to `id`.
    fn reaches_itself(&self, id: MomentId, limit: usize) -> bool {
        let mut cursor = self.get(id).and_then(|obj| obj.parent());
        let mut steps = 0;
        while let Some(ancestor) = cursor {
            if ancestor == id {
                return true;
            }
            steps += 1;
            if steps > limit {
                return false;
            }
            cursor = self.get(ancestor).and_then(|obj| obj.parent());
        }
        false
    }

    /// Link a single entry below the parent its definition names.
    ///
    /// Used after assigning one new definition to an already linked list.
    /// When the parent is missing, or linking would close a loop, the
    /// entry goes to the top level instead.
    pub fn link_parent(&mut self, id: MomentId) {
        let Some(obj) = self.get(id) else { return };
        let link = match obj.def().parent_name() {
            None => Link::Root,
            Some(parent) => match self.find_by_name(parent) {
                Some(parent_id) if parent_id != id && !self.descendants(id).contains(&parent_id) => {
                    Link::Child(parent_id)
                }
                Some(_) => {
                    warn!(moment = %obj.name(), parent = %parent, "Parent would create a cycle");
                    Link::Root
                }
                None => {
                    warn!(moment = %obj.name(), parent = %parent, "Moment lacks parent");
                    Link::Root
                }
            },
        };
        self.drop_parent(id);
        self.attach(id, link);
    }

    /// Validate the parent named by `def` before (re)defining it.
    ///
    /// Rejects a definition that is its own parent, names a parent that
    /// does not exist, or whose parent chain leads back to its own name.
    pub fn check_cycles(&self, def: &D, domain: &str) -> Result<()> {
        let Some(parent) = def.parent_name() else { return Ok(()) };
        let name = def.name();

        if parent == name {
            return Err(MomentError::SelfParent(name.to_string()));
        }

        let mut other = self.get_by_name(parent).ok_or_else(|| MomentError::MissingParent {
            name: name.to_string(),
            parent: parent.to_string(),
        })?;

        let mut steps = 0;
        while let Some(next) = other.def().parent_name() {
            if next == name {
                return Err(MomentError::ParentCycle {
                    parent: parent.to_string(),
                    name: name.to_string(),
                });
            }
            steps += 1;
            match self.get_by_name(next) {
                Some(obj) if steps <= self.size() => other = obj,
                _ => {
                    warn!(domain = %domain, "Moments are inconsistent");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Replace the definition of an existing entry, returning the old one.
    ///
    /// The new definition must keep the name. If it names a different
    /// parent, the entry is relinked below it.
    pub fn redefine(&mut self, id: MomentId, def: D) -> Result<D> {
        let obj = self
            .get(id)
            .ok_or_else(|| MomentError::NotFound(def.name().to_string()))?;

        if obj.name() != def.name() {
            return Err(MomentError::InvalidDefinition(format!(
                "cannot rename moment '{}' to '{}'",
                obj.name(),
                def.name()
            )));
        }
        self.check_cycles(&def, "")?;

        let relink = obj.is_linked() && obj.def().parent_name() != def.parent_name();
        let old = match self.get_mut(id) {
            Some(obj) => std::mem::replace(&mut obj.def, def),
            None => return Err(MomentError::Internal("moment vanished".to_string())),
        };
        if relink {
            self.link_parent(id);
        }
        Ok(old)
    }

    /// The single leaf of a forest that is one linear chain.
    pub fn find_leaf(&self) -> Option<MomentId> {
        let [root] = self.roots() else { return None };
        let mut id = *root;
        loop {
            let obj = self.get(id)?;
            match obj.children() {
                [] => return Some(id),
                [only] => id = *only,
                _ => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moment::testutil::*;

    #[test]
    fn test_chain_relations() {
        let list = chain();
        let s1 = id(&list, "S1");
        let s2 = id(&list, "S2");
        let s3 = id(&list, "S3");

        assert_eq!(list.roots(), &[s1]);
        assert_eq!(list.get(s2).unwrap().parent(), Some(s1));
        assert_eq!(list.get(s3).unwrap().parent(), Some(s2));
        assert_eq!(nchildren(&list, "S1"), 1);
        assert_eq!(nchildren(&list, "S2"), 1);
        assert_eq!(nchildren(&list, "S3"), 0);
    }

    #[test]
    fn test_relations_independent_of_insertion_order() {
        let list = linked(vec![
            TestDef::child("S3", "S2"),
            TestDef::child("S2", "S1"),
            TestDef::root("S1"),
        ]);
        assert_eq!(list.roots(), &[id(&list, "S1")]);
        assert_eq!(nchildren(&list, "S1"), 1);
        assert_eq!(nchildren(&list, "S2"), 1);
    }

    #[test]
    fn test_missing_parent() {
        let mut list = MomentObjList::new();
        list.assign_def(TestDef::child("S1", "ghost")).unwrap();

        let err = list.update_relations().unwrap_err();
        match err {
            MomentError::MissingParent { name, parent } => {
                assert_eq!(name, "S1");
                assert_eq!(parent, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(list.get_by_name("S1").unwrap().is_root());
    }

    #[test]
    fn test_two_cycle_rejected_in_either_order() {
        for defs in [
            vec![TestDef::child("A", "B"), TestDef::child("B", "A")],
            vec![TestDef::child("B", "A"), TestDef::child("A", "B")],
        ] {
            let mut list = MomentObjList::new();
            for def in defs {
                list.assign_def(def).unwrap();
            }
            let err = list.update_relations().unwrap_err();
            assert!(matches!(err, MomentError::CycleDetected { .. }));

            // The cycle is broken so the tree can still be walked.
            assert_eq!(list.roots().len(), 1);
            assert_eq!(list.descendants(list.roots()[0]).len(), 1);
        }
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let mut list = MomentObjList::new();
        list.assign_def(TestDef::child("A", "A")).unwrap();
        let err = list.update_relations().unwrap_err();
        assert!(matches!(err, MomentError::CycleDetected { ref name } if name == "A"));
        assert_eq!(nchildren(&list, "A"), 0);
    }

    #[test]
    fn test_cycle_with_tail() {
        let mut list = MomentObjList::new();
        list.assign_def(TestDef::child("T", "A")).unwrap();
        list.assign_def(TestDef::child("A", "B")).unwrap();
        list.assign_def(TestDef::child("B", "C")).unwrap();
        list.assign_def(TestDef::child("C", "A")).unwrap();

        let err = list.update_relations().unwrap_err();
        assert!(matches!(err, MomentError::CycleDetected { ref name } if name == "A"));
        assert_eq!(list.roots(), &[id(&list, "A")]);
        assert_eq!(list.descendants(id(&list, "A")).len(), 3);
    }

    #[test]
    fn test_update_relations_is_repeatable() {
        let mut list = chain();
        list.update_relations().unwrap();
        list.update_relations().unwrap();
        assert_eq!(nchildren(&list, "S1"), 1);
        assert_eq!(list.roots().len(), 1);
    }

    #[test]
    fn test_link_parent() {
        let mut list = chain();
        let s4 = list.assign_def(TestDef::child("S4", "S1")).unwrap();
        list.link_parent(s4);
        assert_eq!(list.get(s4).unwrap().parent(), Some(id(&list, "S1")));
        assert_eq!(nchildren(&list, "S1"), 2);

        let orphan = list.assign_def(TestDef::child("S5", "ghost")).unwrap();
        list.link_parent(orphan);
        assert!(list.get(orphan).unwrap().is_root());
    }

    #[test]
    fn test_check_cycles() {
        let list = chain();

        assert!(list.check_cycles(&TestDef::child("S9", "S3"), "dom").is_ok());
        assert!(list.check_cycles(&TestDef::root("S9"), "dom").is_ok());

        let err = list.check_cycles(&TestDef::child("S9", "S9"), "dom").unwrap_err();
        assert!(matches!(err, MomentError::SelfParent(_)));

        let err = list.check_cycles(&TestDef::child("S9", "ghost"), "dom").unwrap_err();
        assert!(matches!(err, MomentError::MissingParent { .. }));

        // Redefining S1 below its own grandchild.
        let err = list.check_cycles(&TestDef::child("S1", "S3"), "dom").unwrap_err();
        assert!(matches!(err, MomentError::ParentCycle { ref parent, ref name } if parent == "S3" && name == "S1"));
    }

    #[test]
    fn test_redefine_relinks() {
        let mut list = linked(vec![
            TestDef::root("S1"),
            TestDef::child("S2", "S1"),
            TestDef::child("S3", "S2"),
        ]);
        let s3 = id(&list, "S3");

        let old = list.redefine(s3, TestDef::child("S3", "S1")).unwrap();
        assert_eq!(old.parent.as_deref(), Some("S2"));
        assert_eq!(nchildren(&list, "S1"), 2);
        assert_eq!(nchildren(&list, "S2"), 0);

        let err = list.redefine(s3, TestDef::root("other")).unwrap_err();
        assert!(matches!(err, MomentError::InvalidDefinition(_)));

        let s1 = id(&list, "S1");
        let err = list.redefine(s1, TestDef::child("S1", "S3")).unwrap_err();
        assert!(matches!(err, MomentError::ParentCycle { .. }));
        assert!(list.get(s1).unwrap().is_root());
    }

    #[test]
    fn test_find_leaf() {
        let list = chain();
        assert_eq!(list.find_leaf(), Some(id(&list, "S3")));

        let branched = linked(vec![
            TestDef::root("S1"),
            TestDef::child("S2", "S1"),
            TestDef::child("S3", "S1"),
        ]);
        assert_eq!(branched.find_leaf(), None);

        let two_roots = linked(vec![TestDef::root("A"), TestDef::root("B")]);
        assert_eq!(two_roots.find_leaf(), None);

        let empty: MomentObjList<TestDef> = MomentObjList::new();
        assert_eq!(empty.find_leaf(), None);
    }
}
