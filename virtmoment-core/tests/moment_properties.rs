//! Property-based tests for moment trees.
//!
//! Random forests are generated acyclic by construction (every parent has
//! a lower index) and then assigned in shuffled order, so relation building
//! never sees parents before children by accident.

use std::collections::HashMap;

use proptest::collection::vec;
use proptest::prelude::*;
use proptest::sample::Index;

use virtmoment_core::{
    DeletePolicy, MomentDef, MomentError, MomentId, MomentListFlags, MomentObjList, SnapshotDef,
};

type List = MomentObjList<SnapshotDef>;

/// Strategy for a shuffled forest of snapshot definitions named `s0..sN`.
fn forest_strategy() -> impl Strategy<Value = Vec<SnapshotDef>> {
    vec(any::<Index>(), 1..24)
        .prop_map(|picks| {
            picks
                .iter()
                .enumerate()
                .map(|(i, pick)| {
                    let def = SnapshotDef::new(format!("s{}", i));
                    if i == 0 || pick.index(4) == 0 {
                        def
                    } else {
                        def.with_parent(format!("s{}", pick.index(i)))
                    }
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn build(defs: Vec<SnapshotDef>) -> List {
    let mut list = List::new();
    for def in defs {
        list.assign_def(def).unwrap();
    }
    list.update_relations().unwrap();
    list
}

fn pick(list: &List, index: &Index) -> MomentId {
    let ids = list.ids();
    ids[index.index(ids.len())]
}

/// Child counts derived from parent links alone, keyed by parent name.
fn counted_children(list: &List) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for (_, obj) in list.iter() {
        if let Some(parent) = obj.parent().and_then(|p| list.name_of(p)) {
            *counts.entry(parent.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

fn all(_: &virtmoment_core::MomentObj<SnapshotDef>) -> bool {
    true
}

proptest! {
    #[test]
    fn prop_assigned_names_are_all_findable(defs in forest_strategy()) {
        let names: Vec<String> = defs.iter().map(|d| d.name().to_string()).collect();
        let mut list = List::new();
        for def in defs {
            list.assign_def(def).unwrap();
        }

        prop_assert_eq!(list.size(), names.len());
        for name in &names {
            prop_assert!(list.find_by_name(name).is_some());
        }
    }

    #[test]
    fn prop_child_counts_match_parent_links(defs in forest_strategy()) {
        let list = build(defs);
        let counts = counted_children(&list);

        for (_, obj) in list.iter() {
            prop_assert_eq!(obj.nchildren(), counts.get(obj.name()).copied().unwrap_or(0));
            let parent_name = obj.parent().and_then(|p| list.name_of(p));
            prop_assert_eq!(parent_name, obj.def().parent_name());
        }
        let roots = list.iter().filter(|(_, obj)| obj.is_root()).count();
        prop_assert_eq!(roots, list.roots().len());
    }

    #[test]
    fn prop_missing_parent_rejected(defs in forest_strategy(), at in any::<Index>()) {
        let mut defs = defs;
        let victim = at.index(defs.len());
        defs[victim] = SnapshotDef::new(defs[victim].name().to_string()).with_parent("ghost");

        let mut list = List::new();
        for def in defs {
            list.assign_def(def).unwrap();
        }
        let err = list.update_relations().unwrap_err();
        let is_missing_parent = matches!(err, MomentError::MissingParent { ref parent, .. } if parent == "ghost");
        prop_assert!(is_missing_parent);
    }

    #[test]
    fn prop_num_matches_names(defs in forest_strategy(), at in any::<Index>()) {
        let list = build(defs);
        let from = pick(&list, &at);

        for bits in 0..=MomentListFlags::ALL.bits() {
            let flags = MomentListFlags::from_bits_truncate(bits);
            for start in [None, Some(from)] {
                let names = list.get_names(start, flags, all).unwrap();
                prop_assert_eq!(list.num(start, flags, all), names.len());
            }
        }
    }

    #[test]
    fn prop_topological_order_puts_parents_first(defs in forest_strategy()) {
        let list = build(defs);
        let names = list.get_names(None, MomentListFlags::TOPOLOGICAL, all).unwrap();
        prop_assert_eq!(names.len(), list.size());

        let position: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        for (_, obj) in list.iter() {
            if let Some(parent) = obj.def().parent_name() {
                prop_assert!(position[parent] < position[obj.name()]);
            }
        }
    }

    #[test]
    fn prop_reparent_arithmetic(defs in forest_strategy(), at in any::<Index>()) {
        let mut list = build(defs);
        let victim = pick(&list, &at);
        let parent = list.get(victim).unwrap().parent();
        let moved: Vec<MomentId> = list.children(victim).to_vec();
        let n = moved.len();

        let before = match parent {
            Some(p) => list.get(p).unwrap().nchildren(),
            None => list.roots().len(),
        };

        let outcome = list.delete(victim, DeletePolicy::Reparent).unwrap();
        prop_assert_eq!(outcome.reparented.len(), n);

        let after = match parent {
            Some(p) => list.get(p).unwrap().nchildren(),
            None => list.roots().len(),
        };
        prop_assert_eq!(after, before - 1 + n);

        let parent_name = parent.and_then(|p| list.name_of(p)).map(str::to_string);
        for child in moved {
            let obj = list.get(child).unwrap();
            prop_assert_eq!(obj.parent(), parent);
            prop_assert_eq!(obj.def().parent_name(), parent_name.as_deref());
        }

        // Definitions were rewritten, so a full rebuild (which also
        // reclaims the vacated slot) agrees.
        let counts = counted_children(&list);
        list.update_relations().unwrap();
        prop_assert_eq!(counted_children(&list), counts);
    }

    #[test]
    fn prop_current_never_dangles(
        defs in forest_strategy(),
        at in any::<Index>(),
        cur in any::<Index>(),
        recursive in any::<bool>(),
    ) {
        let mut list = build(defs);
        let victim = pick(&list, &at);
        let current = pick(&list, &cur);
        list.set_current(Some(current));

        let parent = list.get(victim).unwrap().parent();
        let mut subtree = list.descendants(victim);
        subtree.push(victim);

        let policy = if recursive { DeletePolicy::Children } else { DeletePolicy::Reparent };
        let outcome = list.delete(victim, policy).unwrap();

        let doomed = match policy {
            DeletePolicy::Children => subtree.contains(&current),
            _ => current == victim,
        };
        if doomed {
            prop_assert_eq!(list.current(), parent);
            prop_assert!(outcome.current_changed);
        } else {
            prop_assert_eq!(list.current(), Some(current));
            prop_assert!(!outcome.current_changed);
        }
        if let Some(id) = list.current() {
            prop_assert!(list.contains(id));
        }
        prop_assert_eq!(outcome.current.as_deref(), list.current_name());
    }
}

#[test]
fn two_node_cycle_rejected_in_either_order() {
    let a = SnapshotDef::new("A").with_parent("B");
    let b = SnapshotDef::new("B").with_parent("A");

    for defs in [vec![a.clone(), b.clone()], vec![b, a]] {
        let mut list = List::new();
        for def in defs {
            list.assign_def(def).unwrap();
        }
        let err = list.update_relations().unwrap_err();
        assert!(matches!(err, MomentError::CycleDetected { .. }));
        // Still traversable afterwards.
        assert_eq!(list.num(None, MomentListFlags::TOPOLOGICAL, all), 2);
    }
}
