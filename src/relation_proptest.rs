//! Property-based tests for the relation store.
//!
//! These tests drive `Relation` with random sequences of add/remove
//! operations and verify that the two side indexes stay mirror images and
//! that set semantics hold.

#[cfg(test)]
mod proptest_tests {
    use crate::relation::Relation;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, u8),
        Remove(u8, u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8, 0u8..8).prop_map(|(l, r)| Op::Add(l, r)),
            (0u8..8, 0u8..8).prop_map(|(l, r)| Op::Remove(l, r)),
        ]
    }

    fn left_path(n: u8) -> PathBuf {
        PathBuf::from(format!("/src/left{}.txt", n))
    }

    fn right_path(n: u8) -> PathBuf {
        PathBuf::from(format!("/src/right{}.txt", n))
    }

    /// Apply an op sequence to both a `Relation` and a plain pair set.
    fn run_ops(ops: &[Op]) -> (Relation, HashSet<(PathBuf, PathBuf)>) {
        let mut rel = Relation::new();
        let mut model: HashSet<(PathBuf, PathBuf)> = HashSet::new();
        for op in ops {
            match op {
                Op::Add(l, r) => {
                    rel.add(&left_path(*l), &right_path(*r));
                    model.insert((left_path(*l), right_path(*r)));
                }
                Op::Remove(l, r) => {
                    rel.remove(&left_path(*l), &right_path(*r));
                    model.remove(&(left_path(*l), right_path(*r)));
                }
            }
        }
        (rel, model)
    }

    proptest! {
        /// Property: the relation's pair set matches a plain set model.
        #[test]
        fn relation_matches_set_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let (rel, model) = run_ops(&ops);
            let pairs: HashSet<(PathBuf, PathBuf)> = rel
                .pairs()
                .map(|(l, r)| (l.to_path_buf(), r.to_path_buf()))
                .collect();
            prop_assert_eq!(&pairs, &model);
            prop_assert_eq!(rel.len(), model.len());
        }

        /// Property: both side indexes agree; every pair reachable from the
        /// left index is reachable from the right index, and vice versa.
        #[test]
        fn side_indexes_are_mirror_images(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let (rel, _) = run_ops(&ops);
            for (l, r) in rel.pairs() {
                prop_assert!(rel.rights_for(l).any(|p| p == r));
                prop_assert!(rel.lefts_for(r).any(|p| p == l));
                prop_assert!(rel.contains(l, r));
            }
            for r in rel.rights() {
                prop_assert!(rel.lefts_for(r).count() > 0);
            }
            for l in rel.lefts() {
                prop_assert!(rel.rights_for(l).count() > 0);
            }
        }

        /// Property: adding the same pair twice never inflates the count.
        #[test]
        fn add_is_idempotent(l in 0u8..8, r in 0u8..8) {
            let mut rel = Relation::new();
            prop_assert!(rel.add(&left_path(l), &right_path(r)));
            prop_assert!(!rel.add(&left_path(l), &right_path(r)));
            prop_assert_eq!(rel.len(), 1);
        }
    }
}
