//! Set-theoretic diff by primary key, independent of any database.

use std::collections::HashMap;
use std::hash::Hash;

/// The result of comparing two keyed snapshots: rows only in the
/// current snapshot, rows only in the previous one, and rows present in
/// both but whose value differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff<K> {
    /// keys present now but not before
    pub added: Vec<K>,
    /// keys present before but not now
    pub removed: Vec<K>,
    /// keys present in both snapshots with a changed value
    pub modified: Vec<K>,
}

impl<K> Diff<K> {
    /// `true` if all three sets are empty -- the "no downstream action"
    /// case from spec §4.7/§8 scenario 6.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compute `(added, removed, modified)` for `current` against
/// `previous`, keyed by `K` with row contents `V` compared by equality.
pub fn diff<K, V>(current: &HashMap<K, V>, previous: &HashMap<K, V>) -> Diff<K>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
{
    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (key, value) in current {
        match previous.get(key) {
            None => added.push(key.clone()),
            Some(prior) if prior != value => modified.push(key.clone()),
            Some(_) => {}
        }
    }
    let removed = previous
        .keys()
        .filter(|key| !current.contains_key(*key))
        .cloned()
        .collect();

    Diff {
        added,
        removed,
        modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::hash_map;
    use proptest::prelude::*;

    fn arbitrary_snapshot() -> impl Strategy<Value = HashMap<u32, u8>> {
        hash_map(0u32..20, any::<u8>(), 0..10)
    }

    proptest! {
        #[test]
        fn matches_set_theoretic_definition(
            current in arbitrary_snapshot(),
            previous in arbitrary_snapshot(),
        ) {
            let result = diff(&current, &previous);

            for key in &result.added {
                prop_assert!(current.contains_key(key));
                prop_assert!(!previous.contains_key(key));
            }
            for key in &result.removed {
                prop_assert!(!current.contains_key(key));
                prop_assert!(previous.contains_key(key));
            }
            for key in &result.modified {
                prop_assert!(current[key] != previous[key]);
            }

            for key in current.keys() {
                let in_added = result.added.contains(key);
                let in_modified = result.modified.contains(key);
                let unchanged = previous.get(key) == Some(&current[key]);
                prop_assert!(in_added ^ in_modified ^ unchanged);
            }
        }

        #[test]
        fn identical_snapshots_yield_no_diff(snapshot in arbitrary_snapshot()) {
            let result = diff(&snapshot, &snapshot);
            prop_assert!(result.is_empty());
        }
    }
}
