use std::collections::{BTreeMap, HashMap};

use crate::core::{Key, KeySet};
use crate::error::ConfigError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// On the current path, seeing it again means a cycle.
    Open,
    /// Fully expanded.
    Done,
}

/// Graph queries over a snapshot of the `key -> required keys` map.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    requires: &'a BTreeMap<Key, KeySet>,
}

impl<'a> Resolver<'a> {
    pub fn new(requires: &'a BTreeMap<Key, KeySet>) -> Self {
        Self { requires }
    }

    /// `seed` plus every key transitively required by a key in `seed`.
    ///
    /// Fails with [`ConfigError::Cyclic`] when a key is reached again while
    /// its own requirements are still being expanded, with
    /// [`ConfigError::Unregistered`] when a seed key is missing from the map,
    /// and with [`ConfigError::Unresolvable`] when a required key is.
    pub fn closure(&self, seed: &KeySet) -> Result<KeySet, ConfigError> {
        let mut marks: HashMap<&'a Key, Mark> = HashMap::new();

        for start in seed {
            let Some((start, requires)) = self.requires.get_key_value(start) else {
                return Err(ConfigError::Unregistered(start.clone()));
            };

            if marks.contains_key(start) {
                continue;
            }

            // each frame holds a key and the requirements not yet descended into
            marks.insert(start, Mark::Open);
            let mut stack = vec![(start, requires.iter())];

            while let Some((key, pending)) = stack.last_mut() {
                let key: &'a Key = *key;

                match pending.next() {
                    Some(req) => match marks.get(req) {
                        Some(Mark::Done) => {}
                        Some(Mark::Open) => return Err(ConfigError::Cyclic(req.clone())),
                        None => {
                            let Some((req, requires)) = self.requires.get_key_value(req) else {
                                return Err(ConfigError::Unresolvable(key.clone(), req.clone()));
                            };
                            marks.insert(req, Mark::Open);
                            stack.push((req, requires.iter()));
                        }
                    },
                    None => {
                        marks.insert(key, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }

        Ok(marks.into_keys().cloned().collect())
    }

    /// Keys of `open` whose requirements are all contained in `provided`.
    /// Keys missing from the map are never ready.
    pub fn ready_frontier(&self, open: &KeySet, provided: &KeySet) -> KeySet {
        open.iter()
            .filter(|key| {
                self.requires
                    .get(*key)
                    .is_some_and(|requires| requires.is_subset(provided))
            })
            .cloned()
            .collect()
    }

    /// Keys of `candidates` that transitively require a key missing from
    /// `provided`.
    pub fn unsatisfied(&self, candidates: &KeySet, provided: &KeySet) -> Result<KeySet, ConfigError> {
        let mut found = KeySet::new();

        for candidate in candidates {
            let mut seed = KeySet::new();
            seed.insert(candidate.clone());

            if !self.closure(&seed)?.is_subset(provided) {
                found.insert(candidate.clone());
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::core::keys;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<Key, KeySet> {
        edges
            .iter()
            .map(|(key, requires)| (Key::new(key), keys(requires.iter().copied())))
            .collect()
    }

    #[test]
    fn test_closure_chain() {
        let map = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let resolver = Resolver::new(&map);

        assert_eq!(resolver.closure(&keys(["c"])).unwrap(), keys(["a", "b", "c"]));
        assert_eq!(resolver.closure(&keys(["d"])).unwrap(), keys(["d"]));
        assert!(resolver.closure(&KeySet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_closure_diamond() {
        let map = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
        let resolver = Resolver::new(&map);

        assert_eq!(
            resolver.closure(&keys(["d"])).unwrap(),
            keys(["a", "b", "c", "d"])
        );
    }

    #[test]
    fn test_closure_cycle() {
        let map = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        let resolver = Resolver::new(&map);

        assert!(matches!(
            resolver.closure(&keys(["a"])),
            Err(ConfigError::Cyclic(_))
        ));
    }

    #[test]
    fn test_closure_missing() {
        let map = graph(&[("a", &["ghost"])]);
        let resolver = Resolver::new(&map);

        assert!(matches!(
            resolver.closure(&keys(["a"])),
            Err(ConfigError::Unresolvable(k, m)) if k.as_str() == "a" && m.as_str() == "ghost"
        ));
    }

    #[test]
    fn test_closure_unregistered_seed() {
        let map = graph(&[("a", &[])]);
        let resolver = Resolver::new(&map);

        assert!(matches!(
            resolver.closure(&keys(["a", "gone"])),
            Err(ConfigError::Unregistered(k)) if k.as_str() == "gone"
        ));
    }

    #[test]
    fn test_ready_frontier() {
        let map = graph(&[("a", &[]), ("b", &["a"]), ("c", &["a", "b"])]);
        let resolver = Resolver::new(&map);
        let open = keys(["a", "b", "c"]);

        assert_eq!(resolver.ready_frontier(&open, &KeySet::new()), keys(["a"]));
        assert_eq!(resolver.ready_frontier(&open, &keys(["a"])), keys(["a", "b"]));
        assert_eq!(
            resolver.ready_frontier(&keys(["c"]), &keys(["a", "b"])),
            keys(["c"])
        );
    }

    #[test]
    fn test_unsatisfied() {
        let map = graph(&[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("d", &[])]);
        let resolver = Resolver::new(&map);

        assert_eq!(
            resolver
                .unsatisfied(&keys(["b", "c", "d"]), &keys(["b", "c", "d"]))
                .unwrap(),
            keys(["b", "c"])
        );
        assert!(
            resolver
                .unsatisfied(&keys(["c"]), &keys(["a", "b", "c"]))
                .unwrap()
                .is_empty()
        );
    }

    /// Random DAG over `n` keys, key `i` may only require keys `j < i`.
    fn dag() -> impl Strategy<Value = BTreeMap<Key, KeySet>> {
        (1usize..12).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n).prop_map(
                move |matrix| {
                    (0..n)
                        .map(|i| {
                            let requires: KeySet = (0..i)
                                .filter(|&j| matrix[i][j])
                                .map(|j| Key::new(format!("k{j}")))
                                .collect();
                            (Key::new(format!("k{i}")), requires)
                        })
                        .collect::<BTreeMap<_, _>>()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn prop_closure_is_smallest_closed_superset(map in dag(), pick in any::<u64>()) {
            let resolver = Resolver::new(&map);
            let seed: KeySet = map
                .keys()
                .enumerate()
                .filter(|(i, _)| (pick & (1 << i)) != 0)
                .map(|(_, key)| key.clone())
                .collect();

            let closure = resolver.closure(&seed).unwrap();

            prop_assert!(seed.is_subset(&closure));

            // closed under the requirement relation
            for key in &closure {
                prop_assert!(map[key].is_subset(&closure));
            }

            // smallest: every member is reachable from the seed
            let mut reached = seed.clone();
            let mut frontier: Vec<_> = seed.iter().cloned().collect();
            while let Some(key) = frontier.pop() {
                for req in &map[&key] {
                    if reached.insert(req.clone()) {
                        frontier.push(req.clone());
                    }
                }
            }
            prop_assert_eq!(closure, reached);
        }
    }
}
