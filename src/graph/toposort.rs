//! SF-003: Deterministic topological ordering.
//!
//! Batched Kahn's algorithm: each round emits every element whose in-set
//! dependencies have all been emitted, in ascending key order. Dependencies on
//! keys outside the input set are treated as already satisfied. The output never
//! depends on hash-map iteration order.

use super::cycle::{find_cycle, CycleError};
use super::registry::ElementRegistry;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Failure of a sort. The whole sort is aborted; no partial order is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError<K: fmt::Display> {
    /// Two input elements produced the same key.
    #[error("duplicate key '{0}' in dependency graph")]
    DuplicateKey(K),
    /// Some elements could not be ordered because their dependencies form a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError<K>),
}

impl<K: fmt::Display> SortError<K> {
    /// The unorderable keys, if this is a cycle failure.
    pub fn stuck(&self) -> Option<&[K]> {
        match self {
            Self::Cycle(c) => Some(&c.stuck),
            Self::DuplicateKey(_) => None,
        }
    }
}

/// Order `elements` so every element comes after its in-set dependencies.
///
/// Ties are broken by ascending key. Fails with [`SortError::DuplicateKey`] on
/// repeated keys and [`SortError::Cycle`] when the remaining elements depend on
/// each other.
pub fn topological_sort<T, K, I, FK, FD, D>(
    elements: I,
    key_of: FK,
    deps_of: FD,
) -> Result<Vec<T>, SortError<K>>
where
    K: Ord + Hash + Clone + fmt::Display,
    I: IntoIterator<Item = T>,
    FK: Fn(&T) -> K,
    FD: Fn(&T) -> D,
    D: IntoIterator<Item = K>,
{
    ElementRegistry::build(elements, key_of, deps_of)?.sort()
}

/// Like [`topological_sort`] but keeps the rounds separate.
///
/// Elements inside one level have no dependencies on each other; flattening
/// the levels gives exactly the [`topological_sort`] order.
pub fn sort_levels<T, K, I, FK, FD, D>(
    elements: I,
    key_of: FK,
    deps_of: FD,
) -> Result<Vec<Vec<T>>, SortError<K>>
where
    K: Ord + Hash + Clone + fmt::Display,
    I: IntoIterator<Item = T>,
    FK: Fn(&T) -> K,
    FD: Fn(&T) -> D,
    D: IntoIterator<Item = K>,
{
    ElementRegistry::build(elements, key_of, deps_of)?.sort_levels()
}

impl<K, T> ElementRegistry<K, T>
where
    K: Ord + Hash + Clone + fmt::Display,
{
    /// Consume the registry and produce the flat order.
    pub fn sort(self) -> Result<Vec<T>, SortError<K>> {
        let total = self.len();
        let mut order = Vec::with_capacity(total);
        for level in self.sort_levels()? {
            order.extend(level);
        }
        Ok(order)
    }

    /// Consume the registry and produce the ordered rounds.
    pub fn sort_levels(mut self) -> Result<Vec<Vec<T>>, SortError<K>> {
        let keys = self.keys();

        // Pending in-set dependency count and reverse edges.
        let mut pending: FxHashMap<K, usize> = FxHashMap::default();
        let mut dependents: FxHashMap<K, Vec<K>> = FxHashMap::default();
        for key in &keys {
            let mut count = 0;
            for dep in self.in_set_dependencies(key) {
                count += 1;
                dependents.entry(dep.clone()).or_default().push(key.clone());
            }
            pending.insert(key.clone(), count);
        }

        // `keys` is ascending, so the first round is already sorted.
        let mut ready: Vec<K> = keys
            .iter()
            .filter(|k| pending.get(*k) == Some(&0))
            .cloned()
            .collect();

        let mut levels = Vec::new();
        let mut emitted = 0;
        while !ready.is_empty() {
            let mut next = Vec::new();
            let mut level = Vec::with_capacity(ready.len());
            for key in &ready {
                if let Some(children) = dependents.get(key) {
                    for child in children {
                        if let Some(count) = pending.get_mut(child) {
                            *count -= 1;
                            if *count == 0 {
                                next.push(child.clone());
                            }
                        }
                    }
                }
                if let Some(element) = self.take(key) {
                    level.push(element);
                }
            }
            emitted += level.len();
            levels.push(level);
            next.sort();
            ready = next;
        }

        if emitted < keys.len() {
            let stuck: Vec<K> = keys
                .into_iter()
                .filter(|k| self.contains(k))
                .collect();
            let cycle = find_cycle(&stuck, |k| self.in_set_dependencies(k).cloned().collect());
            tracing::debug!(stuck = stuck.len(), "topological sort stuck");
            return Err(CycleError { stuck, cycle }.into());
        }

        Ok(levels)
    }
}
