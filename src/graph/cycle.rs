//! SF-004: Stuck-set reporting with one concrete cycle.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Elements that could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular dependency between {}{}", join(.stuck, ", "), loop_suffix(.cycle))]
pub struct CycleError<K: fmt::Display> {
    /// Every unorderable key, ascending.
    pub stuck: Vec<K>,
    /// One closed loop inside `stuck`, first key repeated at the end
    /// (`[a, b, a]` reads "a depends on b depends on a").
    pub cycle: Option<Vec<K>>,
}

fn loop_suffix<K: fmt::Display>(cycle: &Option<Vec<K>>) -> String {
    match cycle {
        Some(keys) => format!(" (cycle: {})", join(keys, " -> ")),
        None => String::new(),
    }
}

fn join<K: fmt::Display>(keys: &[K], sep: &str) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Walk from the smallest stuck key along in-set dependency edges until a key
/// repeats, and return the loop.
///
/// Every stuck element has at least one stuck dependency, so following the
/// smallest one always closes a loop within `stuck.len() + 1` steps. Returns
/// `None` only if `deps` breaks that guarantee.
pub fn find_cycle<K, F>(stuck: &[K], deps: F) -> Option<Vec<K>>
where
    K: Ord + Hash + Clone,
    F: Fn(&K) -> Vec<K>,
{
    let members: HashSet<&K> = stuck.iter().collect();
    let mut current = stuck.iter().min()?.clone();
    let mut path: Vec<K> = Vec::new();
    let mut seen: HashSet<K> = HashSet::new();

    loop {
        if !seen.insert(current.clone()) {
            let start = path.iter().position(|k| *k == current)?;
            let mut cycle = path.split_off(start);
            cycle.push(current);
            return Some(cycle);
        }
        path.push(current.clone());
        current = deps(&current)
            .into_iter()
            .filter(|d| members.contains(d))
            .min()?;
    }
}
