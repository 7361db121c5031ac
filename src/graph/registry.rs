//! SF-002: Element registry — key -> (element, dependency keys).

use super::toposort::SortError;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

struct Entry<K, T> {
    element: T,
    deps: Vec<K>,
}

/// Working set for one sort invocation. Built fresh per call and consumed by the sort.
pub struct ElementRegistry<K, T> {
    entries: FxHashMap<K, Entry<K, T>>,
}

impl<K, T> ElementRegistry<K, T>
where
    K: Ord + Hash + Clone + fmt::Display,
{
    /// Register every element under its key.
    ///
    /// Keys must be unique; a repeated key fails with [`SortError::DuplicateKey`]
    /// instead of overwriting the earlier element. Repeated entries inside one
    /// dependency list are collapsed.
    pub fn build<I, FK, FD, D>(elements: I, key_of: FK, deps_of: FD) -> Result<Self, SortError<K>>
    where
        I: IntoIterator<Item = T>,
        FK: Fn(&T) -> K,
        FD: Fn(&T) -> D,
        D: IntoIterator<Item = K>,
    {
        let iter = elements.into_iter();
        let mut entries = FxHashMap::default();
        entries.reserve(iter.size_hint().0);

        for element in iter {
            let key = key_of(&element);
            if entries.contains_key(&key) {
                return Err(SortError::DuplicateKey(key));
            }
            let mut deps: Vec<K> = deps_of(&element).into_iter().collect();
            deps.sort();
            deps.dedup();
            entries.insert(key, Entry { element, deps });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Declared dependencies of `key`, including ones outside the registered set.
    pub fn dependencies(&self, key: &K) -> Option<&[K]> {
        self.entries.get(key).map(|e| e.deps.as_slice())
    }

    /// All registered keys in ascending order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Dependencies of `key` that are themselves registered.
    pub(crate) fn in_set_dependencies<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a K> + 'a {
        self.entries
            .get(key)
            .map(|e| e.deps.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |d| self.entries.contains_key(*d))
    }

    /// Remove an element, returning it.
    pub(crate) fn take(&mut self, key: &K) -> Option<T> {
        self.entries.remove(key).map(|e| e.element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Pair = (&'static str, Vec<&'static str>);

    fn build(items: Vec<Pair>) -> Result<ElementRegistry<String, Pair>, SortError<String>> {
        ElementRegistry::build(
            items,
            |(k, _)| k.to_string(),
            |(_, deps)| deps.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_sf002_build() {
        let reg = build(vec![("a", vec![]), ("b", vec!["a"])]).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(&"a".to_string()));
        assert_eq!(reg.dependencies(&"b".to_string()).unwrap(), ["a".to_string()]);
        assert_eq!(reg.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_sf002_duplicate_key() {
        let err = build(vec![("a", vec![]), ("a", vec!["b"])]).err().unwrap();
        assert_eq!(err, SortError::DuplicateKey("a".to_string()));
        assert!(err.to_string().contains("duplicate key 'a'"));
    }

    #[test]
    fn test_sf002_repeated_deps_collapsed() {
        let reg = build(vec![("a", vec![]), ("b", vec!["a", "a"])]).unwrap();
        assert_eq!(reg.dependencies(&"b".to_string()).unwrap().len(), 1);
    }

    #[test]
    fn test_sf002_in_set_dependencies_skip_external() {
        let reg = build(vec![("a", vec![]), ("b", vec!["a", "x"])]).unwrap();
        let deps: Vec<_> = reg.in_set_dependencies(&"b".to_string()).collect();
        assert_eq!(deps, vec!["a"]);
        // The declared list still keeps the external key
        assert_eq!(reg.dependencies(&"b".to_string()).unwrap().len(), 2);
    }

    #[test]
    fn test_sf002_empty() {
        let reg = build(vec![]).unwrap();
        assert!(reg.is_empty());
    }
}
