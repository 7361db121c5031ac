//! SF-001: Dependency ordering — registry, batched Kahn sort, cycle reporting.
//!
//! Every consumer in the crate (stack ordering, resource ordering inside a
//! stack, lazy value ordering) adapts its own shape into a `(key, deps)` view
//! and calls [`topological_sort`] or [`sort_dependents`].

pub mod cycle;
pub mod registry;
pub mod toposort;

pub use cycle::{find_cycle, CycleError};
pub use registry::ElementRegistry;
pub use toposort::{sort_levels, topological_sort, SortError};

use std::fmt;
use std::hash::Hash;

/// Something with a unique, ordered identity inside one sort call.
pub trait Keyed {
    /// Displayable so cycle and duplicate-key errors can name it.
    type Key: Ord + Hash + Clone + fmt::Display;

    fn key(&self) -> Self::Key;
}

/// Something that must be ordered after the elements it names.
pub trait Dependent: Keyed {
    /// Keys that must precede this element. Keys outside the sorted set are ignored.
    fn dependencies(&self) -> Vec<Self::Key>;
}

impl<T: Keyed + ?Sized> Keyed for &T {
    type Key = T::Key;

    fn key(&self) -> T::Key {
        (**self).key()
    }
}

impl<T: Dependent + ?Sized> Dependent for &T {
    fn dependencies(&self) -> Vec<T::Key> {
        (**self).dependencies()
    }
}

/// Sort any [`Dependent`] collection.
pub fn sort_dependents<T, I>(items: I) -> Result<Vec<T>, SortError<T::Key>>
where
    T: Dependent,
    I: IntoIterator<Item = T>,
{
    topological_sort(items, |item| item.key(), |item| item.dependencies())
}
