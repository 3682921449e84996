//! Deduplicating set used by the selection engine.
//!
//! Backed by `IndexSet`, so iteration follows insertion order. Callers that
//! need a canonical order should use [`PathSet::sorted`].

use std::hash::Hash;

use indexmap::IndexSet;

/// Set of comparable values with the usual set algebra.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSet<T: Eq + Hash>
{
    items: IndexSet<T>,
}

impl<T: Eq + Hash> Default for PathSet<T>
{
    fn default() -> Self
    {
        Self { items: IndexSet::new() }
    }
}

impl<T: Eq + Hash> PathSet<T>
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Insert a value; returns false if it was already present.
    pub fn add(
        &mut self,
        value: T,
    ) -> bool
    {
        self.items
            .insert(value)
    }

    /// Remove a value; returns true if it was present.
    pub fn remove(
        &mut self,
        value: &T,
    ) -> bool
    {
        self.items
            .shift_remove(value)
    }

    pub fn contains(
        &self,
        value: &T,
    ) -> bool
    {
        self.items
            .contains(value)
    }

    pub fn len(&self) -> usize
    {
        self.items
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.items
            .is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T>
    {
        self.items
            .iter()
    }
}

impl<T: Eq + Hash + Clone> PathSet<T>
{
    /// Owned copy of every member, in iteration order.
    pub fn values(&self) -> Vec<T>
    {
        self.items
            .iter()
            .cloned()
            .collect()
    }

    pub fn union(
        &self,
        other: &Self,
    ) -> Self
    {
        Self {
            items: self
                .items
                .union(&other.items)
                .cloned()
                .collect(),
        }
    }

    pub fn intersection(
        &self,
        other: &Self,
    ) -> Self
    {
        Self {
            items: self
                .items
                .intersection(&other.items)
                .cloned()
                .collect(),
        }
    }

    /// Members of `self` that are not in `other`.
    pub fn difference(
        &self,
        other: &Self,
    ) -> Self
    {
        Self {
            items: self
                .items
                .difference(&other.items)
                .cloned()
                .collect(),
        }
    }
}

impl<T: Eq + Hash + Ord + Clone> PathSet<T>
{
    /// Members in ascending order.
    pub fn sorted(&self) -> Vec<T>
    {
        let mut out = self.values();
        out.sort();
        out
    }
}

impl<T: Eq + Hash> FromIterator<T> for PathSet<T>
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self
    {
        Self {
            items: iter
                .into_iter()
                .collect(),
        }
    }
}

impl<T: Eq + Hash> Extend<T> for PathSet<T>
{
    fn extend<I: IntoIterator<Item = T>>(
        &mut self,
        iter: I,
    )
    {
        self.items
            .extend(iter);
    }
}

impl<T: Eq + Hash> IntoIterator for PathSet<T>
{
    type Item = T;
    type IntoIter = indexmap::set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.items
            .into_iter()
    }
}
