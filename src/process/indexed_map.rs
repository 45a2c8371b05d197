//! Insertion-ordered map handing out dense indices.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Freshness of a value, usually the timestamp of the export it came from.
pub type Revision = i64;

/// Maps keys to dense `0..len` indices and stores one value per index.
///
/// Indices are assigned in first-seen order and never change. Setting an
/// existing key replaces its value only when the new revision is at least as
/// recent as the stored one, so the newest name of an entity wins no matter
/// in which order the files were read.
///
/// # Example
///
/// ```rust
/// use chatdb::process::IndexedMap;
///
/// let mut authors = IndexedMap::new();
/// assert_eq!(authors.set("1", "old name", Some(10)), 0);
/// assert_eq!(authors.set("2", "someone", None), 1);
/// assert_eq!(authors.set("1", "new name", Some(20)), 0);
/// assert_eq!(authors.set("1", "stale name", Some(5)), 0);
///
/// assert_eq!(authors.get("1"), Some(&"new name"));
/// assert_eq!(authors.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct IndexedMap<K, V> {
    index: HashMap<K, (usize, Revision)>,
    values: Vec<V>,
}

impl<K, V> Default for IndexedMap<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            values: Vec::new(),
        }
    }
}

impl<K: Eq + Hash, V> IndexedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates `key`, returning its index.
    ///
    /// A missing revision is older than any explicit one.
    pub fn set(&mut self, key: K, value: V, revision: Option<Revision>) -> usize {
        let revision = revision.unwrap_or(Revision::MIN);
        if let Some((index, stored)) = self.index.get_mut(&key) {
            if revision >= *stored {
                *stored = revision;
                self.values[*index] = value;
            }
            return *index;
        }
        let index = self.values.len();
        self.index.insert(key, (index, revision));
        self.values.push(value);
        index
    }

    pub fn get_index<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.index.get(key).map(|&(index, _)| index)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get_index(key).map(|index| &self.values[index])
    }

    pub fn get_by_index(&self, index: usize) -> Option<&V> {
        self.values.get(index)
    }

    /// Values in index order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn into_values(self) -> Vec<V> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
