//! An ordered map with configurable fan-out and a bounded height.

use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::config::TreeConfig;
use crate::error::{ConfigError, TreeError};
use crate::raw::{Handle, RawBPlusTree};

/// An ordered map over unique keys, backed by a B+tree whose node fan-out and
/// height are fixed at construction.
///
/// Entries live only in leaves, which form an ascending chain; internal nodes
/// hold separator keys for routing. Unlike `BTreeMap`, inserting an existing
/// key is an error rather than a replacement: use
/// [`update`](BPlusTreeMap::update) to overwrite a value in place.
///
/// # Examples
///
/// ```
/// use bptree::{BPlusTreeMap, TreeError};
///
/// let mut index = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
/// index.insert("alpha", 1).unwrap();
/// index.insert("bravo", 2).unwrap();
///
/// assert_eq!(index.get("alpha"), Some(&1));
/// assert_eq!(index.insert("alpha", 9), Err(TreeError::DuplicateKey));
/// assert_eq!(index.remove("alpha"), Ok(1));
/// assert_eq!(index.len(), 1);
/// ```
pub struct BPlusTreeMap<K, V> {
    raw: RawBPlusTree<K, V>,
}

impl<K, V> BPlusTreeMap<K, V> {
    /// Creates an empty map with the given configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::{BPlusTreeMap, TreeConfig};
    ///
    /// let config = TreeConfig::new(4, 8, 16).unwrap();
    /// let map: BPlusTreeMap<i64, i64> = BPlusTreeMap::new(config);
    /// assert!(map.is_empty());
    /// ```
    #[must_use]
    pub const fn new(config: TreeConfig) -> Self {
        Self {
            raw: RawBPlusTree::new(config),
        }
    }

    /// Creates an empty map, validating the limits first.
    ///
    /// A convenience over [`TreeConfig::new`] followed by
    /// [`BPlusTreeMap::new`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first limit outside its supported
    /// range.
    pub const fn with_limits(max_height: usize, order: usize, leaf_capacity: usize) -> Result<Self, ConfigError> {
        match TreeConfig::new(max_height, order, leaf_capacity) {
            Ok(config) => Ok(Self::new(config)),
            Err(error) => Err(error),
        }
    }

    /// The configuration this map was created with.
    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        self.raw.config()
    }

    /// Number of entries in the map.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// assert_eq!(map.len(), 0);
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.len(), 1);
    /// ```
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Removes every entry, keeping the configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// map.insert(1, "a").unwrap();
    /// map.clear();
    /// assert!(map.is_empty());
    /// ```
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Visits all entries in ascending key order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 2).unwrap();
    /// for key in [3, 1, 2] {
    ///     map.insert(key, key * 10).unwrap();
    /// }
    ///
    /// let entries: Vec<(i32, i32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
    /// assert_eq!(entries, [(1, 10), (2, 20), (3, 30)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            leaf: self.raw.first_leaf(),
            index: 0,
            remaining: self.raw.len(),
        }
    }
}

impl<K: Ord, V> BPlusTreeMap<K, V> {
    /// Returns a reference to the value of `key`, if present.
    ///
    /// The key may be any borrowed form of the map's key type.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Returns a mutable reference to the value of `key`, if present.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// map.insert(1, 10).unwrap();
    /// if let Some(value) = map.get_mut(&1) {
    ///     *value += 1;
    /// }
    /// assert_eq!(map.get(&1), Some(&11));
    /// ```
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_mut(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key).is_some()
    }

    /// Replaces the value of an existing key, returning the previous value.
    ///
    /// The tree structure is untouched; only the value changes.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::KeyNotFound`] if the key is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::{BPlusTreeMap, TreeError};
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.update(&1, "b"), Ok("a"));
    /// assert_eq!(map.update(&2, "c"), Err(TreeError::KeyNotFound));
    /// ```
    pub fn update<Q>(&mut self, key: &Q, value: V) -> Result<V, TreeError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.update(key, value)
    }

    /// Visits the entries with keys between `key1` and `key2` inclusive, in
    /// ascending key order.
    ///
    /// The bounds are order-independent: they are normalized to
    /// `min..=max` first. The scan walks the leaf chain lazily; an interval
    /// containing no keys yields nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 2).unwrap();
    /// for key in [10, 20, 30, 40] {
    ///     map.insert(key, key).unwrap();
    /// }
    ///
    /// let keys: Vec<i32> = map.range(15, 35).map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [20, 30]);
    /// assert_eq!(map.range(35, 15).count(), 2);
    /// assert_eq!(map.range(41, 99).count(), 0);
    /// ```
    pub fn range(&self, key1: K, key2: K) -> Range<'_, K, V> {
        let (min, max) = if key1 <= key2 { (key1, key2) } else { (key2, key1) };
        let start = self.raw.lower_bound(&min);
        Range {
            tree: &self.raw,
            leaf: start.map(|(leaf, _)| leaf),
            index: start.map_or(0, |(_, index)| index),
            max,
        }
    }
}

impl<K: Clone + Ord, V> BPlusTreeMap<K, V> {
    /// Inserts a new entry.
    ///
    /// A failed insert leaves the map exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateKey`] if the key is already present, or
    /// [`TreeError::HeightExceeded`] if the insert would have to grow the
    /// tree past its configured `max_height`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::{BPlusTreeMap, TreeError};
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// assert_eq!(map.insert(1, "a"), Ok(()));
    /// assert_eq!(map.insert(1, "b"), Err(TreeError::DuplicateKey));
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        self.raw.insert(key, value)
    }

    /// Removes an entry, returning its value.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::KeyNotFound`] if the key is absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::{BPlusTreeMap, TreeError};
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 4, 4).unwrap();
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.remove(&1), Ok("a"));
    /// assert_eq!(map.remove(&1), Err(TreeError::KeyNotFound));
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Result<V, TreeError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(key)
    }
}

impl<K: fmt::Debug, V> BPlusTreeMap<K, V> {
    /// Renders the tree structure level by level, for debugging.
    ///
    /// Internal nodes print their separator keys, leaves their entry keys;
    /// the leaf level is `LEVEL 0` and the root comes first. An empty map
    /// renders as `empty tree`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bptree::BPlusTreeMap;
    ///
    /// let mut map = BPlusTreeMap::with_limits(4, 3, 3).unwrap();
    /// for key in 1..=7 {
    ///     map.insert(key, key * 10).unwrap();
    /// }
    ///
    /// assert_eq!(
    ///     map.dump(),
    ///     "LEVEL 1:\n\
    ///      node: 3 5\n\
    ///      LEVEL 0:\n\
    ///      leaf: 1 2\n\
    ///      leaf: 3 4\n\
    ///      leaf: 5 6 7\n",
    /// );
    /// ```
    #[must_use]
    pub fn dump(&self) -> String {
        self.raw.dump()
    }
}

impl<K, V> Default for BPlusTreeMap<K, V> {
    /// An empty map with the default (most permissive) configuration.
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTreeMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTreeMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over all entries of a [`BPlusTreeMap`] in ascending key order.
///
/// Created by [`BPlusTreeMap::iter`]. Walks the leaf chain directly, never
/// touching internal nodes.
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    leaf: Option<Handle>,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let mut leaf = self.tree.node(self.leaf?).as_leaf();
        if self.index >= leaf.entry_count() {
            let next = leaf.next()?;
            self.leaf = Some(next);
            self.index = 0;
            leaf = self.tree.node(next).as_leaf();
        }

        let key = leaf.key(self.index);
        let value = self.tree.value(leaf.value(self.index));
        self.index += 1;
        self.remaining -= 1;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// Iterator over the entries of a [`BPlusTreeMap`] with keys in an inclusive
/// interval, in ascending key order.
///
/// Created by [`BPlusTreeMap::range`]. Starts at the first key at or above
/// the lower bound and walks the leaf chain until a key exceeds the upper
/// bound.
pub struct Range<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    leaf: Option<Handle>,
    index: usize,
    max: K,
}

impl<'a, K: Ord, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let mut leaf = self.tree.node(self.leaf?).as_leaf();
        if self.index >= leaf.entry_count() {
            let Some(next) = leaf.next() else {
                self.leaf = None;
                return None;
            };
            self.leaf = Some(next);
            self.index = 0;
            leaf = self.tree.node(next).as_leaf();
        }

        let key = leaf.key(self.index);
        if *key > self.max {
            self.leaf = None;
            return None;
        }

        let value = self.tree.value(leaf.value(self.index));
        self.index += 1;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // Anything from nothing up to the whole map may fall in the interval.
        (0, Some(self.tree.len()))
    }
}

impl<K: Ord, V> FusedIterator for Range<'_, K, V> {}
