use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;

/// Inline capacity for per-node storage. Trees configured with a larger
/// `order` or `leaf_capacity` spill node contents to the heap.
pub(crate) const NODE_INLINE: usize = 16;

type Keys<K> = SmallVec<[K; NODE_INLINE]>;
type Handles = SmallVec<[Handle; NODE_INLINE]>;

/// A tree node: every site that treats the two kinds differently matches on
/// this exhaustively.
pub(crate) enum Node<K> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K>),
}

/// Internal node: separator keys and child handles, `children.len()` is
/// always `keys.len() + 1`. `keys[i]` is the first key of the subtree under
/// `children[i + 1]`, so child `i` owns keys in `[keys[i - 1], keys[i])` with
/// implicit infinities at the ends.
pub(crate) struct InternalNode<K> {
    /// Right sibling at the same level; the per-level chain is consumed only
    /// by the diagnostic dump.
    next: Option<Handle>,
    keys: Keys<K>,
    children: Handles,
}

/// Leaf node: strictly ascending keys with their value handles, plus the
/// right-sibling link forming the ascending leaf chain that range scans walk.
pub(crate) struct LeafNode<K> {
    next: Option<Handle>,
    keys: Keys<K>,
    values: Handles,
}

/// Result of binary-searching a key within one node.
pub(crate) enum SearchResult {
    /// Key found at this index.
    Found(usize),
    /// Key absent; this is where it would be inserted.
    NotFound(usize),
}

impl<K> Node<K> {
    /// Returns the leaf node, panicking if this is not a leaf.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the leaf node mutably, panicking if this is not a leaf.
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    /// Returns the internal node, panicking if this is not internal.
    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    /// Returns the internal node mutably, panicking if this is not internal.
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }
}

impl<K> InternalNode<K> {
    /// Creates an internal node with a single child and no keys, ready to
    /// receive the promoted separator of a root split.
    pub(crate) fn with_first_child(child: Handle) -> Self {
        let mut children = Handles::new();
        children.push(child);
        Self {
            next: None,
            keys: Keys::new(),
            children,
        }
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    /// Replaces the separator at `index`.
    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Index of the child to descend into for `key`: an exact separator match
    /// belongs to the child to its right.
    #[inline]
    pub(crate) fn search_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(index) => index + 1,
            Err(index) => index,
        }
    }

    /// Installs `key` at `index` with `child` immediately to its right.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the separator at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Appends a separator and its right child.
    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Prepends a child, demoting `key` to be the separator above the old
    /// first child (the borrow-from-left rotation).
    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Removes and returns the last separator and child.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop().expect("internal node key without child");
        Some((key, child))
    }

    /// Removes and returns the first separator and the first child.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    /// Splits an overflowing node so the left half keeps `split + 1`
    /// children. The key at `split` is promoted: it ends up in neither half.
    pub(crate) fn split_off(&mut self, split: usize) -> (K, InternalNode<K>) {
        let sibling_keys: Keys<K> = self.keys.drain(split + 1..).collect();
        let sibling_children: Handles = self.children.drain(split + 1..).collect();
        let promoted = self.keys.pop().expect("split index out of range");

        let sibling = InternalNode {
            next: self.next,
            keys: sibling_keys,
            children: sibling_children,
        };
        (promoted, sibling)
    }

    /// Absorbs the right sibling, pulling the parent separator down between
    /// the two halves.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
        self.next = right.next;
    }
}

impl<K> LeafNode<K> {
    pub(crate) fn new() -> Self {
        Self {
            next: None,
            keys: Keys::new(),
            values: Handles::new(),
        }
    }

    pub(crate) fn entry_count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> Handle {
        self.values[index]
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    /// Binary search for `key` among this leaf's keys.
    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(index) => SearchResult::Found(index),
            Err(index) => SearchResult::NotFound(index),
        }
    }

    /// Opens a slot at `index` for a new entry.
    pub(crate) fn insert(&mut self, index: usize, key: K, value: Handle) {
        self.keys.insert(index, key);
        self.values.insert(index, value);
    }

    /// Removes the entry at `index`, shifting the rest left.
    pub(crate) fn remove(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let value = self.values.remove(index);
        (key, value)
    }

    pub(crate) fn push(&mut self, key: K, value: Handle) {
        self.keys.push(key);
        self.values.push(value);
    }

    pub(crate) fn push_front(&mut self, key: K, value: Handle) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    /// Removes and returns the last entry.
    pub(crate) fn pop(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let value = self.values.pop().expect("leaf key without value");
        Some((key, value))
    }

    /// Removes and returns the first entry.
    pub(crate) fn pop_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let value = self.values.remove(0);
        Some((key, value))
    }

    /// Splits an overflowing leaf so this node keeps the first `split`
    /// entries; the rest move to the returned right sibling.
    pub(crate) fn split_off(&mut self, split: usize) -> LeafNode<K> {
        let sibling_keys: Keys<K> = self.keys.drain(split..).collect();
        let sibling_values: Handles = self.values.drain(split..).collect();
        LeafNode {
            next: self.next,
            keys: sibling_keys,
            values: sibling_values,
        }
    }

    /// Absorbs the right sibling's entries and takes over its chain link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K>) {
        self.keys.append(&mut right.keys);
        self.values.append(&mut right.values);
        self.next = right.next;
    }
}
