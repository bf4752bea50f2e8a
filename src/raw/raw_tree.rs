use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;
use core::fmt::Write as _;

use smallvec::SmallVec;

use crate::config::TreeConfig;
use crate::error::TreeError;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, SearchResult};

/// The engine backing `BPlusTreeMap`.
///
/// All nodes live in `nodes` and are addressed by handle; leaf entries point
/// into the separate `values` arena so structural churn never moves a value.
/// Mutations descend once from the root recording the taken child index per
/// level, then walk that path back up to propagate splits or rebalancing.
pub(crate) struct RawBPlusTree<K, V> {
    config: TreeConfig,
    /// Arena owning every node of the tree.
    nodes: Arena<Node<K>>,
    /// Arena owning the stored values.
    values: Arena<V>,
    /// Root node, absent for an empty tree.
    root: Option<Handle>,
    /// Leftmost leaf, seeding full iteration.
    first_leaf: Option<Handle>,
    /// Number of key/value entries.
    len: usize,
}

/// One level of the root-to-leaf descent: the internal node visited and the
/// child index taken out of it.
struct PathElement {
    node: Handle,
    child_index: usize,
}

/// Descent path; depth is bounded by the configured height so this never
/// spills for a valid tree.
type Path = SmallVec<[PathElement; TreeConfig::MAX_HEIGHT]>;

impl<K, V> RawBPlusTree<K, V> {
    pub(crate) const fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Arena::new(),
            values: Arena::new(),
            root: None,
            first_leaf: None,
            len: 0,
        }
    }

    pub(crate) const fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn first_leaf(&self) -> Option<Handle> {
        self.first_leaf
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K> {
        self.nodes.get(handle)
    }

    pub(crate) fn value(&self, handle: Handle) -> &V {
        self.values.get(handle)
    }

    /// Releases every node and value; the configuration is kept.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.values.clear();
        self.root = None;
        self.first_leaf = None;
        self.len = 0;
    }
}

impl<K: Ord, V> RawBPlusTree<K, V> {
    /// Descends from the root to the leaf owning `key`.
    /// Returns the leaf handle and its index there if the key is present.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    current = internal.child(internal.search_child(key));
                }
                Node::Leaf(leaf) => {
                    if let SearchResult::Found(index) = leaf.search(key) {
                        return Some((current, index));
                    }
                    return None;
                }
            }
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, index) = self.search(key)?;
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        Some(self.values.get(leaf.value(index)))
    }

    pub(crate) fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, index) = self.search(key)?;
        let value_handle = self.nodes.get(leaf_handle).as_leaf().value(index);
        Some(self.values.get_mut(value_handle))
    }

    /// Replaces the value of an existing key, returning the old value.
    pub(crate) fn update<Q>(&mut self, key: &Q, value: V) -> Result<V, TreeError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let slot = self.get_mut(key).ok_or(TreeError::KeyNotFound)?;
        Ok(core::mem::replace(slot, value))
    }

    /// First position holding a key `>= key`: the start of a range scan.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    current = internal.child(internal.search_child(key));
                }
                Node::Leaf(leaf) => {
                    return match leaf.search(key) {
                        SearchResult::Found(index) => Some((current, index)),
                        SearchResult::NotFound(index) => {
                            if index < leaf.entry_count() {
                                Some((current, index))
                            } else {
                                // Everything here is smaller; the bound, if
                                // any, starts the next leaf.
                                leaf.next().map(|next| (next, 0))
                            }
                        }
                    };
                }
            }
        }
    }

    /// Descends to the leaf owning `key`, recording the child index taken at
    /// every internal node.
    fn locate_leaf<Q>(&self, root: Handle, key: &Q) -> (Handle, Path)
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut path = Path::new();
        let mut current = root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => {
                    let child_index = internal.search_child(key);
                    path.push(PathElement {
                        node: current,
                        child_index,
                    });
                    current = internal.child(child_index);
                }
                Node::Leaf(_) => return (current, path),
            }
        }
    }
}

impl<K: Clone + Ord, V> RawBPlusTree<K, V> {
    /// Inserts a new entry; the key must not be present.
    ///
    /// Fails with `DuplicateKey` without touching the tree, or with
    /// `HeightExceeded` when the leaf split would cascade into a new root
    /// above `max_height`. The height check runs before any mutation, so a
    /// failed insert leaves the tree exactly as it was.
    pub(crate) fn insert(&mut self, key: K, value: V) -> Result<(), TreeError> {
        let Some(root) = self.root else {
            let mut leaf = LeafNode::new();
            leaf.push(key, self.values.alloc(value));
            let handle = self.nodes.alloc(Node::Leaf(leaf));
            self.root = Some(handle);
            self.first_leaf = Some(handle);
            self.len = 1;
            return Ok(());
        };

        let (leaf_handle, mut path) = self.locate_leaf(root, &key);
        let leaf = self.nodes.get(leaf_handle).as_leaf();
        let index = match leaf.search(&key) {
            SearchResult::Found(_) => return Err(TreeError::DuplicateKey),
            SearchResult::NotFound(index) => index,
        };

        let splitting = leaf.entry_count() == self.config.leaf_capacity();
        if splitting && self.split_would_exceed_height(&path) {
            return Err(TreeError::HeightExceeded);
        }

        let value_handle = self.values.alloc(value);
        self.nodes.get_mut(leaf_handle).as_leaf_mut().insert(index, key, value_handle);
        self.len += 1;

        if splitting {
            self.split_leaf(leaf_handle, &mut path);
        }
        Ok(())
    }

    /// A split chain grows the root only if every internal node on the path
    /// is already full; in that case the new height is `path.len() + 2`.
    fn split_would_exceed_height(&self, path: &Path) -> bool {
        if path.len() + 2 <= self.config.max_height() {
            return false;
        }
        path.iter().all(|elem| self.nodes.get(elem.node).as_internal().child_count() == self.config.order())
    }

    /// Splits a leaf holding `leaf_capacity + 1` entries and installs the new
    /// sibling in the parent.
    fn split_leaf(&mut self, leaf_handle: Handle, path: &mut Path) {
        let split = self.config.min_leaf_entries();
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let sibling = leaf.split_off(split);
        let separator = sibling.key(0).clone();

        let sibling_handle = self.nodes.alloc(Node::Leaf(sibling));
        self.nodes.get_mut(leaf_handle).as_leaf_mut().set_next(Some(sibling_handle));

        self.propagate_split(path, separator, sibling_handle);
    }

    /// Installs a promoted separator and its new right sibling in the parent,
    /// splitting full ancestors as needed; growing a new root once the path
    /// is exhausted. The insert pre-validated the height bound.
    fn propagate_split(&mut self, path: &mut Path, mut separator: K, mut new_child: Handle) {
        let order = self.config.order();
        let split = self.internal_split_index();

        while let Some(elem) = path.pop() {
            let parent = self.nodes.get_mut(elem.node).as_internal_mut();
            parent.insert_child(elem.child_index, separator, new_child);
            if parent.child_count() <= order {
                return;
            }

            let (promoted, sibling) = parent.split_off(split);
            let sibling_handle = self.nodes.alloc(Node::Internal(sibling));
            self.nodes.get_mut(elem.node).as_internal_mut().set_next(Some(sibling_handle));

            separator = promoted;
            new_child = sibling_handle;
        }

        let old_root = self.root.expect("split propagated through an empty tree");
        let mut new_root = InternalNode::with_first_child(old_root);
        new_root.push_child(separator, new_child);
        self.root = Some(self.nodes.alloc(Node::Internal(new_root)));
    }

    /// Split index among an overflowing internal node's children, clamped so
    /// both halves keep at least two children (the unclamped index would
    /// strand a single-child sibling at order 3).
    fn internal_split_index(&self) -> usize {
        self.config.min_children().min(self.config.order() - 2)
    }

    /// Removes an entry, rebalancing underflowing nodes back up the path.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Result<V, TreeError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let Some(root) = self.root else {
            return Err(TreeError::KeyNotFound);
        };

        let (leaf_handle, mut path) = self.locate_leaf(root, key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let index = match leaf.search(key) {
            SearchResult::Found(index) => index,
            SearchResult::NotFound(_) => return Err(TreeError::KeyNotFound),
        };

        let (_, value_handle) = leaf.remove(index);
        let value = self.values.take(value_handle);
        self.len -= 1;

        if self.len == 0 {
            // Last entry of the root leaf: the tree is empty again.
            self.nodes.clear();
            self.root = None;
            self.first_leaf = None;
            return Ok(value);
        }

        let leaf = self.nodes.get(leaf_handle).as_leaf();
        if path.is_empty() || leaf.entry_count() >= self.config.min_leaf_entries() {
            return Ok(value);
        }

        self.rebalance_leaf(leaf_handle, &mut path);
        Ok(value)
    }

    /// Restores an underflowing leaf by borrowing one entry from the richer
    /// sibling, or merging with it when neither sibling has a surplus.
    fn rebalance_leaf(&mut self, leaf_handle: Handle, path: &mut Path) {
        let elem = path.last().expect("leaf rebalancing requires a parent");
        let parent_handle = elem.node;
        let child_index = elem.child_index;

        let parent = self.nodes.get(parent_handle).as_internal();
        let left = (child_index > 0).then(|| parent.child(child_index - 1));
        let right = (child_index + 1 < parent.child_count()).then(|| parent.child(child_index + 1));

        let use_left = match (left, right) {
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => {
                // Prefer the sibling with strictly more entries, ties to the left.
                self.nodes.get(l).as_leaf().entry_count() >= self.nodes.get(r).as_leaf().entry_count()
            }
            (None, None) => unreachable!("internal node with a single child"),
        };
        let min = self.config.min_leaf_entries();

        if use_left {
            let donor_handle = left.expect("left sibling chosen but absent");
            if self.nodes.get(donor_handle).as_leaf().entry_count() > min {
                // Donor's last entry becomes this leaf's first; the separator
                // left of this leaf tracks its new first key.
                let (key, value) = self.nodes.get_mut(donor_handle).as_leaf_mut().pop().expect("donor leaf is empty");
                let separator = key.clone();
                self.nodes.get_mut(leaf_handle).as_leaf_mut().push_front(key, value);
                self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index - 1, separator);
            } else {
                let leaf = match self.nodes.take(leaf_handle) {
                    Node::Leaf(leaf) => leaf,
                    Node::Internal(_) => panic!("expected leaf node"),
                };
                self.nodes.get_mut(donor_handle).as_leaf_mut().merge_with_right(leaf);
                self.remove_from_parent(path, child_index - 1);
            }
        } else {
            let donor_handle = right.expect("right sibling chosen but absent");
            if self.nodes.get(donor_handle).as_leaf().entry_count() > min {
                // Donor's first entry moves to this leaf's back; the
                // separator above the donor tracks its new first key.
                let (key, value) =
                    self.nodes.get_mut(donor_handle).as_leaf_mut().pop_front().expect("donor leaf is empty");
                self.nodes.get_mut(leaf_handle).as_leaf_mut().push(key, value);
                let separator = self.nodes.get(donor_handle).as_leaf().key(0).clone();
                self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index, separator);
            } else {
                let sibling = match self.nodes.take(donor_handle) {
                    Node::Leaf(leaf) => leaf,
                    Node::Internal(_) => panic!("expected leaf node"),
                };
                self.nodes.get_mut(leaf_handle).as_leaf_mut().merge_with_right(sibling);
                self.remove_from_parent(path, child_index);
            }
        }
    }

    /// Removes the separator at `separator_index` and the (already merged
    /// away) child to its right from the parent on top of `path`, then keeps
    /// rebalancing upward: collapse the root when it falls to one child, or
    /// rebalance a non-root parent that underflowed.
    fn remove_from_parent(&mut self, path: &mut Path, separator_index: usize) {
        let elem = path.pop().expect("separator removal requires a parent");
        let parent_handle = elem.node;

        let parent = self.nodes.get_mut(parent_handle).as_internal_mut();
        let _ = parent.remove_child(separator_index);
        let child_count = parent.child_count();

        if path.is_empty() {
            if child_count == 1 {
                // Root collapse: the sole child becomes the new root.
                let new_root = self.nodes.get(parent_handle).as_internal().child(0);
                self.nodes.free(parent_handle);
                self.root = Some(new_root);
            }
            return;
        }

        if child_count < self.config.min_children() {
            self.rebalance_internal(parent_handle, path);
        }
    }

    /// Internal-node analog of `rebalance_leaf`: borrowing rotates one child
    /// and one separator through the parent; merging pulls the parent
    /// separator down between the merged halves.
    fn rebalance_internal(&mut self, node_handle: Handle, path: &mut Path) {
        let elem = path.last().expect("internal rebalancing requires a parent");
        let parent_handle = elem.node;
        let child_index = elem.child_index;

        let parent = self.nodes.get(parent_handle).as_internal();
        let left = (child_index > 0).then(|| parent.child(child_index - 1));
        let right = (child_index + 1 < parent.child_count()).then(|| parent.child(child_index + 1));

        let use_left = match (left, right) {
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(l), Some(r)) => {
                self.nodes.get(l).as_internal().child_count() >= self.nodes.get(r).as_internal().child_count()
            }
            (None, None) => unreachable!("internal node with a single child"),
        };
        let min = self.config.min_children();

        if use_left {
            let donor_handle = left.expect("left sibling chosen but absent");
            if self.nodes.get(donor_handle).as_internal().child_count() > min {
                // Rotate right: the parent separator comes down in front of
                // this node, the donor's last key replaces it in the parent.
                let separator = self.nodes.get(parent_handle).as_internal().key(child_index - 1).clone();
                let (donor_key, donor_child) =
                    self.nodes.get_mut(donor_handle).as_internal_mut().pop_child().expect("donor node is empty");
                self.nodes.get_mut(node_handle).as_internal_mut().push_child_front(separator, donor_child);
                self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index - 1, donor_key);
            } else {
                let separator = self.nodes.get(parent_handle).as_internal().key(child_index - 1).clone();
                let node = match self.nodes.take(node_handle) {
                    Node::Internal(internal) => internal,
                    Node::Leaf(_) => panic!("expected internal node"),
                };
                self.nodes.get_mut(donor_handle).as_internal_mut().merge_with_right(separator, node);
                self.remove_from_parent(path, child_index - 1);
            }
        } else {
            let donor_handle = right.expect("right sibling chosen but absent");
            if self.nodes.get(donor_handle).as_internal().child_count() > min {
                // Rotate left: the parent separator comes down at this node's
                // back, the donor's first key replaces it in the parent.
                let separator = self.nodes.get(parent_handle).as_internal().key(child_index).clone();
                let (donor_key, donor_child) =
                    self.nodes.get_mut(donor_handle).as_internal_mut().pop_child_front().expect("donor node is empty");
                self.nodes.get_mut(node_handle).as_internal_mut().push_child(separator, donor_child);
                self.nodes.get_mut(parent_handle).as_internal_mut().set_key(child_index, donor_key);
            } else {
                let separator = self.nodes.get(parent_handle).as_internal().key(child_index).clone();
                let sibling = match self.nodes.take(donor_handle) {
                    Node::Internal(internal) => internal,
                    Node::Leaf(_) => panic!("expected internal node"),
                };
                self.nodes.get_mut(node_handle).as_internal_mut().merge_with_right(separator, sibling);
                self.remove_from_parent(path, child_index);
            }
        }
    }
}

impl<K: fmt::Debug, V> RawBPlusTree<K, V> {
    /// Renders the tree level by level for human inspection: separator keys
    /// per internal node, entry keys per leaf, leaves labelled level 0.
    /// Read-only; each level is walked along its sibling chain.
    pub(crate) fn dump(&self) -> String {
        let Some(root) = self.root else {
            return String::from("empty tree\n");
        };

        // Leftmost node of every level, root first.
        let mut heads: SmallVec<[Handle; TreeConfig::MAX_HEIGHT]> = SmallVec::new();
        let mut current = root;
        loop {
            heads.push(current);
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(_) => break,
            }
        }

        let mut out = String::new();
        let height = heads.len();
        for (depth, &head) in heads.iter().enumerate() {
            let _ = writeln!(out, "LEVEL {}:", height - 1 - depth);
            let mut row = Some(head);
            while let Some(handle) = row {
                row = match self.nodes.get(handle) {
                    Node::Internal(internal) => {
                        out.push_str("node:");
                        for key in internal.keys() {
                            let _ = write!(out, " {key:?}");
                        }
                        out.push('\n');
                        internal.next()
                    }
                    Node::Leaf(leaf) => {
                        out.push_str("leaf:");
                        for key in leaf.keys() {
                            let _ = write!(out, " {key:?}");
                        }
                        out.push('\n');
                        leaf.next()
                    }
                };
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;
    use alloc::format;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    impl<K: Clone + Ord + fmt::Debug, V> RawBPlusTree<K, V> {
        /// Walks the whole tree and panics on any violated invariant:
        /// key ordering, separator partitioning, occupancy bounds, uniform
        /// leaf depth, sibling-chain consistency, and `len` agreement.
        pub(crate) fn validate_invariants(&self) {
            let Some(root) = self.root else {
                assert_eq!(self.len, 0, "empty tree with len {}", self.len);
                assert!(self.first_leaf.is_none(), "empty tree with a first leaf");
                return;
            };

            let mut levels: Vec<Vec<Handle>> = Vec::new();
            let (_, _, entries) = self.validate_node(root, 0, true, &mut levels);
            assert_eq!(self.len, entries, "len {} but {} entries reachable", self.len, entries);

            // Every level must be one chain in left-to-right order; leaves
            // additionally seed from `first_leaf`.
            for (depth, nodes) in levels.iter().enumerate() {
                for pair in nodes.windows(2) {
                    let next = match self.nodes.get(pair[0]) {
                        Node::Internal(internal) => internal.next(),
                        Node::Leaf(leaf) => leaf.next(),
                    };
                    assert_eq!(next, Some(pair[1]), "broken sibling chain at depth {depth}");
                }
                let last_next = match self.nodes.get(*nodes.last().unwrap()) {
                    Node::Internal(internal) => internal.next(),
                    Node::Leaf(leaf) => leaf.next(),
                };
                assert_eq!(last_next, None, "trailing sibling link at depth {depth}");
            }
            let leaves = levels.last().unwrap();
            assert_eq!(self.first_leaf, leaves.first().copied(), "first_leaf does not match leftmost leaf");
        }

        /// Returns (min key, max key, entry count) of the subtree. `levels`
        /// collects handles per depth in visit (left-to-right) order.
        fn validate_node(
            &self,
            handle: Handle,
            depth: usize,
            is_root: bool,
            levels: &mut Vec<Vec<Handle>>,
        ) -> (K, K, usize) {
            if levels.len() == depth {
                levels.push(Vec::new());
            }
            levels[depth].push(handle);

            match self.nodes.get(handle) {
                Node::Leaf(leaf) => {
                    let count = leaf.entry_count();
                    assert!(count >= 1, "empty leaf in tree");
                    assert!(count <= self.config.leaf_capacity(), "leaf over capacity: {count}");
                    if !is_root {
                        assert!(
                            count >= self.config.min_leaf_entries(),
                            "non-root leaf under-occupied: {count} < {}",
                            self.config.min_leaf_entries()
                        );
                    }
                    for pair in leaf.keys().windows(2) {
                        assert!(pair[0] < pair[1], "leaf keys not strictly ascending");
                    }
                    (leaf.key(0).clone(), leaf.key(count - 1).clone(), count)
                }
                Node::Internal(internal) => {
                    let children = internal.child_count();
                    assert_eq!(children, internal.key_count() + 1, "child/key count mismatch");
                    assert!(children <= self.config.order(), "internal node over order: {children}");
                    let min_children = if is_root { 2 } else { (self.config.order() / 2).max(2) };
                    assert!(children >= min_children, "internal node under-occupied: {children} < {min_children}");
                    for pair in internal.keys().windows(2) {
                        assert!(pair[0] < pair[1], "separator keys not strictly ascending");
                    }

                    let mut entries = 0;
                    let mut subtree_min = None;
                    let mut previous_max = None;
                    for index in 0..children {
                        let (child_min, child_max, child_entries) =
                            self.validate_node(internal.child(index), depth + 1, false, levels);
                        entries += child_entries;

                        // Child `i` owns [keys[i - 1], keys[i]).
                        if index > 0 {
                            assert!(
                                *internal.key(index - 1) <= child_min,
                                "child holds a key below its left separator"
                            );
                        }
                        if index < children - 1 {
                            assert!(child_max < *internal.key(index), "child holds a key at or above its separator");
                        }
                        if let Some(previous) = &previous_max {
                            assert!(*previous < child_min, "sibling subtrees overlap");
                        }
                        subtree_min.get_or_insert(child_min);
                        previous_max = Some(child_max);
                    }
                    (subtree_min.unwrap(), previous_max.unwrap(), entries)
                }
            }
        }
    }

    fn small_config() -> TreeConfig {
        TreeConfig::new(4, 3, 3).unwrap()
    }

    #[test]
    fn insert_then_get_round_trip() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(small_config());
        for key in 1..=7 {
            tree.insert(key, key * 10).unwrap();
            tree.validate_invariants();
        }
        for key in 1..=7 {
            assert_eq!(tree.get(&key), Some(&(key * 10)));
        }
        assert_eq!(tree.get(&0), None);
        assert_eq!(tree.get(&8), None);
    }

    #[test]
    fn duplicate_insert_is_rejected_without_side_effects() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(small_config());
        for key in 1..=7 {
            tree.insert(key, key * 10).unwrap();
        }
        assert_eq!(tree.insert(4, 999), Err(TreeError::DuplicateKey));
        assert_eq!(tree.len(), 7);
        assert_eq!(tree.get(&4), Some(&40));
        tree.validate_invariants();
    }

    #[test]
    fn remove_missing_key_reports_not_found() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(small_config());
        assert_eq!(tree.remove(&1), Err(TreeError::KeyNotFound));
        tree.insert(1, 10).unwrap();
        assert_eq!(tree.remove(&2), Err(TreeError::KeyNotFound));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn removing_every_key_empties_the_tree() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(TreeConfig::new(10, 3, 3).unwrap());
        for key in 0..64 {
            tree.insert(key, key).unwrap();
        }
        for key in 0..64 {
            assert_eq!(tree.remove(&key), Ok(key));
            tree.validate_invariants();
        }
        assert!(tree.is_empty());
        assert!(tree.first_leaf().is_none());
        for key in 0..64 {
            assert_eq!(tree.get(&key), None);
        }
    }

    #[test]
    fn update_replaces_in_place() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(small_config());
        tree.insert(1, 10).unwrap();
        assert_eq!(tree.update(&1, 11), Ok(10));
        assert_eq!(tree.get(&1), Some(&11));
        assert_eq!(tree.update(&2, 20), Err(TreeError::KeyNotFound));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn height_bound_rejects_insert_and_leaves_tree_unchanged() {
        // order 3, leaf capacity 2, two levels: the root can hold three
        // leaves of two entries each, but ascending inserts split before
        // leaves fill, exhausting the root earlier.
        let config = TreeConfig::new(2, 3, 2).unwrap();
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(config);
        for key in 1..=4 {
            tree.insert(key, key).unwrap();
        }

        let before = tree.dump();
        assert_eq!(tree.insert(5, 5), Err(TreeError::HeightExceeded));
        assert_eq!(tree.dump(), before);
        assert_eq!(tree.len(), 4);
        for key in 1..=4 {
            assert_eq!(tree.get(&key), Some(&key));
        }
        tree.validate_invariants();

        // Removing entries makes room again.
        assert_eq!(tree.remove(&1), Ok(1));
        tree.insert(5, 5).unwrap();
        tree.validate_invariants();
    }

    #[test]
    fn single_level_tree_is_bounded_by_leaf_capacity() {
        let config = TreeConfig::new(1, 3, 3).unwrap();
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(config);
        for key in 0..3 {
            tree.insert(key, key).unwrap();
        }
        assert_eq!(tree.insert(3, 3), Err(TreeError::HeightExceeded));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn dump_lists_levels_root_first() {
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(small_config());
        assert_eq!(tree.dump(), "empty tree\n");

        for key in 1..=7 {
            tree.insert(key, key * 10).unwrap();
        }
        assert_eq!(tree.dump(), "LEVEL 1:\nnode: 3 5\nLEVEL 0:\nleaf: 1 2\nleaf: 3 4\nleaf: 5 6 7\n");
    }

    /// Top level number of a dump, i.e. the height minus one.
    fn top_level(dump: &str) -> usize {
        dump.lines()
            .next()
            .and_then(|line| line.strip_prefix("LEVEL "))
            .and_then(|line| line.strip_suffix(':'))
            .and_then(|level| level.parse().ok())
            .expect("malformed dump header")
    }

    #[test]
    fn root_collapse_reduces_height() {
        let config = TreeConfig::new(10, 4, 2).unwrap();
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(config);
        for key in 0..32 {
            tree.insert(key, key).unwrap();
        }
        // 32 entries in leaves of at most 2 cannot fit under a single root.
        assert!(top_level(&tree.dump()) >= 2);

        for key in 2..32 {
            tree.remove(&key).unwrap();
            tree.validate_invariants();
        }
        // Two entries span at most two leaves under at most one internal node.
        assert!(top_level(&tree.dump()) <= 1);
        assert_eq!(tree.get(&0), Some(&0));
        assert_eq!(tree.get(&1), Some(&1));
    }

    #[test]
    fn maximum_limits_spill_inline_node_storage() {
        // Order and leaf capacity of 64 push key and child vectors well past
        // their inline capacity, so node storage spills to the heap.
        let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(TreeConfig::default());
        for key in 0..3_000 {
            tree.insert(key, key * 10).unwrap();
            if key % 256 == 0 {
                tree.validate_invariants();
            }
        }
        tree.validate_invariants();
        // 3000 entries in leaves of 32 (ascending inserts split at the
        // midpoint) need two internal levels.
        assert!(top_level(&tree.dump()) >= 2);
        assert_eq!(tree.get(&0), Some(&0));
        assert_eq!(tree.get(&1_499), Some(&14_990));
        assert_eq!(tree.get(&2_999), Some(&29_990));

        // Descending removal drains through left-sibling borrows and merges.
        for key in (0..3_000).rev() {
            assert_eq!(tree.remove(&key), Ok(key * 10));
            if key % 64 == 0 {
                tree.validate_invariants();
            }
        }
        assert!(tree.is_empty());
        assert!(tree.first_leaf().is_none());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i16, i64),
        Remove(i16),
        Update(i16, i64),
        Get(i16),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let key = -300i16..300;
        prop_oneof![
            4 => (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Insert(k, v)),
            2 => key.clone().prop_map(Op::Remove),
            1 => (key.clone(), any::<i64>()).prop_map(|(k, v)| Op::Update(k, v)),
            1 => key.prop_map(Op::Get),
        ]
    }

    /// Configurations chosen to stress every rebalancing shape: minimum
    /// order, minimum leaf capacity, odd/even mixes, taller trees.
    fn config_strategy() -> impl Strategy<Value = TreeConfig> {
        (3usize..=8, 1usize..=8).prop_map(|(order, leaf_capacity)| TreeConfig::new(10, order, leaf_capacity).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn behaves_like_btreemap(config in config_strategy(), ops in prop::collection::vec(op_strategy(), 0..400)) {
            let mut tree: RawBPlusTree<i16, i64> = RawBPlusTree::new(config);
            let mut model: BTreeMap<i16, i64> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key, value) => {
                        let expected = if model.contains_key(&key) {
                            Err(TreeError::DuplicateKey)
                        } else {
                            model.insert(key, value);
                            Ok(())
                        };
                        prop_assert_eq!(tree.insert(key, value), expected);
                    }
                    Op::Remove(key) => {
                        let expected = model.remove(&key).ok_or(TreeError::KeyNotFound);
                        prop_assert_eq!(tree.remove(&key), expected);
                    }
                    Op::Update(key, value) => {
                        let expected = match model.get_mut(&key) {
                            Some(slot) => Ok(core::mem::replace(slot, value)),
                            None => Err(TreeError::KeyNotFound),
                        };
                        prop_assert_eq!(tree.update(&key, value), expected);
                    }
                    Op::Get(key) => {
                        prop_assert_eq!(tree.get(&key), model.get(&key));
                    }
                }
                tree.validate_invariants();
                prop_assert_eq!(tree.len(), model.len());
            }
        }

        #[test]
        fn leaf_chain_stays_sorted(config in config_strategy(), ops in prop::collection::vec(op_strategy(), 0..300)) {
            let mut tree: RawBPlusTree<i16, i64> = RawBPlusTree::new(config);
            let mut model: BTreeMap<i16, i64> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(key, value) => {
                        if tree.insert(key, value).is_ok() {
                            model.insert(key, value);
                        }
                    }
                    Op::Remove(key) => {
                        if tree.remove(&key).is_ok() {
                            model.remove(&key);
                        }
                    }
                    _ => {}
                }

                // Walk the leaf chain and compare against the model order.
                let mut walked: Vec<i16> = Vec::new();
                let mut current = tree.first_leaf();
                while let Some(handle) = current {
                    let leaf = tree.node(handle).as_leaf();
                    walked.extend(leaf.keys().iter().copied());
                    current = leaf.next();
                }
                let expected: Vec<i16> = model.keys().copied().collect();
                prop_assert_eq!(walked, expected);
            }
        }

        #[test]
        fn lower_bound_finds_first_key_at_or_above(
            keys in prop::collection::btree_set(-300i16..300, 0..120),
            needle in -310i16..310,
        ) {
            let mut tree: RawBPlusTree<i16, i64> = RawBPlusTree::new(TreeConfig::new(10, 4, 4).unwrap());
            for &key in &keys {
                tree.insert(key, i64::from(key)).unwrap();
            }

            let expected = keys.range(needle..).next().copied();
            let found = tree.lower_bound(&needle).map(|(handle, index)| *tree.node(handle).as_leaf().key(index));
            prop_assert_eq!(found, expected);
        }

        #[test]
        fn dump_mentions_every_key_once(keys in prop::collection::btree_set(0i64..200, 1..60)) {
            let mut tree: RawBPlusTree<i64, i64> = RawBPlusTree::new(TreeConfig::new(10, 4, 4).unwrap());
            for &key in &keys {
                tree.insert(key, key).unwrap();
            }

            let dump = tree.dump();
            let leaf_section: Vec<i64> = dump
                .lines()
                .skip_while(|line| *line != "LEVEL 0:")
                .skip(1)
                .flat_map(|line| {
                    line.strip_prefix("leaf:").expect("level 0 holds only leaves").split_whitespace().map(|key| key.parse().unwrap()).collect::<Vec<_>>()
                })
                .collect();
            let expected: Vec<i64> = keys.iter().copied().collect();
            prop_assert_eq!(leaf_section, expected);
            prop_assert_eq!(dump.matches("LEVEL 0:").count(), 1, "dump: {}", format!("{dump:?}"));
        }
    }
}
