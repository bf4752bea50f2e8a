//! An in-memory B+Tree index with configurable fan-out and height bounds.
//!
//! This crate provides [`BPlusTreeMap`], an ordered map over unique keys built
//! on a B+tree: all entries live in leaves linked into an ascending chain,
//! internal nodes hold only separator keys. Unlike the standard library's
//! `BTreeMap`, node fan-out and tree height are chosen at construction time
//! through a [`TreeConfig`] and enforced for the life of the tree, the same
//! discipline an on-disk index imposes, minus the disk:
//!
//! - [`insert`](BPlusTreeMap::insert) rejects duplicate keys and splits
//!   overflowing nodes, growing the root only while `max_height` allows it
//! - [`remove`](BPlusTreeMap::remove) rebalances underflowing nodes by
//!   borrowing from or merging with a sibling, collapsing the root as the
//!   tree shrinks
//! - [`range`](BPlusTreeMap::range) scans an inclusive key interval lazily in
//!   ascending order along the leaf chain
//!
//! # Example
//!
//! ```
//! use bptree::{BPlusTreeMap, TreeError};
//!
//! let mut index = BPlusTreeMap::with_limits(4, 8, 8).unwrap();
//!
//! for key in 1..=7i64 {
//!     index.insert(key, key * 10).unwrap();
//! }
//!
//! assert_eq!(index.get(&4), Some(&40));
//! assert_eq!(index.insert(4, 0), Err(TreeError::DuplicateKey));
//!
//! let values: Vec<i64> = index.range(2, 5).map(|(_, v)| *v).collect();
//! assert_eq!(values, [20, 30, 40, 50]);
//!
//! assert_eq!(index.remove(&4), Ok(40));
//! assert_eq!(index.get(&4), None);
//! ```
//!
//! # Implementation
//!
//! Nodes are stored in an arena and addressed by compact handles, so sibling
//! links never carry ownership; the tree owns its nodes through the arena
//! alone. Every mutation descends once from the root, carrying an explicit
//! path stack, and propagates splits or rebalancing back up along it. All
//! operations are `O(height)` node visits and the structure is
//! single-threaded; callers needing shared access must serialize mutations
//! externally.
//!
//! The crate is `no_std` compatible, requiring only `alloc`.

#![no_std]
#![forbid(unsafe_code)]
#![forbid(keyword_idents)]
#![forbid(non_ascii_idents)]
#![forbid(unreachable_pub)]
#![warn(clippy::all)]
#![warn(clippy::cargo)]
#![warn(clippy::pedantic)]

extern crate alloc;

mod config;
mod error;
mod raw;

pub mod tree_map;

pub use config::TreeConfig;
pub use error::{ConfigError, TreeError};
pub use tree_map::{BPlusTreeMap, Iter, Range};
