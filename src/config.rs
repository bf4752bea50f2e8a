//! Tree configuration: capacity and height bounds, fixed at creation.

use crate::error::ConfigError;

/// Capacity bounds for a [`BPlusTreeMap`](crate::BPlusTreeMap).
///
/// A configuration is validated once, at construction, and never changes for
/// the life of the tree:
///
/// - `order` is the maximum number of children an internal node may hold
/// - `leaf_capacity` is the maximum number of entries a leaf may hold
/// - `max_height` bounds the tree depth; an insert whose splits would grow
///   the root past it fails with
///   [`TreeError::HeightExceeded`](crate::TreeError::HeightExceeded)
///
/// # Examples
///
/// ```
/// use bptree::{ConfigError, TreeConfig};
///
/// let config = TreeConfig::new(4, 16, 32).unwrap();
/// assert_eq!(config.order(), 16);
///
/// assert_eq!(TreeConfig::new(4, 2, 32), Err(ConfigError::InvalidOrder(2)));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TreeConfig {
    max_height: usize,
    order: usize,
    leaf_capacity: usize,
}

impl TreeConfig {
    /// Smallest usable order; below this a split cannot produce two children.
    pub const MIN_ORDER: usize = 3;
    /// Largest supported order.
    pub const MAX_ORDER: usize = 64;
    /// Largest supported leaf capacity.
    pub const MAX_LEAF_CAPACITY: usize = 64;
    /// Largest supported height.
    pub const MAX_HEIGHT: usize = 10;

    /// Builds a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first parameter outside its
    /// supported range.
    pub const fn new(max_height: usize, order: usize, leaf_capacity: usize) -> Result<Self, ConfigError> {
        if order < Self::MIN_ORDER || order > Self::MAX_ORDER {
            return Err(ConfigError::InvalidOrder(order));
        }
        if leaf_capacity < 1 || leaf_capacity > Self::MAX_LEAF_CAPACITY {
            return Err(ConfigError::InvalidLeafCapacity(leaf_capacity));
        }
        if max_height < 1 || max_height > Self::MAX_HEIGHT {
            return Err(ConfigError::InvalidMaxHeight(max_height));
        }
        Ok(Self {
            max_height,
            order,
            leaf_capacity,
        })
    }

    /// Bound on tree depth, in levels (a lone root leaf is height 1).
    #[must_use]
    pub const fn max_height(&self) -> usize {
        self.max_height
    }

    /// Maximum children per internal node.
    #[must_use]
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Maximum entries per leaf.
    #[must_use]
    pub const fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Leaf occupancy below which a removal triggers rebalancing; also the
    /// number of entries the left node keeps in a leaf split.
    #[inline]
    pub(crate) const fn min_leaf_entries(&self) -> usize {
        self.leaf_capacity.div_ceil(2)
    }

    /// Child count below which a removal triggers internal rebalancing.
    #[inline]
    pub(crate) const fn min_children(&self) -> usize {
        self.order.div_ceil(2)
    }
}

impl Default for TreeConfig {
    /// The most permissive configuration: maximum order, leaf capacity, and
    /// height.
    fn default() -> Self {
        Self {
            max_height: Self::MAX_HEIGHT,
            order: Self::MAX_ORDER,
            leaf_capacity: Self::MAX_LEAF_CAPACITY,
        }
    }
}
