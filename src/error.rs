//! Error types for the B+tree.

use thiserror::Error;

use crate::config::TreeConfig;

/// Rejected tree configuration.
///
/// Returned when constructing a tree from parameters outside the supported
/// limits; no tree is created. The offending value is carried in the variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// `order` is outside `3..=MAX_ORDER`.
    #[error("invalid order {0}: must be in 3..={max}", max = TreeConfig::MAX_ORDER)]
    InvalidOrder(usize),

    /// `leaf_capacity` is outside `1..=MAX_LEAF_CAPACITY`.
    #[error("invalid leaf capacity {0}: must be in 1..={max}", max = TreeConfig::MAX_LEAF_CAPACITY)]
    InvalidLeafCapacity(usize),

    /// `max_height` is outside `1..=MAX_HEIGHT`.
    #[error("invalid max height {0}: must be in 1..={max}", max = TreeConfig::MAX_HEIGHT)]
    InvalidMaxHeight(usize),
}

/// A failed tree operation.
///
/// All variants are recoverable and leave the tree exactly as it was before
/// the call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum TreeError {
    /// Insert of a key that is already present.
    #[error("key is already present")]
    DuplicateKey,

    /// Remove or update of a key that is not present.
    #[error("key is not present")]
    KeyNotFound,

    /// An insert would split the root past the configured `max_height`.
    ///
    /// The tree was configured with insufficient height, order, or leaf
    /// capacity for its load; entries must be removed or a larger tree built.
    #[error("insert would exceed the configured maximum height")]
    HeightExceeded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn config_error_display_names_limits() {
        assert_eq!(format!("{}", ConfigError::InvalidOrder(2)), "invalid order 2: must be in 3..=64");
        assert_eq!(
            format!("{}", ConfigError::InvalidLeafCapacity(0)),
            "invalid leaf capacity 0: must be in 1..=64"
        );
        assert_eq!(format!("{}", ConfigError::InvalidMaxHeight(11)), "invalid max height 11: must be in 1..=10");
    }

    #[test]
    fn tree_error_display() {
        assert_eq!(format!("{}", TreeError::DuplicateKey), "key is already present");
        assert_eq!(format!("{}", TreeError::KeyNotFound), "key is not present");
    }
}
