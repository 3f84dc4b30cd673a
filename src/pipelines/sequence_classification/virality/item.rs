use std::fmt::Debug;

/// A trait for items that can be used for virality classification
pub trait Item: Send + Sync + Clone + Debug {
    /// Returns the input text for the item
    fn input(&self) -> &str;

    /// Returns the side features for the item, in the configured feature order
    fn features(&self) -> &[i32];

    /// Returns the class id for the item
    fn class_id(&self) -> usize;
}
