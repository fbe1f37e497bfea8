//! Aggregate root trait: the consistency boundary around owned entities and
//! value objects.

use crate::entity::Entity;

/// Aggregate root marker + minimal interface.
///
/// An aggregate root is an [`Entity`] that exclusively owns every value object
/// and child entity reachable from it. Outside code holds references to the
/// root only.
pub trait AggregateRoot: Entity {
    /// Monotonically increasing version of the aggregate's state.
    fn version(&self) -> u64;
}
