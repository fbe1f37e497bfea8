//! Entity trait: identity + continuity across state changes.

use crate::id::{BusinessKey, IdentityHandle};

/// Entity marker + minimal interface.
///
/// Entities are compared through their embedded [`IdentityHandle`], never by
/// their attributes.
pub trait Entity {
    /// Business key type carried by the identity handle.
    type Key: BusinessKey;

    /// Returns the entity's identity handle.
    fn id(&self) -> &IdentityHandle<Self::Key>;

    /// Identity equality; false when `other` is absent.
    fn same_identity_as(&self, other: Option<&Self>) -> bool {
        self.id().equals(other.map(Self::id))
    }
}
