//! `domainkit-core` — domain-modeling building blocks.
//!
//! This crate contains **pure, in-memory** primitives (no persistence, no IO):
//!
//! - [`IdentityHandle`]: local token plus write-once business keys, with
//!   cross-slot identity reconciliation.
//! - [`structural`]: deep clone / deep equality / deep freeze over [`Value`]
//!   graphs, cycle safe.
//! - [`ValueObject`]: the validate → clone → freeze construction protocol and
//!   value equality built on top of it.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod structural;
pub mod value;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    BusinessKey, EffectiveId, IdentityHandle, IdentitySnapshot, LocalToken, TokenSource,
    UuidV4TokenSource,
};
pub use structural::{deep_clone, deep_equals, deep_freeze};
pub use value::{List, Map, Object, Record, Set, Value};
pub use value_object::{ImmutableValue, ValueObject, ValueObjectBuilder};
