//! Value objects: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

use core::fmt;
use core::marker::PhantomData;

use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::structural::{deep_clone, deep_equals, deep_freeze};
use crate::value::{Record, Value, release_graph};

/// Sealed props of a value object: a deeply cloned, deeply frozen record
/// tagged with the concrete value type it belongs to.
///
/// Once constructed, no node reachable from [`ImmutableValue::props`] accepts
/// writes, and no caller-held handle into the original input reaches it.
#[derive(Debug, Clone)]
pub struct ImmutableValue {
    type_tag: &'static str,
    props: Value,
}

impl ImmutableValue {
    /// Construction protocol: validate the caller's input, then clone, then
    /// freeze the clone.
    ///
    /// Validation sees the original, unfrozen input. Either a fully frozen
    /// instance is returned or nothing is.
    pub fn seal(
        type_tag: &'static str,
        raw: Value,
        validate: impl FnOnce(&Value) -> DomainResult<()>,
    ) -> DomainResult<Self> {
        if let Err(err) = Self::check(type_tag, &raw, validate) {
            debug!(type_tag, error = %err, "value object rejected");
            return Err(err);
        }

        let props = deep_clone(&raw);
        deep_freeze(&props);
        Ok(Self { type_tag, props })
    }

    /// Shape check plus the type's own validation hook, without sealing.
    pub fn check(
        type_tag: &'static str,
        raw: &Value,
        validate: impl FnOnce(&Value) -> DomainResult<()>,
    ) -> DomainResult<()> {
        if raw.as_record().is_none() {
            return Err(DomainError::validation(format!(
                "{type_tag} props must be a record, got {}",
                raw.kind_name()
            )));
        }
        validate(raw)
    }

    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    /// Frozen props; always a record.
    pub fn props(&self) -> &Value {
        &self.props
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.props.get(key)
    }

    /// Value equality: same instance, or same type tag and structurally
    /// equal props. False when `other` is absent.
    pub fn equals(&self, other: Option<&ImmutableValue>) -> bool {
        let Some(other) = other else {
            return false;
        };
        if self.props.ptr_eq(&other.props) {
            return true;
        }
        self.type_tag == other.type_tag && deep_equals(&self.props, &other.props)
    }

    /// Shallow merge of `partial` over the current props: `{ ...props, ...partial }`.
    ///
    /// The result is unsealed; callers run it back through [`Self::seal`].
    pub fn merged(&self, partial: &Value) -> DomainResult<Value> {
        let Some(patch) = partial.as_record() else {
            return Err(DomainError::validation(format!(
                "{} update must be a record, got {}",
                self.type_tag,
                partial.kind_name()
            )));
        };

        let merged: Record = self
            .props
            .as_record()
            .map(Record::entries)
            .unwrap_or_default()
            .into_iter()
            .collect();
        for (k, v) in patch.entries() {
            merged.put(k, v);
        }
        Ok(Value::Record(merged))
    }
}

impl Drop for ImmutableValue {
    /// Sealed props may be cyclic; break the cycles once no one else holds
    /// any part of the graph.
    fn drop(&mut self) {
        release_graph(&self.props);
    }
}

impl PartialEq for ImmutableValue {
    fn eq(&self, other: &Self) -> bool {
        self.equals(Some(other))
    }
}

/// Value object contract.
///
/// Value objects are domain objects that are **immutable** and **compared by value**.
/// They represent concepts where identity doesn't matter - only the values matter.
///
/// ## Value Object vs Entity
///
/// - **Value Object**: No identity (two value objects with same values are equal)
/// - **Entity**: Has identity (two entities with the same identity handle are the same entity)
///
/// ## Construction
///
/// Every value object is built through the same protocol:
///
/// 1. `validate(&props)` runs against the caller's input and may reject it
///    with [`DomainError::Validation`].
/// 2. The props are deep-cloned, then the clone is deep-frozen.
///
/// "Modifying" a value object with [`ValueObject::with`] merges a partial
/// record over the current props and reruns the whole protocol, producing a
/// new instance.
///
/// ## Usage Pattern
///
/// ```ignore
/// #[derive(Debug, Clone)]
/// struct Money(ImmutableValue);
///
/// impl ValueObject for Money {
///     const TYPE_TAG: &'static str = "Money";
///
///     fn validate(props: &Value) -> DomainResult<()> {
///         match props.get("amount").and_then(|v| v.as_int()) {
///             Some(a) if a >= 0 => Ok(()),
///             _ => Err(DomainError::validation("amount must be a non-negative int")),
///         }
///     }
///
///     fn from_sealed(sealed: ImmutableValue) -> Self {
///         Self(sealed)
///     }
///
///     fn sealed(&self) -> &ImmutableValue {
///         &self.0
///     }
/// }
///
/// let m1 = Money::new(Value::record([("amount", Value::from(100)), ("currency", "USD".into())]))?;
/// let m2 = m1.with(Value::record([("amount", 250)]))?;
/// assert!(!m1.equals(Some(&m2)));
/// ```
pub trait ValueObject: Sized + Clone + fmt::Debug {
    /// Declared type tag; equality never crosses tags.
    const TYPE_TAG: &'static str;

    /// Validation hook, invoked before freezing.
    fn validate(props: &Value) -> DomainResult<()>;

    fn from_sealed(sealed: ImmutableValue) -> Self;

    fn sealed(&self) -> &ImmutableValue;

    fn new(props: impl Into<Value>) -> DomainResult<Self> {
        ImmutableValue::seal(Self::TYPE_TAG, props.into(), Self::validate).map(Self::from_sealed)
    }

    fn props(&self) -> &Value {
        self.sealed().props()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.sealed().get(key)
    }

    fn equals(&self, other: Option<&Self>) -> bool {
        self.sealed().equals(other.map(Self::sealed))
    }

    /// New instance from `{ ...self.props, ...partial }`. Never mutates `self`.
    fn with(&self, partial: impl Into<Value>) -> DomainResult<Self> {
        let merged = self.sealed().merged(&partial.into())?;
        Self::new(merged)
    }

    /// Predicate form of validation; any validation error reads as `false`.
    fn is_valid(props: &Value) -> bool {
        ImmutableValue::check(Self::TYPE_TAG, props, Self::validate).is_ok()
    }

    fn builder() -> ValueObjectBuilder<Self> {
        ValueObjectBuilder::new()
    }

    /// Builder pre-filled with this instance's props.
    fn to_builder(&self) -> ValueObjectBuilder<Self> {
        ValueObjectBuilder::from_existing(self)
    }
}

/// Fluent accumulator of props for a value object.
pub struct ValueObjectBuilder<V> {
    fields: Vec<(String, Value)>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: ValueObject> ValueObjectBuilder<V> {
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn from_existing(existing: &V) -> Self {
        let fields = existing
            .props()
            .as_record()
            .map(Record::entries)
            .unwrap_or_default();
        Self {
            fields,
            _marker: PhantomData,
        }
    }

    /// Set a field; a later `set` of the same key wins.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.fields.retain(|(k, _)| *k != key);
        self.fields.push((key, value.into()));
        self
    }

    /// Run the construction protocol over the accumulated fields.
    pub fn build(self) -> DomainResult<V> {
        V::new(Value::record(self.fields))
    }
}

impl<V: ValueObject> Default for ValueObjectBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ValueObjectBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueObjectBuilder")
            .field("fields", &self.fields)
            .finish()
    }
}
