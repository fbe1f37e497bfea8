//! Identity handles for entities.
//!
//! An [`IdentityHandle`] carries a locally generated [`LocalToken`] plus up to
//! two externally assigned business keys (primary and secondary). Keys are
//! write-once: they may arrive well after the handle was created, but once
//! set they never change.
//!
//! Two handles are compared with [`IdentityHandle::same_as`], which treats
//! the two key slots as a set when reconciling identity across systems that
//! disagree on which key is "primary", and falls back to the local token only
//! when no assigned key overlaps.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::value::Value;

/// A type usable as an externally assigned business key.
pub trait BusinessKey: Clone + PartialEq + fmt::Debug {
    /// Whether this key stands for "no key" (the null of its type).
    fn is_absent(&self) -> bool {
        false
    }
}

macro_rules! impl_business_key {
    ($($t:ty),*) => {
        $(impl BusinessKey for $t {})*
    };
}

impl_business_key!(i8, i16, i32, i64, u8, u16, u32, u64, usize, String, Uuid);

impl<T: BusinessKey> BusinessKey for Option<T> {
    fn is_absent(&self) -> bool {
        self.as_ref().is_none_or(BusinessKey::is_absent)
    }
}

impl BusinessKey for Value {
    fn is_absent(&self) -> bool {
        self.is_null()
    }
}

/// Locally generated token identifying an in-memory instance before any
/// external system assigns it a durable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalToken(String);

impl LocalToken {
    /// Fresh random token in UUID v4 format.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a previously generated token. Blank tokens are rejected.
    pub fn parse(token: impl Into<String>) -> DomainResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(DomainError::invalid_snapshot("local token is missing"));
        }
        Ok(Self(token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token has UUID v4 shape: version nibble 4, RFC 4122 variant.
    pub fn is_uuid_v4(&self) -> bool {
        Uuid::parse_str(&self.0)
            .map(|parsed| {
                parsed.get_version_num() == 4 && parsed.get_variant() == uuid::Variant::RFC4122
            })
            .unwrap_or(false)
    }
}

impl fmt::Display for LocalToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocalToken {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for LocalToken {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// Source of fresh local tokens.
pub trait TokenSource {
    fn next_token(&self) -> LocalToken;
}

/// Default token source: random UUID v4 strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4TokenSource;

impl TokenSource for UuidV4TokenSource {
    fn next_token(&self) -> LocalToken {
        LocalToken::generate()
    }
}

/// Serializable form of an [`IdentityHandle`].
///
/// `value` is the legacy single-key field. It is read as the primary key
/// when `primaryKey` is absent and is always written alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySnapshot<K> {
    #[serde(default)]
    pub local_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<K>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<K>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<K>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Best externally meaningful representative of an identity.
#[derive(Debug, PartialEq)]
pub enum EffectiveId<'a, K> {
    Primary(&'a K),
    Secondary(&'a K),
    Token(&'a LocalToken),
}

impl<'a, K> EffectiveId<'a, K> {
    /// The business key, if one was assigned.
    pub fn key(&self) -> Option<&'a K> {
        match *self {
            EffectiveId::Primary(k) | EffectiveId::Secondary(k) => Some(k),
            EffectiveId::Token(_) => None,
        }
    }
}

impl<K: fmt::Display> fmt::Display for EffectiveId<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveId::Primary(k) | EffectiveId::Secondary(k) => fmt::Display::fmt(k, f),
            EffectiveId::Token(t) => fmt::Display::fmt(t, f),
        }
    }
}

/// Dual business-key identifier embedded in every entity.
///
/// `Clone` yields an independent handle with the same token, keys and
/// creation time, i.e. the same identity under [`IdentityHandle::same_as`].
///
/// No `PartialEq`: reconciliation through [`IdentityHandle::same_as`] is
/// symmetric but not transitive.
#[derive(Debug, Clone)]
pub struct IdentityHandle<K> {
    local_token: LocalToken,
    primary_key: Option<K>,
    secondary_key: Option<K>,
    created_at: DateTime<Utc>,
}

impl<K: BusinessKey> IdentityHandle<K> {
    /// New handle with a fresh UUID v4 token and no business keys.
    pub fn create() -> Self {
        Self::create_with(&UuidV4TokenSource)
    }

    /// New handle with a token from `tokens`.
    pub fn create_with(tokens: &dyn TokenSource) -> Self {
        Self {
            local_token: tokens.next_token(),
            primary_key: None,
            secondary_key: None,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a handle from a snapshot, reusing its token.
    pub fn restore(snapshot: IdentitySnapshot<K>) -> DomainResult<Self> {
        let local_token = LocalToken::parse(snapshot.local_token)?;
        let present = |k: &K| !k.is_absent();
        let primary_key = snapshot
            .primary_key
            .filter(present)
            .or_else(|| snapshot.value.filter(present));
        let secondary_key = snapshot.secondary_key.filter(present);
        let created_at = match snapshot.created_at {
            Some(millis) => DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                DomainError::invalid_snapshot(format!("createdAt {millis} is out of range"))
            })?,
            None => Utc::now(),
        };

        debug!(token = %local_token, "identity restored");
        Ok(Self {
            local_token,
            primary_key,
            secondary_key,
            created_at,
        })
    }

    pub fn to_snapshot(&self) -> IdentitySnapshot<K> {
        IdentitySnapshot {
            local_token: self.local_token.as_str().to_string(),
            primary_key: self.primary_key.clone(),
            secondary_key: self.secondary_key.clone(),
            value: self.primary_key.clone(),
            created_at: Some(self.created_at.timestamp_millis()),
        }
    }

    pub fn local_token(&self) -> &LocalToken {
        &self.local_token
    }

    pub fn primary_key(&self) -> Option<&K> {
        self.primary_key.as_ref()
    }

    pub fn secondary_key(&self) -> Option<&K> {
        self.secondary_key.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True until the first business key is assigned.
    pub fn is_new(&self) -> bool {
        self.primary_key.is_none() && self.secondary_key.is_none()
    }

    pub fn set_primary_key(&mut self, key: K) -> DomainResult<()> {
        Self::assign(&mut self.primary_key, key, "primary key")?;
        debug!(token = %self.local_token, key = ?self.primary_key, "primary key assigned");
        Ok(())
    }

    pub fn set_secondary_key(&mut self, key: K) -> DomainResult<()> {
        Self::assign(&mut self.secondary_key, key, "secondary key")?;
        debug!(token = %self.local_token, key = ?self.secondary_key, "secondary key assigned");
        Ok(())
    }

    fn assign(slot: &mut Option<K>, key: K, name: &'static str) -> DomainResult<()> {
        if slot.is_some() {
            return Err(DomainError::already_set(name));
        }
        if key.is_absent() {
            return Err(DomainError::invalid_key(format!("{name} must not be null")));
        }
        *slot = Some(key);
        Ok(())
    }

    /// Identity reconciliation; the first matching rule wins:
    ///
    /// 1. both have a primary key: primary keys equal
    /// 2. both have a secondary key: secondary keys equal
    /// 3. this primary equals the other's secondary
    /// 4. this secondary equals the other's primary
    /// 5. otherwise: local tokens equal
    pub fn same_as(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.primary_key, &other.primary_key) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.secondary_key, &other.secondary_key) {
            return a == b;
        }
        if matches!((&self.primary_key, &other.secondary_key), (Some(a), Some(b)) if a == b) {
            return true;
        }
        if matches!((&self.secondary_key, &other.primary_key), (Some(a), Some(b)) if a == b) {
            return true;
        }
        self.local_token == other.local_token
    }

    /// [`Self::same_as`], false when `other` is absent.
    pub fn equals(&self, other: Option<&Self>) -> bool {
        other.is_some_and(|other| self.same_as(other))
    }

    /// Primary key, else secondary key, else the local token.
    pub fn effective_value(&self) -> EffectiveId<'_, K> {
        match (&self.primary_key, &self.secondary_key) {
            (Some(k), _) => EffectiveId::Primary(k),
            (None, Some(k)) => EffectiveId::Secondary(k),
            (None, None) => EffectiveId::Token(&self.local_token),
        }
    }
}

impl<K: BusinessKey + fmt::Display> fmt::Display for IdentityHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.effective_value(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTokens(&'static str);

    impl TokenSource for FixedTokens {
        fn next_token(&self) -> LocalToken {
            LocalToken(self.0.to_string())
        }
    }

    fn with_keys(primary: Option<i64>, secondary: Option<i64>) -> IdentityHandle<i64> {
        let mut handle = IdentityHandle::create();
        if let Some(k) = primary {
            handle.set_primary_key(k).unwrap();
        }
        if let Some(k) = secondary {
            handle.set_secondary_key(k).unwrap();
        }
        handle
    }

    #[test]
    fn create_generates_uuid_v4_tokens() {
        let a = IdentityHandle::<i64>::create();
        let b = IdentityHandle::<i64>::create();

        assert!(a.local_token().is_uuid_v4());
        assert_eq!(a.local_token().as_str().len(), 36);
        assert_ne!(a.local_token(), b.local_token());
        assert!(a.is_new());
    }

    #[test]
    fn setting_a_key_marks_handle_assigned() {
        let mut handle = IdentityHandle::create();
        assert!(handle.is_new());

        handle.set_primary_key(42_i64).unwrap();

        assert!(!handle.is_new());
        assert_eq!(handle.effective_value().key(), Some(&42));
        assert_eq!(handle.to_string(), "42");
    }

    #[test]
    fn secondary_key_alone_also_marks_assigned() {
        let handle = with_keys(None, Some(7));
        assert!(!handle.is_new());
        assert_eq!(handle.effective_value(), EffectiveId::Secondary(&7));
    }

    #[test]
    fn keys_are_write_once() {
        let mut handle = with_keys(Some(1), Some(2));

        assert_eq!(
            handle.set_primary_key(3),
            Err(DomainError::already_set("primary key"))
        );
        assert_eq!(
            handle.set_secondary_key(4),
            Err(DomainError::already_set("secondary key"))
        );
        assert_eq!(handle.primary_key(), Some(&1));
        assert_eq!(handle.secondary_key(), Some(&2));
    }

    #[test]
    fn absent_keys_are_rejected() {
        let mut handle = IdentityHandle::<Option<i64>>::create();
        let err = handle.set_primary_key(None).unwrap_err();
        assert!(matches!(err, DomainError::InvalidKey(_)));
        assert!(handle.is_new());

        let mut handle = IdentityHandle::<Value>::create();
        let err = handle.set_secondary_key(Value::Null).unwrap_err();
        assert!(matches!(err, DomainError::InvalidKey(_)));
    }

    #[test]
    fn primary_keys_decide_when_both_present() {
        let a = with_keys(Some(1), Some(9));
        let b = with_keys(Some(1), Some(8));
        let c = with_keys(Some(2), Some(9));

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn secondary_keys_decide_without_both_primaries() {
        let a = with_keys(None, Some(5));
        let b = with_keys(None, Some(5));
        let c = with_keys(Some(1), Some(6));

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
    }

    #[test]
    fn primary_cross_matches_secondary_in_both_directions() {
        let a = with_keys(Some(5), None);
        let b = with_keys(None, Some(5));

        assert!(a.same_as(&b));
        assert!(b.same_as(&a));
    }

    #[test]
    fn falls_back_to_local_token() {
        let tokens = FixedTokens("token-1");
        let a = IdentityHandle::<i64>::create_with(&tokens);
        let mut b = IdentityHandle::<i64>::create_with(&tokens);
        b.set_secondary_key(3).unwrap();

        assert!(a.same_as(&b));
        assert!(b.same_as(&a));

        let other = IdentityHandle::<i64>::create();
        assert!(!a.same_as(&other));
    }

    #[test]
    fn differing_secondaries_block_cross_match() {
        let a = with_keys(None, Some(5));
        let b = with_keys(Some(5), Some(6));

        assert!(!a.same_as(&b));
        assert!(!b.same_as(&a));
    }

    #[test]
    fn differing_primaries_block_cross_match() {
        let a = with_keys(Some(1), Some(5));
        let b = with_keys(Some(5), None);

        assert!(!a.same_as(&b));
        assert!(!b.same_as(&a));
    }

    #[test]
    fn differing_keys_override_shared_token() {
        let tokens = FixedTokens("token-1");
        let mut a = IdentityHandle::<i64>::create_with(&tokens);
        let mut b = IdentityHandle::<i64>::create_with(&tokens);
        a.set_primary_key(1).unwrap();
        b.set_primary_key(2).unwrap();

        assert_eq!(a.local_token(), b.local_token());
        assert!(!a.same_as(&b));
        assert!(!b.same_as(&a));
    }

    #[test]
    fn default_token_source_yields_uuid_v4() {
        assert!(UuidV4TokenSource.next_token().is_uuid_v4());
    }

    #[test]
    fn equals_is_false_for_absent_other() {
        let a = IdentityHandle::<i64>::create();
        assert!(!a.equals(None));
        assert!(a.equals(Some(&a.clone())));
    }

    #[test]
    fn clone_keeps_identity_but_is_independent() {
        let original = with_keys(None, Some(4));
        let mut copy = original.clone();
        copy.set_primary_key(10).unwrap();

        assert_eq!(copy.local_token(), original.local_token());
        assert_eq!(original.primary_key(), None);
        assert!(copy.same_as(&original));
    }

    #[test]
    fn effective_value_falls_back_to_token() {
        let handle = IdentityHandle::<i64>::create();
        assert_eq!(
            handle.effective_value(),
            EffectiveId::Token(handle.local_token())
        );
        assert_eq!(handle.to_string(), handle.local_token().as_str());
    }

    #[test]
    fn snapshot_round_trip_preserves_identity() {
        let original = with_keys(Some(11), Some(12));
        let restored = IdentityHandle::restore(original.to_snapshot()).unwrap();

        assert!(restored.same_as(&original));
        assert_eq!(restored.local_token(), original.local_token());
        assert_eq!(restored.secondary_key(), Some(&12));
        assert_eq!(
            restored.created_at().timestamp_millis(),
            original.created_at().timestamp_millis()
        );
    }

    #[test]
    fn snapshot_json_uses_camel_case_and_emits_legacy_field() {
        let handle = with_keys(Some(3), None);
        let json = serde_json::to_value(handle.to_snapshot()).unwrap();

        assert_eq!(json["localToken"], handle.local_token().as_str());
        assert_eq!(json["primaryKey"], 3);
        assert_eq!(json["value"], 3);
        assert!(json.get("secondaryKey").is_none());
        assert!(json["createdAt"].is_i64());
    }

    #[test]
    fn restore_reads_legacy_field_as_primary_key() {
        let snapshot: IdentitySnapshot<String> =
            serde_json::from_str(r#"{"localToken":"abc","value":"CUST-1"}"#).unwrap();
        let handle = IdentityHandle::restore(snapshot).unwrap();

        assert_eq!(handle.primary_key().map(String::as_str), Some("CUST-1"));
        assert!(!handle.is_new());
    }

    #[test]
    fn restore_prefers_primary_key_over_legacy_field() {
        let snapshot: IdentitySnapshot<i64> =
            serde_json::from_str(r#"{"localToken":"abc","primaryKey":1,"value":2}"#).unwrap();
        let handle = IdentityHandle::restore(snapshot).unwrap();

        assert_eq!(handle.primary_key(), Some(&1));
    }

    #[test]
    fn restore_rejects_missing_or_blank_token() {
        let missing: IdentitySnapshot<i64> = serde_json::from_str(r#"{"primaryKey":1}"#).unwrap();
        let err = IdentityHandle::restore(missing).unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));

        let blank: IdentitySnapshot<i64> =
            serde_json::from_str(r#"{"localToken":"  "}"#).unwrap();
        assert!(IdentityHandle::restore(blank).is_err());
    }

    #[test]
    fn restore_rejects_out_of_range_timestamp() {
        let snapshot = IdentitySnapshot::<i64> {
            local_token: "abc".to_string(),
            primary_key: None,
            secondary_key: None,
            value: None,
            created_at: Some(i64::MAX),
        };
        let err = IdentityHandle::restore(snapshot).unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_handle() -> impl Strategy<Value = IdentityHandle<u8>> {
            (any::<Option<u8>>(), any::<Option<u8>>(), 0..3u8).prop_map(
                |(primary, secondary, token)| {
                    let snapshot = IdentitySnapshot {
                        local_token: format!("token-{token}"),
                        primary_key: primary,
                        secondary_key: secondary,
                        value: None,
                        created_at: None,
                    };
                    IdentityHandle::restore(snapshot).unwrap()
                },
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: identity reconciliation is symmetric.
            #[test]
            fn same_as_is_symmetric(a in arb_handle(), b in arb_handle()) {
                prop_assert_eq!(a.same_as(&b), b.same_as(&a));
            }

            /// Property: a handle always matches itself and its clone.
            #[test]
            fn same_as_is_reflexive(a in arb_handle()) {
                prop_assert!(a.same_as(&a));
                prop_assert!(a.same_as(&a.clone()));
            }

            /// Property: a key slot accepts exactly one assignment.
            #[test]
            fn setter_succeeds_exactly_once(first in any::<u8>(), second in any::<u8>()) {
                let mut handle = IdentityHandle::<u8>::create();
                prop_assert!(handle.set_primary_key(first).is_ok());
                prop_assert_eq!(
                    handle.set_primary_key(second),
                    Err(DomainError::already_set("primary key"))
                );
                prop_assert_eq!(handle.primary_key(), Some(&first));
            }
        }
    }
}
