//! Dynamic value graph: the props carried by value objects.
//!
//! A [`Value`] is either an immutable scalar (null, bool, number, text, date)
//! or a handle to a shared, interior-mutable node (record, list, map, set,
//! object). Cloning a `Value` with [`Clone`] copies the *handle*, so aliasing
//! and self-reference (`obj.self = obj`) are expressible. Independent copies
//! come from [`crate::structural::deep_clone`].
//!
//! ## Freezing
//!
//! Every node carries a frozen flag. Once set, every write through any handle
//! to that node fails with [`DomainError::Frozen`]. Reads are unaffected.
//!
//! ## Reclamation
//!
//! Nodes are reference counted. Sealed value-object props are released by
//! their owner when it drops (see `release_graph`); any other cycle stays
//! alive until broken with `clear()`.
//!
//! ## Key identity
//!
//! Map keys and set members are matched with same-value-zero semantics:
//! scalars by value (`NaN` matches `NaN`, `0.0` matches `-0.0`), nodes by
//! identity. See [`Value::same_value_zero`].

use core::fmt;
use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::trace;

use crate::error::{DomainError, DomainResult};

/// Storage behind every reference shape.
struct Node<T> {
    frozen: Cell<bool>,
    data: RefCell<T>,
}

struct Shared<T>(Rc<Node<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    fn new(data: T) -> Self {
        Self(Rc::new(Node {
            frozen: Cell::new(false),
            data: RefCell::new(data),
        }))
    }

    fn read(&self) -> Ref<'_, T> {
        self.0.data.borrow()
    }

    fn write<R>(&self, kind: &'static str, f: impl FnOnce(&mut T) -> R) -> DomainResult<R> {
        if self.0.frozen.get() {
            return Err(DomainError::frozen(kind));
        }
        Ok(f(&mut self.0.data.borrow_mut()))
    }

    /// Write that bypasses the frozen check; only used to fill fresh clones.
    fn fill<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.data.borrow_mut())
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Empties the node regardless of its frozen flag.
    fn release(&self)
    where
        T: Default,
    {
        let drained = core::mem::take(&mut *self.0.data.borrow_mut());
        drop(drained);
    }
}

macro_rules! impl_node_handle {
    ($t:ident, $kind:literal) => {
        impl $t {
            /// Whether writes through this handle are rejected.
            pub fn is_frozen(&self) -> bool {
                self.node.0.frozen.get()
            }

            pub fn len(&self) -> usize {
                self.node.read().len()
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Whether both handles point at the same node.
            pub fn ptr_eq(&self, other: &Self) -> bool {
                Rc::ptr_eq(&self.node.0, &other.node.0)
            }

            pub fn clear(&self) -> DomainResult<()> {
                self.node.write($kind, |data| data.clear())
            }

            pub(crate) fn addr(&self) -> usize {
                self.node.addr()
            }

            pub(crate) fn mark_frozen(&self) {
                self.node.0.frozen.set(true);
            }

            pub(crate) fn strong_count(&self) -> usize {
                self.node.strong_count()
            }

            pub(crate) fn release(&self) {
                self.node.release();
            }

            #[cfg(test)]
            pub(crate) fn downgrade(&self) -> std::rc::Weak<dyn core::any::Any> {
                let weak = Rc::downgrade(&self.node.0);
                weak
            }
        }

        impl fmt::Debug for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(&Value::$t(self.clone()), f)
            }
        }

        impl From<$t> for Value {
            fn from(value: $t) -> Self {
                Value::$t(value)
            }
        }
    };
}

/// Plain key-value container with string keys.
#[derive(Clone)]
pub struct Record {
    node: Shared<BTreeMap<String, Value>>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            node: Shared::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.node.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.node.read().contains_key(key)
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> DomainResult<Option<Value>> {
        let (key, value) = (key.into(), value.into());
        self.node.write("record", |data| data.insert(key, value))
    }

    pub fn remove(&self, key: &str) -> DomainResult<Option<Value>> {
        self.node.write("record", |data| data.remove(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.node.read().keys().cloned().collect()
    }

    /// Snapshot of the entries in key order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.node
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn put(&self, key: String, value: Value) {
        self.node.fill(|data| data.insert(key, value));
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let record = Record::new();
        for (k, v) in iter {
            record.put(k.into(), v.into());
        }
        record
    }
}

impl_node_handle!(Record, "record");

/// Ordered sequence.
#[derive(Clone)]
pub struct List {
    node: Shared<Vec<Value>>,
}

impl List {
    pub fn new() -> Self {
        Self {
            node: Shared::new(Vec::new()),
        }
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.node.read().get(index).cloned()
    }

    pub fn push(&self, value: impl Into<Value>) -> DomainResult<()> {
        let value = value.into();
        self.node.write("list", |data| data.push(value))
    }

    pub fn pop(&self) -> DomainResult<Option<Value>> {
        self.node.write("list", |data| data.pop())
    }

    /// Replaces the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> DomainResult<Value> {
        let value = value.into();
        self.node
            .write("list", |data| {
                data.get_mut(index)
                    .map(|slot| core::mem::replace(slot, value))
            })?
            .ok_or_else(|| DomainError::invariant(format!("list index {index} out of bounds")))
    }

    /// Snapshot of the elements in order.
    pub fn values(&self) -> Vec<Value> {
        self.node.read().clone()
    }

    pub(crate) fn put(&self, value: Value) {
        self.node.fill(|data| data.push(value));
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let list = List::new();
        for v in iter {
            list.put(v.into());
        }
        list
    }
}

impl_node_handle!(List, "list");

/// Keyed collection with arbitrary keys, kept in insertion order.
#[derive(Clone)]
pub struct Map {
    node: Shared<Vec<(Value, Value)>>,
}

impl Map {
    pub fn new() -> Self {
        Self {
            node: Shared::new(Vec::new()),
        }
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.node
            .read()
            .iter()
            .find(|(k, _)| k.same_value_zero(key))
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.node.read().iter().any(|(k, _)| k.same_value_zero(key))
    }

    /// Inserts or replaces the entry for `key`, returning the previous value.
    pub fn insert(
        &self,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> DomainResult<Option<Value>> {
        let (key, value) = (key.into(), value.into());
        self.node.write("map", |data| {
            match data.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                Some((_, slot)) => Some(core::mem::replace(slot, value)),
                None => {
                    data.push((key, value));
                    None
                }
            }
        })
    }

    pub fn remove(&self, key: &Value) -> DomainResult<Option<Value>> {
        self.node.write("map", |data| {
            data.iter()
                .position(|(k, _)| k.same_value_zero(key))
                .map(|idx| data.remove(idx).1)
        })
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.node.read().clone()
    }

    pub(crate) fn put(&self, key: Value, value: Value) {
        self.node.fill(|data| data.push((key, value)));
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Map::new();
        for (k, v) in iter {
            // fresh node, so the write cannot hit a frozen flag
            let _ = map.insert(k, v);
        }
        map
    }
}

impl_node_handle!(Map, "map");

/// Unkeyed collection, kept in insertion order without duplicates.
#[derive(Clone)]
pub struct Set {
    node: Shared<Vec<Value>>,
}

impl Set {
    pub fn new() -> Self {
        Self {
            node: Shared::new(Vec::new()),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.node.read().iter().any(|v| v.same_value_zero(value))
    }

    /// Adds `value`; returns `false` when an identical member was present.
    pub fn insert(&self, value: impl Into<Value>) -> DomainResult<bool> {
        let value = value.into();
        self.node.write("set", |data| {
            if data.iter().any(|v| v.same_value_zero(&value)) {
                false
            } else {
                data.push(value);
                true
            }
        })
    }

    pub fn remove(&self, value: &Value) -> DomainResult<bool> {
        self.node.write("set", |data| {
            match data.iter().position(|v| v.same_value_zero(value)) {
                Some(idx) => {
                    data.remove(idx);
                    true
                }
                None => false,
            }
        })
    }

    /// Snapshot of the members in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.node.read().clone()
    }

    pub(crate) fn put(&self, value: Value) {
        self.node.fill(|data| data.push(value));
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for Set {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let set = Set::new();
        for v in iter {
            let _ = set.insert(v);
        }
        set
    }
}

impl_node_handle!(Set, "set");

/// Any other object shape: a type name plus its own enumerable properties.
#[derive(Clone)]
pub struct Object {
    type_name: Rc<str>,
    node: Shared<BTreeMap<String, Value>>,
}

impl Object {
    pub fn new(type_name: impl AsRef<str>) -> Self {
        Self {
            type_name: Rc::from(type_name.as_ref()),
            node: Shared::new(BTreeMap::new()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.node.read().get(key).cloned()
    }

    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> DomainResult<Option<Value>> {
        let (key, value) = (key.into(), value.into());
        self.node.write("object", |data| data.insert(key, value))
    }

    pub fn remove(&self, key: &str) -> DomainResult<Option<Value>> {
        self.node.write("object", |data| data.remove(key))
    }

    /// Snapshot of the properties in key order.
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.node
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn put(&self, key: String, value: Value) {
        self.node.fill(|data| data.insert(key, value));
    }
}

impl_node_handle!(Object, "object");

/// A node in the value graph.
///
/// `Clone` is shallow: the copy shares every node with the original.
/// `PartialEq` is structural (see [`crate::structural::deep_equals`]).
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Date-like instant; opaque to freezing.
    Date(DateTime<Utc>),
    Record(Record),
    List(List),
    Map(Map),
    Set(Set),
    Object(Object),
}

impl Value {
    /// Build a record value from `(key, value)` pairs.
    pub fn record<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Record(entries.into_iter().collect())
    }

    /// Build a list value from elements.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::List(items.into_iter().collect())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a scalar, immutable by nature.
    pub fn is_scalar(&self) -> bool {
        self.node_addr().is_none()
    }

    /// Scalars always report frozen; nodes report their own flag.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Record(r) => r.is_frozen(),
            Value::List(l) => l.is_frozen(),
            Value::Map(m) => m.is_frozen(),
            Value::Set(s) => s.is_frozen(),
            Value::Object(o) => o.is_frozen(),
            _ => true,
        }
    }

    /// Address of the backing node, if this value is a reference shape.
    pub(crate) fn node_addr(&self) -> Option<usize> {
        match self {
            Value::Record(r) => Some(r.addr()),
            Value::List(l) => Some(l.addr()),
            Value::Map(m) => Some(m.addr()),
            Value::Set(s) => Some(s.addr()),
            Value::Object(o) => Some(o.addr()),
            _ => None,
        }
    }

    fn strong_count(&self) -> usize {
        match self {
            Value::Record(r) => r.strong_count(),
            Value::List(l) => l.strong_count(),
            Value::Map(m) => m.strong_count(),
            Value::Set(s) => s.strong_count(),
            Value::Object(o) => o.strong_count(),
            _ => 0,
        }
    }

    fn release(&self) {
        match self {
            Value::Record(r) => r.release(),
            Value::List(l) => l.release(),
            Value::Map(m) => m.release(),
            Value::Set(s) => s.release(),
            Value::Object(o) => o.release(),
            _ => {}
        }
    }

    /// Visits the values held directly by this node, map keys included.
    fn for_each_child(&self, mut f: impl FnMut(&Value)) {
        match self {
            Value::Record(r) => r.node.read().values().for_each(f),
            Value::Object(o) => o.node.read().values().for_each(f),
            Value::List(l) => l.node.read().iter().for_each(f),
            Value::Set(s) => s.node.read().iter().for_each(f),
            Value::Map(m) => {
                for (k, v) in m.node.read().iter() {
                    f(k);
                    f(v);
                }
            }
            _ => {}
        }
    }

    /// Whether both values are the same node. Scalars are never the same node.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        matches!((self.node_addr(), other.node_addr()), (Some(a), Some(b)) if a == b)
    }

    /// Key identity used by maps and sets.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }

    /// Field lookup on records and objects.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Record(r) => r.get(key),
            Value::Object(o) => o.get(key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Export as JSON.
    ///
    /// Dates become RFC 3339 strings, maps become `[key, value]` pair arrays,
    /// sets become arrays, objects lose their type name. Non-finite floats
    /// become `null`. A cyclic graph cannot be exported.
    pub fn to_json(&self) -> DomainResult<serde_json::Value> {
        let mut stack = Vec::new();
        to_json_inner(self, &mut stack)
    }
}

fn to_json_inner(value: &Value, stack: &mut Vec<usize>) -> DomainResult<serde_json::Value> {
    use serde_json::Value as Json;

    let addr = value.node_addr();
    if let Some(addr) = addr {
        if stack.contains(&addr) {
            return Err(DomainError::invariant(format!(
                "cannot export cyclic {} to JSON",
                value.kind_name()
            )));
        }
        stack.push(addr);
    }

    let fields_to_json =
        |fields: Vec<(String, Value)>, stack: &mut Vec<usize>| -> DomainResult<Json> {
            let mut out = serde_json::Map::with_capacity(fields.len());
            for (k, v) in fields {
                out.insert(k, to_json_inner(&v, stack)?);
            }
            Ok(Json::Object(out))
        };

    let json = match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Text(s) => Json::String(s.clone()),
        Value::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::Record(r) => fields_to_json(r.entries(), &mut *stack)?,
        Value::Object(o) => fields_to_json(o.fields(), &mut *stack)?,
        Value::List(l) => Json::Array(
            l.values()
                .iter()
                .map(|v| to_json_inner(v, stack))
                .collect::<DomainResult<_>>()?,
        ),
        Value::Set(s) => Json::Array(
            s.values()
                .iter()
                .map(|v| to_json_inner(v, stack))
                .collect::<DomainResult<_>>()?,
        ),
        Value::Map(m) => {
            let mut pairs = Vec::with_capacity(m.len());
            for (k, v) in m.entries() {
                pairs.push(Json::Array(vec![
                    to_json_inner(&k, stack)?,
                    to_json_inner(&v, stack)?,
                ]));
            }
            Json::Array(pairs)
        }
    };

    if addr.is_some() {
        stack.pop();
    }
    Ok(json)
}

/// Empties every node of the graph under `root` that nothing outside the
/// graph still holds, so reference cycles among them can be freed.
///
/// `root` is a handle its caller is about to drop. A node whose strong count
/// exceeds the edges reaching it from inside the graph is held from outside;
/// it and everything it reaches stay intact. Frozen flags are ignored, since
/// no remaining handle can observe a released node.
pub(crate) fn release_graph(root: &Value) {
    let Some(root_addr) = root.node_addr() else {
        return;
    };

    // one tracking handle per node; `inbound` counts in-graph edges, plus
    // the caller's handle on the root
    let mut nodes = vec![root.clone()];
    let mut inbound = vec![1_usize];
    let mut index = HashMap::from([(root_addr, 0_usize)]);
    let mut cursor = 0;
    while cursor < nodes.len() {
        let node = nodes[cursor].clone();
        node.for_each_child(|child| {
            let Some(addr) = child.node_addr() else {
                return;
            };
            match index.get(&addr) {
                Some(&i) => inbound[i] += 1,
                None => {
                    index.insert(addr, nodes.len());
                    nodes.push(child.clone());
                    inbound.push(1);
                }
            }
        });
        cursor += 1;
    }

    let mut live = vec![false; nodes.len()];
    let mut pending: Vec<usize> = (0..nodes.len())
        .filter(|&i| nodes[i].strong_count() > inbound[i] + 1)
        .collect();
    while let Some(i) = pending.pop() {
        if core::mem::replace(&mut live[i], true) {
            continue;
        }
        nodes[i].for_each_child(|child| {
            if let Some(&j) = child.node_addr().and_then(|addr| index.get(&addr)) {
                pending.push(j);
            }
        });
    }

    let mut released = 0;
    for (node, &is_live) in nodes.iter().zip(&live) {
        if !is_live {
            node.release();
            released += 1;
        }
    }
    if released > 0 {
        trace!(released, "released unowned value graph");
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Record(map.into_iter().collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::structural::deep_equals(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seen = RefCell::new(Vec::new());
        fmt::Debug::fmt(
            &Guarded {
                value: self,
                seen: &seen,
            },
            f,
        )
    }
}

/// Debug adapter that prints revisited nodes as `[Circular]`.
struct Guarded<'a> {
    value: &'a Value,
    seen: &'a RefCell<Vec<usize>>,
}

fn guard<'a>(value: &'a Value, seen: &'a RefCell<Vec<usize>>) -> Guarded<'a> {
    Guarded { value, seen }
}

impl fmt::Debug for Guarded<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(addr) = self.value.node_addr() else {
            return match self.value {
                Value::Null => f.write_str("Null"),
                Value::Bool(b) => fmt::Debug::fmt(b, f),
                Value::Int(i) => fmt::Debug::fmt(i, f),
                Value::Float(x) => fmt::Debug::fmt(x, f),
                Value::Text(s) => fmt::Debug::fmt(s, f),
                Value::Date(d) => write!(f, "Date({})", d.to_rfc3339()),
                _ => Ok(()),
            };
        };
        if self.seen.borrow().contains(&addr) {
            return f.write_str("[Circular]");
        }
        self.seen.borrow_mut().push(addr);

        let seen = self.seen;
        let result = match self.value {
            Value::Record(r) => f
                .debug_map()
                .entries(r.node.read().iter().map(|(k, v)| (k, guard(v, seen))))
                .finish(),
            Value::List(l) => f
                .debug_list()
                .entries(l.node.read().iter().map(|v| guard(v, seen)))
                .finish(),
            Value::Map(m) => f
                .debug_map()
                .entries(m.node.read().iter().map(|(k, v)| (guard(k, seen), guard(v, seen))))
                .finish(),
            Value::Set(s) => f
                .debug_set()
                .entries(s.node.read().iter().map(|v| guard(v, seen)))
                .finish(),
            Value::Object(o) => {
                let fields = o.node.read();
                let mut out = f.debug_struct(o.type_name());
                for (k, v) in fields.iter() {
                    out.field(k, &guard(v, seen));
                }
                out.finish()
            }
            _ => Ok(()),
        };

        self.seen.borrow_mut().pop();
        result
    }
}
