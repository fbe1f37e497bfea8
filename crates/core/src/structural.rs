//! Structural clone, equality and freeze over [`Value`] graphs.
//!
//! Each operation is a single dispatch over the closed set of shapes
//! (scalar, date, record, list, map, set, object) and tracks node identity
//! so cyclic graphs terminate:
//!
//! - [`deep_clone`] memoizes source node -> clone, so a reentered node
//!   resolves to its (possibly in-progress) copy. Cycles and aliasing in the
//!   source are reproduced in the clone, never shared with it.
//! - [`deep_equals`] tracks visited `(left, right)` node pairs and treats a
//!   revisited pair as equal.
//! - [`deep_freeze`] marks a node frozen before descending and skips nodes
//!   that already are.
//!
//! Equality policy: `NaN` equals `NaN`, `0.0` equals `-0.0`, and `Int(1)`
//! never equals `Float(1.0)`. Sets and maps pair their members one-to-one,
//! so two lookalike members on one side need two on the other.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::value::{List, Map, Object, Record, Set, Value};

/// Produce a copy of `value` that shares no node with it.
pub fn deep_clone(value: &Value) -> Value {
    Cloner::default().clone_value(value)
}

/// Structural equality between two value graphs.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    Comparer::default().equals(a, b)
}

/// Freeze `value` and every node reachable from it.
///
/// Does not clone: holders of any handle into the graph observe the freeze.
/// Callers that need an independent frozen copy clone first.
pub fn deep_freeze(value: &Value) {
    match value {
        Value::Record(r) => {
            if r.is_frozen() {
                return;
            }
            r.mark_frozen();
            for (_, v) in r.entries() {
                deep_freeze(&v);
            }
        }
        Value::Object(o) => {
            if o.is_frozen() {
                return;
            }
            o.mark_frozen();
            for (_, v) in o.fields() {
                deep_freeze(&v);
            }
        }
        Value::List(l) => {
            if l.is_frozen() {
                return;
            }
            l.mark_frozen();
            for v in l.values() {
                deep_freeze(&v);
            }
        }
        Value::Set(s) => {
            if s.is_frozen() {
                return;
            }
            s.mark_frozen();
            for v in s.values() {
                deep_freeze(&v);
            }
        }
        Value::Map(m) => {
            if m.is_frozen() {
                return;
            }
            m.mark_frozen();
            for (k, v) in m.entries() {
                deep_freeze(&k);
                deep_freeze(&v);
            }
        }
        // scalars and dates are immutable already
        _ => {}
    }
}

#[derive(Default)]
struct Cloner {
    copies: HashMap<usize, Value>,
}

impl Cloner {
    fn clone_value(&mut self, value: &Value) -> Value {
        if let Some(addr) = value.node_addr() {
            if let Some(copy) = self.copies.get(&addr) {
                trace!(kind = value.kind_name(), "deep_clone reentered a node");
                return copy.clone();
            }
        }

        match value {
            Value::Record(src) => {
                let copy = Record::new();
                self.copies.insert(src.addr(), copy.clone().into());
                for (k, v) in src.entries() {
                    let v = self.clone_value(&v);
                    copy.put(k, v);
                }
                copy.into()
            }
            Value::Object(src) => {
                let copy = Object::new(src.type_name());
                self.copies.insert(src.addr(), copy.clone().into());
                for (k, v) in src.fields() {
                    let v = self.clone_value(&v);
                    copy.put(k, v);
                }
                copy.into()
            }
            Value::List(src) => {
                let copy = List::new();
                self.copies.insert(src.addr(), copy.clone().into());
                for v in src.values() {
                    let v = self.clone_value(&v);
                    copy.put(v);
                }
                copy.into()
            }
            Value::Set(src) => {
                let copy = Set::new();
                self.copies.insert(src.addr(), copy.clone().into());
                for v in src.values() {
                    let v = self.clone_value(&v);
                    copy.put(v);
                }
                copy.into()
            }
            Value::Map(src) => {
                let copy = Map::new();
                self.copies.insert(src.addr(), copy.clone().into());
                for (k, v) in src.entries() {
                    let k = self.clone_value(&k);
                    let v = self.clone_value(&v);
                    copy.put(k, v);
                }
                copy.into()
            }
            scalar => scalar.clone(),
        }
    }
}

#[derive(Default)]
struct Comparer {
    visited: HashSet<(usize, usize)>,
}

impl Comparer {
    fn equals(&mut self, a: &Value, b: &Value) -> bool {
        if let (Some(left), Some(right)) = (a.node_addr(), b.node_addr()) {
            if left == right {
                return true;
            }
            if !self.visited.insert((left, right)) {
                trace!(kind = a.kind_name(), "deep_equals revisited a node pair");
                return true;
            }
        }

        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Float(x), Value::Float(y)) => x == y || (x.is_nan() && y.is_nan()),
            (Value::Text(x), Value::Text(y)) => x == y,
            (Value::Date(x), Value::Date(y)) => x == y,
            (Value::Record(x), Value::Record(y)) => {
                self.fields_equal(x.entries(), |k| y.get(k), y.len())
            }
            (Value::Object(x), Value::Object(y)) => {
                x.type_name() == y.type_name()
                    && self.fields_equal(x.fields(), |k| y.get(k), y.len())
            }
            (Value::List(x), Value::List(y)) => {
                x.len() == y.len()
                    && x.values()
                        .iter()
                        .zip(y.values().iter())
                        .all(|(l, r)| self.equals(l, r))
            }
            (Value::Set(x), Value::Set(y)) => x.len() == y.len() && self.members_matched(x, y),
            (Value::Map(x), Value::Map(y)) => x.len() == y.len() && self.entries_matched(x, y),
            _ => false,
        }
    }

    fn fields_equal(
        &mut self,
        fields: Vec<(String, Value)>,
        lookup: impl Fn(&str) -> Option<Value>,
        other_len: usize,
    ) -> bool {
        fields.len() == other_len
            && fields.iter().all(|(k, v)| match lookup(k) {
                Some(other) => self.equals(v, &other),
                None => false,
            })
    }

    /// Pairs every member of `left` with a distinct equal member of `right`.
    ///
    /// Greedy first-fit is enough: structural equality partitions members
    /// into classes, and any unused member of the right class will do.
    fn members_matched(&mut self, left: &Set, right: &Set) -> bool {
        let candidates = right.values();
        let mut used = vec![false; candidates.len()];
        left.values().iter().all(|member| {
            let slot = (0..candidates.len()).find(|&i| {
                !used[i]
                    && (member.same_value_zero(&candidates[i])
                        || self.attempt(|cmp| cmp.equals(member, &candidates[i])))
            });
            slot.map(|i| used[i] = true).is_some()
        })
    }

    /// Pairs every entry of `left` with a distinct entry of `right` whose key
    /// and value are both equal.
    fn entries_matched(&mut self, left: &Map, right: &Map) -> bool {
        let candidates = right.entries();
        let mut used = vec![false; candidates.len()];
        left.entries().iter().all(|(key, value)| {
            let slot = (0..candidates.len()).find(|&i| {
                let (other_key, other_value) = &candidates[i];
                // scalar keys match by value alone
                let keys_may_match = !(key.is_scalar() && other_key.is_scalar())
                    || key.same_value_zero(other_key);
                !used[i]
                    && keys_may_match
                    && self.attempt(|cmp| {
                        cmp.equals(key, other_key) && cmp.equals(value, other_value)
                    })
            });
            slot.map(|i| used[i] = true).is_some()
        })
    }

    /// Runs a speculative comparison, discarding the visited pairs it
    /// recorded when it fails so they cannot vouch for later comparisons.
    fn attempt(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let saved = self.visited.clone();
        let matched = f(self);
        if !matched {
            self.visited = saved;
        }
        matched
    }
}
