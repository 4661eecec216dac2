//! # Runtime Value Representation
//!
//! Two layers live here:
//!
//! - [`RefValue`]: the reference-counted payloads (text, blob, opaque object)
//!   embedded in fixed-layout rows. Retain is a handle clone, release is a
//!   drop; the count lives in the `Rc` so retain/release balance is enforced
//!   by ownership rather than by calling convention.
//! - [`Value`]: the full tagged union over every column kind in both not-null
//!   and nullable flavors, used for bind arguments, encoder contexts, and
//!   introspection.
//!
//! ## Null normalization
//!
//! Nullable scalars are carried as [`Nullable<T>`] with the invariant that a
//! null value's payload is the type's zero. Row storage maintains the same
//! invariant at the byte level, which is what lets whole rows be hashed and
//! compared as flat byte runs.
//!
//! ## Content hash and equality
//!
//! Text and blob values hash and compare by content (djb2 over bytes, the
//! same rolling hash used for row scalars). Opaque objects have no portable
//! content, so they hash and compare by handle identity.

use std::any::Any;
use std::rc::Rc;

use super::data_type::{ColumnType, CoreType};

pub type TextRef = Rc<str>;
pub type BlobRef = Rc<[u8]>;
pub type ObjectRef = Rc<dyn Any>;

/// djb2: seed 5381, `h = h * 33 + byte`.
pub(crate) fn djb2(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed;
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

/// A reference-counted value occupying one slot in a row's reference block.
#[derive(Debug, Clone)]
pub enum RefValue {
    Text(TextRef),
    Blob(BlobRef),
    Object(ObjectRef),
}

impl RefValue {
    pub fn core_type(&self) -> CoreType {
        match self {
            RefValue::Text(_) => CoreType::Text,
            RefValue::Blob(_) => CoreType::Blob,
            RefValue::Object(_) => CoreType::Object,
        }
    }

    /// Content hash for text/blob, handle identity for objects.
    pub fn content_hash(&self) -> u64 {
        match self {
            RefValue::Text(s) => djb2(5381, s.as_bytes()),
            RefValue::Blob(b) => djb2(5381, b),
            RefValue::Object(o) => Rc::as_ptr(o) as *const () as usize as u64,
        }
    }

    /// Content equality for text/blob, handle identity for objects.
    pub fn content_eq(&self, other: &RefValue) -> bool {
        match (self, other) {
            (RefValue::Text(a), RefValue::Text(b)) => a == b,
            (RefValue::Blob(a), RefValue::Blob(b)) => a == b,
            (RefValue::Object(a), RefValue::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Hash of a reference slot; an empty slot hashes to zero.
pub fn slot_hash(slot: &Option<RefValue>) -> u64 {
    slot.as_ref().map_or(0, RefValue::content_hash)
}

/// Equality of two reference slots; empty compares equal only to empty.
pub fn slots_equal(a: &Option<RefValue>, b: &Option<RefValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.content_eq(b),
        _ => false,
    }
}

/// Stores `source` into `slot`, retaining the new value before the old one
/// is released. The clone-then-assign shape makes the operation safe even
/// when `source` aliases the slot's current value.
pub fn set_ref(slot: &mut Option<RefValue>, source: Option<&RefValue>) {
    let retained = source.cloned();
    *slot = retained;
}

/// Nullable scalar: when `is_null` is set, `value` is the type's zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nullable<T> {
    pub is_null: bool,
    pub value: T,
}

impl<T: Default> Nullable<T> {
    pub fn null() -> Self {
        Self {
            is_null: true,
            value: T::default(),
        }
    }

    pub fn of(value: T) -> Self {
        Self {
            is_null: false,
            value,
        }
    }

    pub fn get(self) -> Option<T> {
        if self.is_null {
            None
        } else {
            Some(self.value)
        }
    }
}

impl<T: Default> From<Option<T>> for Nullable<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(value) => Nullable::of(value),
            None => Nullable::null(),
        }
    }
}

/// A typed value in either not-null or nullable flavor.
#[derive(Debug, Clone)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Text(TextRef),
    Blob(BlobRef),
    Object(ObjectRef),
    NullableInt32(Nullable<i32>),
    NullableInt64(Nullable<i64>),
    NullableDouble(Nullable<f64>),
    NullableBool(Nullable<bool>),
    NullableText(Option<TextRef>),
    NullableBlob(Option<BlobRef>),
    NullableObject(Option<ObjectRef>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int32(_) => ColumnType::not_null(CoreType::Int32),
            Value::Int64(_) => ColumnType::not_null(CoreType::Int64),
            Value::Double(_) => ColumnType::not_null(CoreType::Double),
            Value::Bool(_) => ColumnType::not_null(CoreType::Bool),
            Value::Text(_) => ColumnType::not_null(CoreType::Text),
            Value::Blob(_) => ColumnType::not_null(CoreType::Blob),
            Value::Object(_) => ColumnType::not_null(CoreType::Object),
            Value::NullableInt32(_) => ColumnType::nullable(CoreType::Int32),
            Value::NullableInt64(_) => ColumnType::nullable(CoreType::Int64),
            Value::NullableDouble(_) => ColumnType::nullable(CoreType::Double),
            Value::NullableBool(_) => ColumnType::nullable(CoreType::Bool),
            Value::NullableText(_) => ColumnType::nullable(CoreType::Text),
            Value::NullableBlob(_) => ColumnType::nullable(CoreType::Blob),
            Value::NullableObject(_) => ColumnType::nullable(CoreType::Object),
        }
    }

    /// True when the value is logically absent.
    pub fn is_null(&self) -> bool {
        match self {
            Value::NullableInt32(v) => v.is_null,
            Value::NullableInt64(v) => v.is_null,
            Value::NullableDouble(v) => v.is_null,
            Value::NullableBool(v) => v.is_null,
            Value::NullableText(v) => v.is_none(),
            Value::NullableBlob(v) => v.is_none(),
            Value::NullableObject(v) => v.is_none(),
            _ => false,
        }
    }

    pub fn text(s: &str) -> Self {
        Value::Text(Rc::from(s))
    }

    pub fn blob(b: &[u8]) -> Self {
        Value::Blob(Rc::from(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_hash_is_deterministic() {
        let a = RefValue::Text(Rc::from("hello"));
        let b = RefValue::Text(Rc::from("hello"));
        assert_eq!(a.content_hash(), b.content_hash());
        assert!(a.content_eq(&b));
    }

    #[test]
    fn distinct_blobs_compare_unequal() {
        let a = RefValue::Blob(Rc::from(&b"abc"[..]));
        let b = RefValue::Blob(Rc::from(&b"abd"[..]));
        assert!(!a.content_eq(&b));
    }

    #[test]
    fn objects_compare_by_identity() {
        let o: ObjectRef = Rc::new(42u32);
        let a = RefValue::Object(o.clone());
        let b = RefValue::Object(o);
        let c = RefValue::Object(Rc::new(42u32));
        assert!(a.content_eq(&b));
        assert!(!a.content_eq(&c));
    }

    #[test]
    fn set_ref_tolerates_aliasing() {
        let text: TextRef = Rc::from("shared");
        let mut slot = Some(RefValue::Text(text));
        // source aliases the slot's current value
        let source = slot.clone();
        set_ref(&mut slot, source.as_ref());
        match slot {
            Some(RefValue::Text(s)) => assert_eq!(&*s, "shared"),
            _ => panic!("slot lost its value"),
        }
    }

    #[test]
    fn empty_slots_hash_zero_and_match_only_empty() {
        let empty: Option<RefValue> = None;
        let full = Some(RefValue::Text(Rc::from("x")));
        assert_eq!(slot_hash(&empty), 0);
        assert!(slots_equal(&empty, &None));
        assert!(!slots_equal(&empty, &full));
    }

    #[test]
    fn nullable_null_carries_zero_value() {
        let n = Nullable::<i32>::null();
        assert!(n.is_null);
        assert_eq!(n.value, 0);
        assert_eq!(n.get(), None);
        assert_eq!(Nullable::of(7).get(), Some(7));
    }
}
