//! JSON value space with total structural equality and hashing.
//!
//! Values are the closed recursive space of `serde_json::Value`: null,
//! booleans, numbers, strings, sequences, and string-keyed mappings.
//!
//! - Mappings compare by key set plus per-key deep equality, regardless of
//!   insertion order. Their hash is a commutative sum of per-entry hashes.
//! - Sequences compare index-wise. Each element hash has its index folded in
//!   before combining, so reordering changes the hash.
//! - Numbers compare by numeric value: `1` and `1.0` are equal and hash alike.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{Number, Value};

/// A JSON object (string-keyed mapping).
pub type JsonObject = serde_json::Map<String, Value>;

const NULL_TAG: u8 = 0;
const BOOL_TAG: u8 = 1;
const NUMBER_TAG: u8 = 2;
const STRING_TAG: u8 = 3;
const ARRAY_TAG: u8 = 4;
const OBJECT_TAG: u8 = 5;

/// Canonical form of a JSON number.
///
/// Integral floats collapse onto the integer form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NumberKey {
    Integer(i128),
    Float(u64),
}

impl NumberKey {
    fn of(number: &Number) -> Self {
        if let Some(i) = number.as_i64() {
            return Self::Integer(i128::from(i));
        }
        if let Some(u) = number.as_u64() {
            return Self::Integer(i128::from(u));
        }
        match number.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e38 => Self::Integer(f as i128),
            Some(f) => Self::Float(f.to_bits()),
            None => Self::Float(f64::NAN.to_bits()),
        }
    }
}

/// Deep structural equality over two JSON values.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => NumberKey::of(x) == NumberKey::of(y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| deep_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => deep_eq_objects(x, y),
        _ => false,
    }
}

/// Deep structural equality over two JSON objects.
pub fn deep_eq_objects(a: &JsonObject, b: &JsonObject) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, left)| b.get(key).is_some_and(|right| deep_eq(left, right)))
}

/// Hash consistent with [`deep_eq`].
pub fn structural_hash(value: &Value) -> u64 {
    match value {
        Value::Null => mix(&NULL_TAG),
        Value::Bool(b) => mix(&(BOOL_TAG, *b)),
        Value::Number(n) => mix(&(NUMBER_TAG, NumberKey::of(n))),
        Value::String(s) => mix(&(STRING_TAG, s.as_str())),
        Value::Array(items) => {
            let combined = items
                .iter()
                .enumerate()
                .fold(0_u64, |acc, (index, item)| {
                    acc.wrapping_add(mix(&(index, structural_hash(item))))
                });
            mix(&(ARRAY_TAG, items.len(), combined))
        }
        Value::Object(map) => object_hash(map),
    }
}

/// Hash consistent with [`deep_eq_objects`].
pub fn object_hash(map: &JsonObject) -> u64 {
    let combined = map.iter().fold(0_u64, |acc, (key, value)| {
        acc.wrapping_add(mix(&(key.as_str(), structural_hash(value))))
    });
    mix(&(OBJECT_TAG, map.len(), combined))
}

fn mix<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Borrowed JSON value compared and hashed structurally.
///
/// Useful as a `HashMap`/`HashSet` key for payloads.
#[derive(Debug, Clone, Copy)]
pub struct Structural<'a>(pub &'a Value);

impl PartialEq for Structural<'_> {
    fn eq(&self, other: &Self) -> bool {
        deep_eq(self.0, other.0)
    }
}

impl Eq for Structural<'_> {}

impl Hash for Structural<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(structural_hash(self.0));
    }
}
