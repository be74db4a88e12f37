//! Index key values and their total ordering
//!
//! Values of different types order by type rank:
//!
//! ```text
//! MinKey < Null < Number < String < Object < Array < Bool < MaxKey
//! ```
//!
//! Numbers compare by numeric value regardless of representation, so
//! `Int(1) == Double(1.0)` and `Double(0.5) < Int(1)`. NaN sorts below
//! every other number. Fields of a descending key pattern are wrapped in
//! `Desc`, which reverses the comparison of the wrapped value.

use std::cmp::Ordering;

use serde_json::Value;

use crate::types::document::{get_path, Document};

/// Position of a record in its record store; allocated in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(u64);

impl RecordId {
    pub const MIN: RecordId = RecordId(0);
    pub const MAX: RecordId = RecordId(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// One component of an index key
#[derive(Debug, Clone)]
pub enum KeyValue {
    MinKey,
    Null,
    Int(i64),
    Double(f64),
    String(String),
    Object(Vec<(String, KeyValue)>),
    Array(Vec<KeyValue>),
    Bool(bool),
    MaxKey,
    /// Component of a descending key pattern field
    Desc(Box<KeyValue>),
}

impl KeyValue {
    /// Convert a JSON value. Integers that fit i64 stay exact.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => KeyValue::Null,
            Value::Bool(b) => KeyValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => KeyValue::Int(i),
                None => KeyValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => KeyValue::String(s.clone()),
            Value::Array(items) => KeyValue::Array(items.iter().map(KeyValue::from_json).collect()),
            Value::Object(map) => KeyValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), KeyValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            KeyValue::MinKey => 0,
            KeyValue::Null => 1,
            KeyValue::Int(_) | KeyValue::Double(_) => 2,
            KeyValue::String(_) => 3,
            KeyValue::Object(_) => 4,
            KeyValue::Array(_) => 5,
            KeyValue::Bool(_) => 6,
            KeyValue::Desc(_) => 7,
            KeyValue::MaxKey => 8,
        }
    }
}

fn compare_int_double(i: i64, d: f64) -> Ordering {
    if d.is_nan() {
        return Ordering::Greater;
    }
    // i64 range is [-2^63, 2^63); anything outside is decided by sign.
    if d >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    if d < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    let truncated = d.trunc() as i64;
    match i.cmp(&truncated) {
        Ordering::Equal => {
            let frac = d - d.trunc();
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

fn compare_doubles(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // -0.0 == 0.0 under partial_cmp
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_rank = self.rank().cmp(&other.rank());
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        match (self, other) {
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Int(a), KeyValue::Double(b)) => compare_int_double(*a, *b),
            (KeyValue::Double(a), KeyValue::Int(b)) => compare_int_double(*b, *a).reverse(),
            (KeyValue::Double(a), KeyValue::Double(b)) => compare_doubles(*a, *b),
            (KeyValue::String(a), KeyValue::String(b)) => a.cmp(b),
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
            (KeyValue::Array(a), KeyValue::Array(b)) => a.cmp(b),
            (KeyValue::Object(a), KeyValue::Object(b)) => a.cmp(b),
            (KeyValue::Desc(a), KeyValue::Desc(b)) => b.cmp(a),
            _ => Ordering::Equal,
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

/// One field of an index key pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyField {
    pub path: String,
    pub descending: bool,
}

/// Ordered list of indexed fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern(Vec<KeyField>);

impl KeyPattern {
    pub fn new(fields: Vec<KeyField>) -> Self {
        Self(fields)
    }

    /// Ascending single-field pattern
    pub fn single(path: impl Into<String>) -> Self {
        Self(vec![KeyField {
            path: path.into(),
            descending: false,
        }])
    }

    pub fn fields(&self) -> &[KeyField] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a key from the pattern; missing fields index as null
    pub fn extract(&self, doc: &Document) -> IndexKey {
        let values = self
            .0
            .iter()
            .map(|field| {
                let value = get_path(doc, &field.path)
                    .map(KeyValue::from_json)
                    .unwrap_or(KeyValue::Null);
                orient(value, field.descending)
            })
            .collect();
        IndexKey(values)
    }

    /// Build a scan bound from a key document whose values line up with
    /// the pattern fields in order. Field names of the bound are ignored.
    /// Missing trailing components are filled with `fill`.
    pub fn bound_from(&self, start: &Document, fill: KeyValue) -> IndexKey {
        let mut values: Vec<KeyValue> = start
            .values()
            .zip(self.0.iter())
            .map(|(v, field)| orient(KeyValue::from_json(v), field.descending))
            .collect();
        while values.len() < self.0.len() {
            values.push(fill.clone());
        }
        IndexKey(values)
    }
}

fn orient(value: KeyValue, descending: bool) -> KeyValue {
    if descending {
        KeyValue::Desc(Box::new(value))
    } else {
        value
    }
}

/// A complete key: one value per key pattern field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Vec<KeyValue>);

impl IndexKey {
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

/// A key together with the record it points at
///
/// Entries order by key, then record id, which makes every entry of an
/// index distinct and gives scans a stable resume position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexEntry {
    pub key: IndexKey,
    pub record: RecordId,
}

impl IndexEntry {
    pub fn new(key: IndexKey, record: RecordId) -> Self {
        Self { key, record }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kv(v: Value) -> KeyValue {
        KeyValue::from_json(&v)
    }

    #[test]
    fn test_type_rank_ordering() {
        let ordered = vec![
            KeyValue::MinKey,
            kv(json!(null)),
            kv(json!(-5)),
            kv(json!(3.5)),
            kv(json!("abc")),
            kv(json!({"a": 1})),
            kv(json!([1, 2])),
            kv(json!(false)),
            kv(json!(true)),
            KeyValue::MaxKey,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_numbers_compare_across_subtypes() {
        assert_eq!(kv(json!(1)), kv(json!(1.0)));
        assert!(kv(json!(0.5)) < kv(json!(1)));
        assert!(kv(json!(1)) < kv(json!(1.5)));
        assert!(kv(json!(-1.5)) < kv(json!(-1)));
        assert!(kv(json!(2)) > kv(json!(1.999)));
        assert!(KeyValue::Double(f64::NAN) < kv(json!(i64::MIN)));
    }

    #[test]
    fn test_large_magnitudes() {
        assert!(kv(json!(i64::MAX)) < KeyValue::Double(1e19));
        assert!(kv(json!(i64::MIN)) > KeyValue::Double(-1e19));
        assert!(kv(json!(u64::MAX)) > kv(json!(i64::MAX)));
    }

    #[test]
    fn test_descending_fields_reverse() {
        let pattern = KeyPattern::new(vec![KeyField {
            path: "x".into(),
            descending: true,
        }]);
        let a = pattern.extract(json!({"x": 1}).as_object().unwrap());
        let b = pattern.extract(json!({"x": 2}).as_object().unwrap());
        assert!(b < a);
        // padding still brackets everything
        assert!(IndexKey::new(vec![KeyValue::MinKey]) < b);
        assert!(IndexKey::new(vec![KeyValue::MaxKey]) > a);
    }

    #[test]
    fn test_extract_missing_field_is_null() {
        let pattern = KeyPattern::single("x");
        let key = pattern.extract(json!({"_id": 1}).as_object().unwrap());
        assert_eq!(key, IndexKey::new(vec![KeyValue::Null]));
    }

    #[test]
    fn test_bound_padding() {
        let pattern = KeyPattern::new(vec![
            KeyField { path: "a".into(), descending: false },
            KeyField { path: "b".into(), descending: false },
        ]);
        let start = json!({"": 2});
        let low = pattern.bound_from(start.as_object().unwrap(), KeyValue::MinKey);
        let high = pattern.bound_from(start.as_object().unwrap(), KeyValue::MaxKey);
        let inside = pattern.extract(json!({"a": 2, "b": "zzz"}).as_object().unwrap());
        assert!(low < inside && inside < high);
    }

    #[test]
    fn test_entry_order_breaks_ties_by_record() {
        let key = IndexKey::new(vec![KeyValue::Int(1)]);
        let a = IndexEntry::new(key.clone(), RecordId::new(1));
        let b = IndexEntry::new(key, RecordId::new(2));
        assert!(a < b);
    }
}
