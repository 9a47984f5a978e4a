#![forbid(unsafe_code)]

//! Attribute value semantics: deep equality, ordering, identity keys.
//!
//! Attribute values are [`serde_json::Value`] trees and attribute maps are
//! [`serde_json::Map`]s. The store never inspects values beyond the helpers in
//! this module:
//!
//! - [`deep_eq`]: structural equality used for change detection. Numbers
//!   compare numerically, so `1` and `1.0` are equal. An absent attribute is
//!   never equal to an explicit `null`.
//! - [`compare_values`]: a total order across value kinds, used by
//!   comparators. [`compare_sort_keys`] places absent keys last.
//! - [`identity_key`]: the canonical index key of an identity value.
//!
//! Value trees are owned, so self-referential values cannot be constructed and
//! equality always terminates.

use std::cmp::Ordering;
use std::fmt;

pub use serde_json::{Map, Number, Value};

/// A model's attribute map.
pub type Attributes = Map<String, Value>;

/// Borrow the object inside `value` as an attribute map, or build an empty
/// one for any other kind of value.
#[must_use]
pub fn attributes_of(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

// ─── Equality ────────────────────────────────────────────────────────────────

/// Structural equality between two possibly-absent values.
#[must_use]
pub fn deep_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    }
}

/// Structural equality between two values.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| values_equal(l, r)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ─── Ordering ────────────────────────────────────────────────────────────────

const fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    let a = x.as_f64().unwrap_or(f64::NAN);
    let b = y.as_f64().unwrap_or(f64::NAN);
    a.total_cmp(&b)
}

/// Total order over values.
///
/// Kinds order as `null < bool < number < string < array < object`. Within a
/// kind, numbers compare numerically, strings lexicographically, arrays and
/// objects element-wise (objects by key, then value).
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(l, r)| compare_values(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_values(lv, rv)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Order two sort keys, placing absent keys after every present one.
#[must_use]
pub fn compare_sort_keys(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

// ─── Identity keys ───────────────────────────────────────────────────────────

/// Canonical index key derived from an identity attribute value.
///
/// Strings key verbatim and numbers by their integral or decimal text, so the
/// string `"7"` and the number `7` resolve to the same member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdKey(String);

impl IdKey {
    /// The canonical text of the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
            format!("{f:.0}")
        }
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

/// Index key for an identity value; `null` has none.
#[must_use]
pub fn identity_key(value: &Value) -> Option<IdKey> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(IdKey(s.clone())),
        Value::Number(n) => Some(IdKey(number_text(n))),
        other => Some(IdKey(other.to_string())),
    }
}

// ─── Display helpers ─────────────────────────────────────────────────────────

/// Plain display text of a value: strings unquoted, `null`/absent empty.
#[must_use]
pub fn display_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// HTML-escaped display text of a value.
#[must_use]
pub fn escape_html(value: Option<&Value>) -> String {
    v_htmlescape::escape(&display_text(value)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_numerically() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!(2)));
        assert!(values_equal(&json!([1, {"a": 2}]), &json!([1.0, {"a": 2.0}])));
    }

    #[test]
    fn absent_differs_from_null() {
        assert!(!deep_eq(None, Some(&Value::Null)));
        assert!(deep_eq(None, None));
        assert!(deep_eq(Some(&json!("x")), Some(&json!("x"))));
    }

    #[test]
    fn object_equality_ignores_key_order() {
        let a = json!({"a": 1, "b": [true, null]});
        let b = json!({"b": [true, null], "a": 1});
        assert!(values_equal(&a, &b));
        assert!(!values_equal(&a, &json!({"a": 1})));
    }

    #[test]
    fn kinds_order_before_contents() {
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(99), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(2.5), &json!(3)), Ordering::Less);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1])), Ordering::Greater);
    }

    #[test]
    fn absent_sort_keys_go_last() {
        assert_eq!(compare_sort_keys(None, Some(&json!(0))), Ordering::Greater);
        assert_eq!(compare_sort_keys(Some(&json!(0)), None), Ordering::Less);
        assert_eq!(compare_sort_keys(None, None), Ordering::Equal);
    }

    #[test]
    fn identity_keys_are_canonical() {
        assert_eq!(identity_key(&json!(7)), identity_key(&json!("7")));
        assert_eq!(identity_key(&json!(7.0)), identity_key(&json!(7)));
        assert_eq!(identity_key(&Value::Null), None);
        assert_eq!(
            identity_key(&json!(1.5)).map(|k| k.to_string()),
            Some("1.5".to_string())
        );
    }

    #[test]
    fn escape_handles_markup_and_null() {
        assert_eq!(escape_html(Some(&json!("<b>&"))), "&lt;b&gt;&amp;");
        assert_eq!(escape_html(Some(&Value::Null)), "");
        assert_eq!(escape_html(None), "");
        assert_eq!(escape_html(Some(&json!(3))), "3");
    }

    #[test]
    fn attributes_of_non_object_is_empty() {
        assert!(attributes_of(json!([1, 2])).is_empty());
        assert_eq!(attributes_of(json!({"a": 1})).len(), 1);
    }
}
