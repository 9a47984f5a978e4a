//! Property-based invariant tests for attribute value semantics.
//!
//! 1. `values_equal` is reflexive and symmetric
//! 2. `compare_values` is antisymmetric and reflexive
//! 3. Equal values order as `Equal`
//! 4. Integers, their decimal text, and integral floats share an identity key
//! 5. `escape_html` never leaves markup metacharacters
//! 6. Absent sort keys order after every present key

use std::cmp::Ordering;

use proptest::prelude::*;
use ripple_core::value::{
    Value, compare_sort_keys, compare_values, escape_html, identity_key, values_equal,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-z0-9<>&\"']{0,6}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-d]", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Equality
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn equality_is_reflexive(a in arb_value()) {
        prop_assert!(values_equal(&a, &a));
        prop_assert!(values_equal(&a, &a.clone()));
    }

    #[test]
    fn equality_is_symmetric(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(values_equal(&a, &b), values_equal(&b, &a));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2-3. Ordering
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn ordering_is_antisymmetric(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(compare_values(&a, &b), compare_values(&b, &a).reverse());
    }

    #[test]
    fn equal_values_order_equal(a in arb_value()) {
        prop_assert_eq!(compare_values(&a, &a.clone()), Ordering::Equal);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Identity keys
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn numeric_identities_share_keys(n in -1_000_000_000_000i64..1_000_000_000_000) {
        let number = identity_key(&Value::from(n));
        prop_assert_eq!(&number, &identity_key(&Value::from(n.to_string())));
        #[allow(clippy::cast_precision_loss)]
        let float = Value::from(n as f64);
        prop_assert_eq!(&number, &identity_key(&float));
        prop_assert!(identity_key(&Value::Null).is_none());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. HTML escaping
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn escaped_text_has_no_markup(text in "[ -~]{0,24}") {
        let escaped = escape_html(Some(&Value::from(text)));
        prop_assert!(!escaped.contains(['<', '>', '"', '\'']), "{escaped}");
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Sort keys
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn absent_keys_sort_last(a in arb_value()) {
        prop_assert_eq!(compare_sort_keys(Some(&a), None), Ordering::Less);
        prop_assert_eq!(compare_sort_keys(None, Some(&a)), Ordering::Greater);
        prop_assert_eq!(compare_sort_keys(None, None), Ordering::Equal);
    }
}
