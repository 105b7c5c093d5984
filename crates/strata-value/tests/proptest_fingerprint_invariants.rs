//! Property tests: the canonical fingerprint coincides with deep value
//! equality.
//!
//! 1. Equal trees (however they were built) fingerprint identically.
//! 2. Distinct trees fingerprint distinctly — the encoding is injective.
//! 3. Fingerprinting is a pure function: repeated runs agree.

#![forbid(unsafe_code)]

use proptest::prelude::*;
use serde_json::{Map, Value};
use strata_value::Fingerprint;

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z,:\\[\\]\\{\\}\"]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z,:]{1,6}", inner, 0..4).prop_map(|entries| {
                Value::Object(entries.into_iter().collect::<Map<String, Value>>())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn equal_values_fingerprint_equally(value in value_strategy()) {
        let twin = value.clone();
        prop_assert_eq!(Fingerprint::of(&value), Fingerprint::of(&twin));
    }

    #[test]
    fn fingerprint_equality_implies_value_equality(
        a in value_strategy(),
        b in value_strategy(),
    ) {
        if Fingerprint::of(&a) == Fingerprint::of(&b) {
            prop_assert_eq!(a, b);
        } else {
            prop_assert_ne!(a, b);
        }
    }

    #[test]
    fn fingerprint_is_stable_across_runs(value in value_strategy()) {
        let first = Fingerprint::of(&value);
        let second = Fingerprint::of(&value);
        prop_assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn single_field_drift_changes_fingerprint(
        base in value_strategy(),
        key in "[a-z]{1,6}",
        before in any::<i64>(),
        after in any::<i64>(),
    ) {
        prop_assume!(before != after);
        let mut map = Map::new();
        map.insert("base".to_owned(), base);
        map.insert(key.clone(), Value::from(before));
        let original = Value::Object(map.clone());
        map.insert(key, Value::from(after));
        let drifted = Value::Object(map);
        prop_assert_ne!(Fingerprint::of(&original), Fingerprint::of(&drifted));
    }
}
