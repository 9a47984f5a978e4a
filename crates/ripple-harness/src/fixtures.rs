#![forbid(unsafe_code)]

//! Shared fixtures.

use std::rc::Rc;

use ripple_core::IdGenerator;
use ripple_core::value::{Attributes, Value, attributes_of};
use ripple_store::{Collection, Comparator, ModelKind, SyncBackend, ValidationError};
use serde_json::json;

thread_local! {
    /// One sequence for every fixture kind on this thread.
    static FIXTURE_IDS: IdGenerator = IdGenerator::isolated();
}

/// The id generator shared by the fixture kinds.
#[must_use]
pub fn fixture_ids() -> IdGenerator {
    FIXTURE_IDS.with(IdGenerator::clone)
}

/// `attrs(json!({...}))`: an attribute map from a JSON object literal.
#[must_use]
pub fn attrs(raw: Value) -> Attributes {
    attributes_of(raw)
}

/// Four people, unsorted by name.
#[must_use]
pub fn people() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "moe", "age": 40}),
        json!({"id": 2, "name": "curly", "age": 38}),
        json!({"id": 3, "name": "larry", "age": 45}),
        json!({"id": 4, "name": "shemp", "age": 52}),
    ]
}

/// A person kind: `age` may not be negative, `role` defaults to `"member"`.
/// Client ids come from [`fixture_ids`], away from the global counter.
#[must_use]
pub fn person_kind() -> ModelKind {
    ModelKind::builder("person")
        .with_default("role", "member")
        .with_validator(|attrs, _| {
            attrs
                .get("age")
                .and_then(Value::as_i64)
                .filter(|age| *age < 0)
                .map(|_| ValidationError::on_field("age", "age must not be negative"))
        })
        .with_ids(fixture_ids())
        .build()
}

/// A person kind persisted under `/people` through `backend`.
#[must_use]
pub fn persisted_person_kind(backend: Rc<dyn SyncBackend>) -> ModelKind {
    ModelKind::builder("person")
        .with_default("role", "member")
        .with_url_root("/people")
        .with_sync(backend)
        .with_ids(fixture_ids())
        .build()
}

/// [`people`] in a collection kept sorted by name.
#[must_use]
pub fn people_by_name() -> Collection {
    Collection::new(&person_kind())
        .with_comparator(Comparator::attribute("name"))
        .with_models(people())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_kinds_share_one_sequence() {
        let a = ripple_store::Model::new(&person_kind(), attrs(json!({"id": 1})));
        let b = ripple_store::Model::new(&person_kind(), attrs(json!({"id": 1})));
        assert_ne!(a.cid(), b.cid());
        assert_eq!(a.cid().space(), b.cid().space());
        assert_eq!(a.cid().space(), fixture_ids().space());
    }

    #[test]
    fn sorted_fixture_orders_by_name() {
        let rows = people_by_name();
        let names: Vec<_> = rows.pluck("name").into_iter().flatten().collect();
        assert_eq!(
            names,
            vec![json!("curly"), json!("larry"), json!("moe"), json!("shemp")]
        );
        assert!(rows.iter().all(|m| m.get("role") == Some(json!("member"))));
    }
}
