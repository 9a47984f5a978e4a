//! End-to-end reconciliation scenarios with full event transcripts.
//!
//! Each scenario drives a collection through public operations and checks
//! the exact event sequence observed on the collection.

use std::rc::Rc;

use ripple_core::Value;
use ripple_harness::fixtures::{attrs, people, people_by_name, persisted_person_kind, person_kind};
use ripple_harness::{EventLog, MemoryBackend};
use ripple_store::{Collection, SetOptions};
use serde_json::json;

fn ids(collection: &Collection) -> Vec<Value> {
    collection.iter().filter_map(|model| model.id()).collect()
}

fn stooges() -> Collection {
    Collection::new(&person_kind()).with_models(people())
}

// ── Set ──────────────────────────────────────────────────────────────

#[test]
fn set_merges_removes_then_adds() {
    let rows = stooges();
    let log = EventLog::watching(&rows);

    let result = rows.set(
        [
            json!({"id": 1, "name": "moe", "age": 41}),
            json!({"id": 3}),
            json!({"id": 5, "name": "joe"}),
        ],
        &SetOptions::default(),
    );

    assert_eq!(result.len(), 3);
    assert_eq!(ids(&rows), vec![json!(1), json!(3), json!(5)]);
    assert_eq!(
        log.names(),
        vec!["change:age", "change", "remove", "remove", "add", "sort"]
    );
    let entries = log.entries();
    assert_eq!(entries[2].index, Some(1), "id 2 left from index 1");
    assert_eq!(entries[3].index, Some(2), "id 4 left from index 2");
    assert_eq!(entries[4].index, Some(2), "id 5 landed last");
    assert_eq!(entries[0].value, Some(json!(41)));
}

#[test]
fn set_follows_input_order() {
    let rows = stooges();
    let log = EventLog::watching(&rows);
    rows.set(
        [json!({"id": 4}), json!({"id": 3}), json!({"id": 2}), json!({"id": 1})],
        &SetOptions::default(),
    );
    assert_eq!(ids(&rows), vec![json!(4), json!(3), json!(2), json!(1)]);
    assert_eq!(log.names(), vec!["sort"]);
}

#[test]
fn duplicate_identities_collapse_into_one_member() {
    let rows = Collection::new(&person_kind());
    let result = rows.set(
        [
            json!({"id": 7, "name": "first"}),
            json!({"id": 7, "name": "second"}),
        ],
        &SetOptions::default(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(result.len(), 2);
    assert!(result[0].ptr_eq(&result[1]));
    assert_eq!(rows.at(0).and_then(|m| m.get("name")), Some(json!("second")));
}

#[test]
fn set_without_remove_keeps_strays() {
    let rows = stooges();
    rows.set(
        [json!({"id": 9})],
        &SetOptions::default().with_remove(false),
    );
    assert_eq!(rows.len(), 5);
    assert_eq!(rows.last().and_then(|m| m.id()), Some(json!(9)));
}

// ── Add ──────────────────────────────────────────────────────────────

#[test]
fn sorted_add_reports_final_index() {
    let rows = people_by_name();
    let log = EventLog::watching(&rows);
    rows.add_one(json!({"id": 9, "name": "betty"}), &SetOptions::default());
    assert_eq!(log.names(), vec!["add", "sort"]);
    assert_eq!(log.entries()[0].index, Some(0));
    assert_eq!(rows.first().and_then(|m| m.id()), Some(json!(9)));
}

#[test]
fn add_at_splices_in_input_order() {
    let rows = stooges();
    let log = EventLog::watching(&rows);
    rows.add(
        [json!({"id": "a"}), json!({"id": "b"})],
        &SetOptions::default().with_at(1),
    );
    assert_eq!(
        ids(&rows),
        vec![json!(1), json!("a"), json!("b"), json!(2), json!(3), json!(4)]
    );
    assert_eq!(log.names(), vec!["add", "add"]);
    let indexes: Vec<_> = log.entries().iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![Some(1), Some(2)]);
}

#[test]
fn add_leaves_existing_attributes_unless_merging() {
    let rows = stooges();
    rows.add_one(json!({"id": 1, "name": "moses"}), &SetOptions::default());
    assert_eq!(rows.get(&json!(1)).and_then(|m| m.get("name")), Some(json!("moe")));
    rows.add_one(
        json!({"id": 1, "name": "moses"}),
        &SetOptions::default().with_merge(true),
    );
    assert_eq!(rows.get(&json!(1)).and_then(|m| m.get("name")), Some(json!("moses")));
    assert_eq!(rows.len(), 4);
}

#[test]
fn invalid_items_are_skipped() {
    let rows = Collection::new(&person_kind());
    let log = EventLog::watching(&rows);
    let added = rows.add(
        [json!({"id": 1, "age": -1}), json!({"id": 2, "age": 3})],
        &SetOptions::default(),
    );
    assert_eq!(added.len(), 1);
    assert_eq!(log.names(), vec!["invalid", "add"]);
    assert!(rows.get(&json!(1)).is_none());
}

// ── Identity ─────────────────────────────────────────────────────────

#[test]
fn identity_change_rekeys_lookup() {
    let rows = stooges();
    let curly = rows.get(&json!(2)).unwrap_or_else(|| panic!("curly"));
    curly.set_attr("id", 20, &SetOptions::default());
    assert!(rows.get(&json!(2)).is_none());
    assert_eq!(rows.get(&json!(20)), Some(curly.clone()));
    assert_eq!(rows.get(&json!(curly.cid().to_string())), Some(curly));
}

#[test]
fn numeric_and_text_identities_share_a_key() {
    let rows = stooges();
    assert_eq!(
        rows.get(&json!("3")).and_then(|m| m.get("name")),
        Some(json!("larry"))
    );
}

// ── Membership across collections ────────────────────────────────────

#[test]
fn destroy_leaves_every_collection() {
    let backend = Rc::new(MemoryBackend::new());
    let kind = persisted_person_kind(backend.clone());
    for person in people() {
        backend.seed("/people", person);
    }
    let everyone = Collection::new(&kind).with_models(people());
    let favorites = Collection::new(&kind);
    let moe = everyone.get(&json!(1)).unwrap_or_else(|| panic!("moe"));
    favorites.add_one(&moe, &SetOptions::default());
    let log = EventLog::watching(&favorites);

    assert_eq!(moe.destroy(&SetOptions::default()), Ok(true));
    assert_eq!(everyone.len(), 3);
    assert!(favorites.is_empty());
    assert_eq!(log.names(), vec!["remove", "destroy"]);
    assert_eq!(backend.record("/people/1"), None);
}

#[test]
fn removal_from_one_collection_is_private() {
    let everyone = stooges();
    let favorites = Collection::new(everyone.kind());
    let moe = everyone.get(&json!(1)).unwrap_or_else(|| panic!("moe"));
    favorites.add_one(&moe, &SetOptions::default());
    let log = EventLog::watching(&favorites);

    everyone.remove_one(&moe, &SetOptions::default());
    assert!(log.is_empty());
    assert!(favorites.contains(&moe));
    moe.set(attrs(json!({"age": 41})), &SetOptions::default());
    assert_eq!(log.names(), vec!["change:age", "change"]);
}

// ── Reset ────────────────────────────────────────────────────────────

#[test]
fn reset_emits_one_event_with_previous_members() {
    let rows = stooges();
    let old = rows.models();
    let log = EventLog::watching(&rows);
    rows.reset([json!({"id": 10})], &SetOptions::default());
    assert_eq!(log.names(), vec!["reset"]);
    assert_eq!(ids(&rows), vec![json!(10)]);
    assert!(old.iter().all(|model| model.collection().is_none()));
}

// ── Determinism ──────────────────────────────────────────────────────

fn scripted_transcript() -> String {
    let rows = people_by_name();
    let log = EventLog::watching(&rows);
    rows.set(
        [
            json!({"id": 2, "name": "zeppo"}),
            json!({"id": 3}),
            json!({"id": 8, "name": "harpo"}),
        ],
        &SetOptions::default(),
    );
    rows.pop(&SetOptions::default());
    log.digest()
}

#[test]
fn transcripts_are_repeatable() {
    assert_eq!(scripted_transcript(), scripted_transcript());
}
