#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ripple_store::{Collection, Comparator, ModelKind, SetOptions};
use serde_json::{Value, json};

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Set { rows: Vec<(u8, u8)>, remove: bool, merge: bool },
    Add { rows: Vec<(u8, u8)>, at: Option<u8> },
    Remove(Vec<u8>),
    Reset(Vec<(u8, u8)>),
    Rekey { from: u8, to: u8 },
    Pop,
    Shift,
    ToggleComparator,
}

fn items(rows: &[(u8, u8)]) -> Vec<Value> {
    rows.iter()
        .take(64)
        .map(|(id, rank)| json!({"id": id % 32, "rank": rank}))
        .collect()
}

fuzz_target!(|input: Vec<FuzzOp>| {
    let collection = Collection::new(&ModelKind::new("row"));
    let defaults = SetOptions::default();
    for op in input.iter().take(256) {
        match op {
            FuzzOp::Set { rows, remove, merge } => {
                let options = defaults.clone().with_remove(*remove).with_merge(*merge);
                collection.set(items(rows), &options);
            }
            FuzzOp::Add { rows, at } => {
                let options = match at {
                    Some(at) => defaults.clone().with_at(usize::from(*at)),
                    None => defaults.clone(),
                };
                collection.add(items(rows), &options);
            }
            FuzzOp::Remove(ids) => {
                for id in ids.iter().take(64) {
                    collection.remove_by_id(&json!(id % 32), &defaults);
                }
            }
            FuzzOp::Reset(rows) => {
                collection.reset(items(rows), &defaults);
            }
            FuzzOp::Rekey { from, to } => {
                if let Some(model) = collection.get(&json!(from % 32)) {
                    model.set_attr("id", to % 32, &defaults);
                }
            }
            FuzzOp::Pop => {
                collection.pop(&defaults);
            }
            FuzzOp::Shift => {
                collection.shift(&defaults);
            }
            FuzzOp::ToggleComparator => {
                let next = match collection.comparator() {
                    Some(_) => None,
                    None => Some(Comparator::attribute("rank")),
                };
                collection.set_comparator(next);
            }
        }

        for model in collection.iter() {
            assert!(collection.get_by_cid(model.cid()).is_some());
        }
    }
});
