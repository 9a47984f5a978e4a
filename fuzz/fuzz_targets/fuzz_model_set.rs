#![no_main]

use libfuzzer_sys::fuzz_target;
use ripple_core::value::attributes_of;
use ripple_store::{Model, ModelKind, SetOptions};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = serde_json::from_slice::<Value>(data) else {
        return;
    };
    let model = Model::new(&ModelKind::new("fuzz"), Default::default());
    model.set(attributes_of(raw.clone()), &SetOptions::default());
    let _ = model.changed_attributes(None);
    let _ = model.escape("id");
    let _ = model.url();
    model.set(attributes_of(raw), &SetOptions::default().with_unset(true));
    assert!(!model.has_changed(None) || model.changed_attributes(None).is_some());
});
