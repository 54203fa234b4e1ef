#![no_main]

use celltree::BlockRef;
use celltree_harness::specimens::{ValueAndBlockSpecimen, insert_fail_specimen};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(tree) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let inner = ValueAndBlockSpecimen::new(BlockRef::from_rc(insert_fail_specimen()));
    let root = BlockRef::from_rc(ValueAndBlockSpecimen::new(BlockRef::from_rc(inner)));
    root.state_from_json(&tree);

    let saved = serde_json::Value::Object(root.state_to_json());
    root.state_from_json(&saved);
    assert_eq!(saved, serde_json::Value::Object(root.state_to_json()));
});
