#![forbid(unsafe_code)]

//! Tree walks between [`BlockRef`] nodes and nested JSON objects.
//!
//! Serialization includes persisted leaves and recurses into every block.
//! Deserialization is per key and never aborts: each failure is logged and
//! the walk continues with the next key.
//!
//! | input key | handling |
//! |---|---|
//! | block cell, object value | recurse |
//! | block cell, other value | skip, `warn` |
//! | persisted writable leaf | coerce and `set`; failures skip, `warn` |
//! | read-only or non-persisted leaf | skip, `debug` |
//! | unknown key, node has an inserter | `state_insert`; failures skip, `warn` |
//! | unknown key, no inserter | skip, `warn` |

use serde_json::{Map, Value as Json};

use super::BlockRef;
use crate::value::Value;

pub(super) fn state_to_json(block: &BlockRef) -> Map<String, Json> {
    let mut out = Map::new();
    for (key, cell) in block.state() {
        if cell.is_block() {
            match cell.get() {
                Value::Block(child) => {
                    out.insert(key, Json::Object(state_to_json(&child)));
                }
                other => {
                    tracing::warn!(%key, found = other.kind(), "block cell holds no block");
                }
            }
        } else if cell.metadata().is_persistent() {
            if let Some(json) = cell.get().to_json() {
                out.insert(key, json);
            }
        }
    }
    out
}

pub(super) fn state_from_json(block: &BlockRef, tree: &Json) {
    let Some(object) = tree.as_object() else {
        tracing::warn!(found = json_kind(tree), "state is not a JSON object; ignoring");
        return;
    };
    let state = block.state();
    for (key, value) in object {
        let Some(cell) = state.get(key) else {
            insert_unknown(block, key, value);
            continue;
        };

        if cell.is_block() {
            match (cell.get(), value) {
                (Value::Block(child), Json::Object(_)) => state_from_json(&child, value),
                (Value::Block(_), other) => {
                    tracing::warn!(%key, found = json_kind(other), "block state is not an object");
                }
                (other, _) => {
                    tracing::warn!(%key, found = other.kind(), "block cell holds no block");
                }
            }
            continue;
        }

        if !cell.is_writable() || !cell.metadata().is_persistent() {
            tracing::debug!(%key, "skipping read-only state key");
            continue;
        }

        let Some(leaf) = Value::from_json(value) else {
            tracing::warn!(%key, found = json_kind(value), "state value is not a leaf");
            continue;
        };
        if let Err(error) = cell.set(leaf) {
            tracing::warn!(%key, %error, "ignoring state value");
        }
    }
}

fn insert_unknown(block: &BlockRef, key: &str, descriptor: &Json) {
    match block.inserter() {
        Some(inserter) => match inserter.state_insert(key, descriptor) {
            Ok(()) => tracing::debug!(%key, "inserted child from state"),
            Err(error) => tracing::warn!(%key, %error, "state insertion failed"),
        },
        None => tracing::warn!(%key, "discarding unexpected state key"),
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell as StdCell, RefCell};
    use std::rc::Rc;

    use serde_json::json;
    use tracing_test::traced_test;

    use crate::cell::CellMetadata;
    use crate::policy::Changes;
    use crate::state::{BlockRef, Exported, Schema};
    use crate::types::ValueType;
    use crate::value::Value;

    struct Knobs {
        gain: StdCell<i64>,
        name: RefCell<String>,
        serial: i64,
        child: BlockRef,
    }

    impl Exported for Knobs {
        fn schema() -> Schema<Self> {
            Schema::new()
                .writable_value(
                    "gain",
                    CellMetadata::new(ValueType::Int, Changes::ThisSetter),
                    |k: &Knobs| Value::Int(k.gain.get()),
                    |k: &Knobs, v| {
                        k.gain.set(i64::try_from(v)?);
                        Ok(())
                    },
                )
                .writable_value(
                    "name",
                    CellMetadata::new(ValueType::Str, Changes::ThisSetter),
                    |k: &Knobs| Value::from(k.name.borrow().as_str()),
                    |k: &Knobs, v| {
                        *k.name.borrow_mut() = String::try_from(v)?;
                        Ok(())
                    },
                )
                .value(
                    "serial",
                    CellMetadata::new(ValueType::Int, Changes::Never),
                    |k: &Knobs| Value::Int(k.serial),
                )
                .block("child", Changes::Never, |k: &Knobs| k.child.clone())
        }
    }

    fn knobs(child: BlockRef) -> Rc<Knobs> {
        Rc::new(Knobs {
            gain: StdCell::new(1),
            name: RefCell::new("a".to_owned()),
            serial: 42,
            child,
        })
    }

    #[test]
    fn to_json_skips_read_only_leaves() {
        let root = BlockRef::from_rc(knobs(BlockRef::empty()));
        assert_eq!(
            json!(root.state_to_json()),
            json!({"gain": 1, "name": "a", "child": {}})
        );
    }

    #[test]
    fn round_trip_is_a_no_op() {
        let inner = knobs(BlockRef::empty());
        let root = BlockRef::from_rc(knobs(BlockRef::from_rc(Rc::clone(&inner))));
        inner.gain.set(7);
        let before = json!(root.state_to_json());
        root.state_from_json(&before);
        assert_eq!(json!(root.state_to_json()), before);
        assert_eq!(inner.gain.get(), 7);
    }

    #[traced_test]
    #[test]
    fn bad_keys_are_contained() {
        let k = knobs(BlockRef::empty());
        let root = BlockRef::from_rc(Rc::clone(&k));
        root.state_from_json(&json!({
            "gain": "loud",
            "name": "b",
            "serial": 7,
            "child": 3,
            "bogus": true,
        }));
        assert_eq!(k.gain.get(), 1);
        assert_eq!(*k.name.borrow(), "b");
        assert_eq!(k.serial, 42);
        assert!(logs_contain("ignoring state value"));
        assert!(logs_contain("skipping read-only state key"));
        assert!(logs_contain("block state is not an object"));
        assert!(logs_contain("discarding unexpected state key"));
    }

    #[traced_test]
    #[test]
    fn non_object_root_is_ignored() {
        let k = knobs(BlockRef::empty());
        BlockRef::from_rc(Rc::clone(&k)).state_from_json(&json!([1, 2]));
        assert_eq!(k.gain.get(), 1);
        assert!(logs_contain("state is not a JSON object"));
    }
}
