#![no_main]

use arbitrary::Arbitrary;
use celltree::{BaseCell, CellRef, EnumType, LooseCell, Range, Value, ValueType};
use celltree_harness::SubscriptionTester;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<FuzzValue> for Value {
    fn from(v: FuzzValue) -> Self {
        match v {
            FuzzValue::Null => Value::Null,
            FuzzValue::Bool(b) => Value::Bool(b),
            FuzzValue::Int(n) => Value::Int(n),
            FuzzValue::Float(x) => Value::Float(x),
            FuzzValue::Str(s) => Value::Str(s),
        }
    }
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    lo: f64,
    hi: f64,
    integer: bool,
    writes: Vec<FuzzValue>,
}

fuzz_target!(|input: FuzzInput| {
    let types = [
        ValueType::Int,
        ValueType::Float,
        ValueType::Bool,
        ValueType::Str,
        ValueType::Range(Range::new([(input.lo, input.hi)]).integer(input.integer)),
        ValueType::Enum(EnumType::new(["a", "b"])),
    ];
    let cells: Vec<LooseCell> = types
        .into_iter()
        .map(|t| {
            let initial = t.coerce(Value::Int(0)).unwrap_or(Value::Null);
            LooseCell::new(initial, "fuzz", t)
        })
        .collect();
    let testers: Vec<SubscriptionTester> = cells
        .iter()
        .map(|c| SubscriptionTester::new(CellRef::new(c.clone())))
        .collect();

    for write in input.writes {
        let value = Value::from(write);
        for cell in &cells {
            if cell.set(value.clone()).is_ok() {
                // Accepted writes must be stable under a second coercion.
                let stored = cell.get();
                assert!(cell.set(stored.clone()).is_ok());
                assert_eq!(cell.get(), stored);
            }
        }
    }
    for tester in &testers {
        tester.advance();
    }
});
