//! Behavioral tests for cells, subscriptions, and the state tree.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use celltree::{
    BaseCell, BlockRef, CellRef, Changes, CommandCell, LabScheduler, LooseCell, Poller,
    SubscriptionContext, Value, ValueType, ViewCell, unserialize_exported_state,
};
use celltree_harness::SubscriptionTester;
use celltree_harness::specimens::{
    BlockCellSpecimen, CellIdentitySpecimen, CommandSpecimen, InheritingSpecimen,
    NoInherentCellSpecimen, ValueAndBlockSpecimen, insert_fail_specimen,
};
use serde_json::json;

// ── Exported state ───────────────────────────────────────────────────────

#[test]
fn persistence_basic() {
    let inner = ValueAndBlockSpecimen::new(BlockRef::empty());
    let o = BlockRef::from_rc(ValueAndBlockSpecimen::new(BlockRef::from_rc(inner)));
    assert_eq!(
        json!(o.state_to_json()),
        json!({"value": 0.0, "block": {"value": 0.0, "block": {}}})
    );
    o.state_from_json(&json!({"value": 1, "block": {"value": 2, "block": {}}}));
    assert_eq!(
        json!(o.state_to_json()),
        json!({"value": 1.0, "block": {"value": 2.0, "block": {}}})
    );
}

#[test]
fn persistence_args() {
    let block = BlockRef::from_rc(ValueAndBlockSpecimen::new(BlockRef::empty()));
    let kwargs = [("block".to_owned(), Value::Block(block))].into();
    let o: Rc<ValueAndBlockSpecimen> =
        unserialize_exported_state(kwargs, &json!({"value": 1})).unwrap();
    assert_eq!(o.value(), 1.0);
    assert_eq!(
        json!(BlockRef::from_rc(o).state_to_json()),
        json!({"value": 1.0, "block": {"value": 0.0, "block": {}}})
    );
}

#[test]
fn state_with_inheritance() {
    let object = InheritingSpecimen::new();
    let state = BlockRef::from_rc(Rc::clone(&object)).state();
    assert_eq!(state.keys().collect::<Vec<_>>(), vec!["inherited", "rw"]);
    assert_eq!(state["inherited"].get(), Value::Float(9.0));

    let rw = &state["rw"];
    assert_eq!(rw.get(), Value::Float(0.0));
    rw.set(Value::Float(1.0)).unwrap();
    assert_eq!(rw.get(), Value::Float(1.0));

    // Strict range clamps.
    rw.set(Value::Float(12.5)).unwrap();
    assert_eq!(rw.get(), Value::Float(10.0));
}

// ── Owner-backed cells ───────────────────────────────────────────────────

#[test]
fn subscription_never() {
    let o = NoInherentCellSpecimen::new();
    let st = SubscriptionTester::new(CellRef::new(o.cell(Changes::Never)));
    o.value.set(1);
    st.advance();
    assert!(st.seen().is_empty());
}

/// Mutate through the cell for push policies and behind its back otherwise.
fn check_subscription(changes: Changes) {
    let o = NoInherentCellSpecimen::new();
    let cell = o.cell(changes);
    let mut st = SubscriptionTester::new(CellRef::new(cell.clone()));
    let mutate = |v: i64| {
        if changes == Changes::ThisSetter {
            cell.set(Value::Int(v)).unwrap();
        } else {
            o.value.set(v);
        }
    };

    mutate(1);
    st.expect_now(1);
    st.unsubscribe();
    mutate(2);
    st.advance();
}

#[test]
fn subscription_continuous() {
    check_subscription(Changes::Continuous);
}

#[test]
fn subscription_this_setter() {
    check_subscription(Changes::ThisSetter);
}

#[test]
fn subscription_this_object() {
    check_subscription(Changes::ThisObject);
}

#[test]
fn subscription_global() {
    check_subscription(Changes::Global);
}

#[test]
fn subscription_placeholder_slow() {
    check_subscription(Changes::PlaceholderSlow);
}

#[test]
fn this_setter_reaches_subscribers_of_other_instances() {
    let o = NoInherentCellSpecimen::new();
    let mut st = SubscriptionTester::new(CellRef::new(o.cell(Changes::ThisSetter)));
    o.cell(Changes::ThisSetter).set(Value::Int(5)).unwrap();
    st.should_have_seen(5);
}

#[test]
fn this_setter_subscriber_outlives_dropped_owner() {
    let context = SubscriptionContext::new(Rc::new(LabScheduler::new()), Poller::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let o = NoInherentCellSpecimen::new();
    let owner = Rc::downgrade(&o);
    let sub = o.cell(Changes::ThisSetter).subscribe(
        Rc::new(move |v: &Value| sink.borrow_mut().push(v.clone())),
        &context,
    );
    drop(o);
    assert!(owner.upgrade().is_some());

    // Fresh objects must never land on the subscribed owner's identity.
    let fresh: Vec<_> = (0..64).map(|_| NoInherentCellSpecimen::new()).collect();
    for f in &fresh {
        f.cell(Changes::ThisSetter).set(Value::Int(77)).unwrap();
    }
    assert!(seen.borrow().is_empty());

    sub.unsubscribe();
    assert!(owner.upgrade().is_none());
}

#[test]
fn polled_changes_coalesce_per_tick() {
    let o = NoInherentCellSpecimen::new();
    let mut st = SubscriptionTester::new(CellRef::new(o.cell(Changes::Continuous)));
    o.value.set(1);
    o.value.set(2);
    o.value.set(3);
    st.expect_now(3);
    st.advance();
    assert_eq!(st.seen(), vec![Value::Int(3)]);
}

// ── Block cells ──────────────────────────────────────────────────────────

#[test]
fn block_cell_value() {
    let obj_value = BlockRef::empty();
    let object = BlockRef::from_rc(BlockCellSpecimen::new(obj_value.clone()));
    assert_eq!(object.state()["block"].get(), Value::Block(obj_value));
}

#[test]
fn block_cell_subscription() {
    let obj_value = BlockRef::empty();
    let o = BlockCellSpecimen::new(obj_value.clone());
    let cell = BlockRef::from_rc(Rc::clone(&o)).state()["block"].clone();
    let mut st = SubscriptionTester::new(cell);

    let new = BlockRef::empty();
    o.replace_block(new.clone());
    st.expect_now(new);
    st.unsubscribe();
    o.replace_block(obj_value);
    st.advance();
}

// ── LooseCell ────────────────────────────────────────────────────────────

#[test]
fn loose_cell_get_set() {
    let lc = LooseCell::new(0, "a", ValueType::Int);
    assert_eq!(lc.get(), Value::Int(0));
    lc.set(Value::Int(1)).unwrap();
    assert_eq!(lc.get(), Value::Int(1));
    lc.set(Value::Float(2.1)).unwrap();
    assert_eq!(lc.get(), Value::Int(2));
    assert!(lc.set(Value::Float(1e30)).is_err());
    assert_eq!(lc.get(), Value::Int(2));
}

#[test]
fn loose_cell_subscription() {
    let lc = LooseCell::new(0, "a", ValueType::Int);
    let mut st = SubscriptionTester::new(CellRef::new(lc.clone()));
    lc.set(Value::Int(1)).unwrap();
    st.expect_now(1);
    st.unsubscribe();
    lc.set(Value::Int(2)).unwrap();
    st.advance();
}

#[test]
fn loose_cell_truncation_notifies_once() {
    let lc = LooseCell::new(0, "a", ValueType::Int);
    let mut st = SubscriptionTester::new(CellRef::new(lc.clone()));
    lc.set(Value::Float(2.1)).unwrap();
    assert_eq!(lc.get(), Value::Int(2));
    st.expect_now(2);
}

// ── ViewCell ─────────────────────────────────────────────────────────────

fn offset_view(lc: &LooseCell, delta: &Rc<StdCell<i64>>) -> ViewCell {
    let (d1, d2) = (Rc::clone(delta), Rc::clone(delta));
    ViewCell::new(
        CellRef::new(lc.clone()),
        move |x| Value::Int(x.as_i64().unwrap_or_default() + d1.get()),
        move |x| Value::Int(x.as_i64().unwrap_or_default() - d2.get()),
        "b",
        ValueType::Int,
    )
}

#[test]
fn view_cell_get_set() {
    let lc = LooseCell::new(0, "a", ValueType::Int);
    let delta = Rc::new(StdCell::new(1));
    let vc = offset_view(&lc, &delta);

    assert_eq!(lc.get(), Value::Int(0));
    assert_eq!(vc.get(), Value::Int(1));
    vc.set(Value::Int(2)).unwrap();
    assert_eq!(lc.get(), Value::Int(1));
    assert_eq!(vc.get(), Value::Int(2));
    lc.set(Value::Int(3)).unwrap();
    assert_eq!(lc.get(), Value::Int(3));
    assert_eq!(vc.get(), Value::Int(4));

    delta.set(10);
    vc.changed_transform();
    assert_eq!(lc.get(), Value::Int(3));
    assert_eq!(vc.get(), Value::Int(13));
}

#[test]
fn view_cell_subscription() {
    let lc = LooseCell::new(0, "a", ValueType::Int);
    let delta = Rc::new(StdCell::new(1));
    let vc = offset_view(&lc, &delta);
    let mut st = SubscriptionTester::new(CellRef::new(vc.clone()));

    lc.set(Value::Int(1)).unwrap();
    st.expect_now(2);

    delta.set(10);
    vc.changed_transform();
    assert_eq!(lc.get(), Value::Int(1));
    st.expect_now(11);
    st.unsubscribe();
    lc.set(Value::Int(2)).unwrap();
    st.advance();
    assert_eq!(lc.subscriber_count(), 0);
}

// ── Commands ─────────────────────────────────────────────────────────────

#[test]
fn command_method() {
    let specimen = CommandSpecimen::new();
    assert_eq!(specimen.count(), 0);
    specimen.cmd();
    assert_eq!(specimen.count(), 1);
}

#[test]
fn command_cell() {
    let specimen = CommandSpecimen::new();
    let state = BlockRef::from_rc(Rc::clone(&specimen)).state();
    state["cmd"].set(Value::Null).unwrap();
    assert_eq!(specimen.count(), 1);
    assert!(!state["cmd"].metadata().is_persistent());
}

#[test]
fn standalone_command_cell() {
    let specimen = CommandSpecimen::new();
    let cmd = CommandCell::new(&specimen, "again", CommandSpecimen::cmd);
    let st = SubscriptionTester::new(CellRef::new(cmd.clone()));
    cmd.invoke();
    st.advance();
    assert_eq!(specimen.count(), 1);
    assert!(st.seen().is_empty());
}

// ── Insertion ────────────────────────────────────────────────────────────

#[test]
fn state_insert_success() {
    let object = insert_fail_specimen();
    BlockRef::from_rc(Rc::clone(&object)).state_from_json(&json!({"foo": {"fail": false}}));
    assert_eq!(object.keys(), vec!["foo"]);
}

#[test]
fn state_insert_failure() {
    let object = insert_fail_specimen();
    BlockRef::from_rc(Rc::clone(&object)).state_from_json(&json!({"foo": {"fail": true}}));
    assert!(object.keys().is_empty());
}

#[test]
fn state_insert_partial_success() {
    let object = insert_fail_specimen();
    BlockRef::from_rc(Rc::clone(&object)).state_from_json(&json!({
        "bad": {"fail": true},
        "good": {"fail": false},
    }));
    assert_eq!(object.keys(), vec!["good"]);
}

#[test]
fn state_insert_undefined() {
    let object = Rc::new(celltree::CollectionState::new(true));
    BlockRef::from_rc(Rc::clone(&object)).state_from_json(&json!({"foo": {"fail": true}}));
    assert!(object.keys().is_empty());
}

// ── Identity ─────────────────────────────────────────────────────────────

fn assert_consistent(f: impl Fn() -> CellRef) {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let hash = |c: &CellRef| {
        let mut h = DefaultHasher::new();
        c.hash(&mut h);
        h.finish()
    };
    assert_eq!(f(), f());
    assert_eq!(hash(&f()), hash(&f()));
}

#[test]
fn value_cell_identity() {
    let object = BlockRef::from_rc(CellIdentitySpecimen::new());
    assert!(object.state_is_dynamic());
    assert_consistent(|| object.state()["value"].clone());
}

#[test]
fn block_cell_identity() {
    let object = BlockRef::from_rc(CellIdentitySpecimen::new());
    assert_consistent(|| object.state()["block"].clone());
}
