#![forbid(unsafe_code)]

//! Checks subscription delivery against expectations on a virtual clock.
//!
//! The tester drives both delivery paths: pushed values arrive while the
//! test mutates the cell, and polled values arrive when
//! [`advance`](SubscriptionTester::advance) ticks the poller.
//!
//! # Example
//!
//! ```
//! use celltree::{CellRef, LooseCell, Value, ValueType};
//! use celltree_harness::SubscriptionTester;
//!
//! let cell = LooseCell::new(0, "a", ValueType::Int);
//! let mut st = SubscriptionTester::new(CellRef::new(cell.clone()));
//! celltree::BaseCell::set(&cell, Value::Int(1)).unwrap();
//! st.expect_now(1);
//! st.unsubscribe();
//! celltree::BaseCell::set(&cell, Value::Int(2)).unwrap();
//! st.advance();
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use celltree::{CellRef, LabScheduler, Poller, Subscription, SubscriptionContext, Value};

#[derive(Default)]
struct Log {
    seen: RefCell<Vec<Value>>,
    late: RefCell<Vec<Value>>,
    unsubscribed: Cell<bool>,
}

/// One subscription under test.
pub struct SubscriptionTester {
    lab: LabScheduler,
    context: SubscriptionContext,
    cell: CellRef,
    log: Rc<Log>,
    subscription: Option<Subscription>,
    expected: Vec<Value>,
}

impl SubscriptionTester {
    /// Subscribe to `cell` with a fresh virtual clock and poller.
    pub fn new(cell: CellRef) -> Self {
        let lab = LabScheduler::new();
        let context = SubscriptionContext::new(Rc::new(lab.clone()), Poller::new());
        let log = Rc::new(Log::default());
        let sink = Rc::clone(&log);
        let subscription = cell.subscribe(
            Rc::new(move |value: &Value| {
                if sink.unsubscribed.get() {
                    sink.late.borrow_mut().push(value.clone());
                } else {
                    sink.seen.borrow_mut().push(value.clone());
                }
            }),
            &context,
        );
        tracing::debug!(key = %cell.identity().key(), "tester subscribed");
        Self {
            lab,
            context,
            cell,
            log,
            subscription: Some(subscription),
            expected: Vec::new(),
        }
    }

    /// Move the clock one second and run a full poll.
    ///
    /// # Panics
    ///
    /// If any callback arrived after [`unsubscribe`](Self::unsubscribe).
    pub fn advance(&self) {
        self.lab.advance(Duration::from_secs(1));
        self.context.poller.poll_all();
        let late = self.log.late.borrow();
        assert!(
            late.is_empty(),
            "unexpected subscription callback after unsubscribe from {:?}, with value {:?}",
            self.cell,
            late[0]
        );
    }

    /// Advance, then require exactly one new delivery equal to `expected`.
    pub fn expect_now(&mut self, expected: impl Into<Value>) {
        self.advance();
        self.should_have_seen(expected);
        let seen = self.log.seen.borrow();
        assert_eq!(
            seen.len(),
            self.expected.len(),
            "extra subscription callbacks from {:?}; saw {:?}",
            self.cell,
            &seen[self.expected.len()..]
        );
    }

    /// Require that the next unchecked delivery equals `expected`.
    pub fn should_have_seen(&mut self, expected: impl Into<Value>) {
        let expected = expected.into();
        let index = self.expected.len();
        self.expected.push(expected.clone());
        let seen = self.log.seen.borrow();
        let Some(actual) = seen.get(index) else {
            panic!(
                "no subscription callback from {:?}; expected {expected:?}",
                self.cell
            );
        };
        assert_eq!(
            *actual, expected,
            "expected {expected:?} from {:?}; saw {actual:?}",
            self.cell
        );
    }

    /// Cancel the subscription. Later deliveries fail the next
    /// [`advance`](Self::advance).
    ///
    /// # Panics
    ///
    /// If called twice.
    pub fn unsubscribe(&mut self) {
        let subscription = self
            .subscription
            .take()
            .expect("SubscriptionTester::unsubscribe called twice");
        subscription.unsubscribe();
        self.log.unsubscribed.set(true);
    }

    /// Every value delivered before unsubscription.
    #[must_use]
    pub fn seen(&self) -> Vec<Value> {
        self.log.seen.borrow().clone()
    }

    #[must_use]
    pub fn context(&self) -> &SubscriptionContext {
        &self.context
    }

    #[must_use]
    pub fn scheduler(&self) -> &LabScheduler {
        &self.lab
    }
}

impl fmt::Debug for SubscriptionTester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTester")
            .field("cell", &self.cell)
            .field("seen", &*self.log.seen.borrow())
            .field("expected", &self.expected)
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}
