#![forbid(unsafe_code)]

//! Test support for celltree.
//!
//! - [`SubscriptionTester`] subscribes to one cell on a virtual clock and
//!   checks what it receives.
//! - [`specimens`] holds small exported types used by the behavioral tests
//!   under `tests/`.

pub mod specimens;
pub mod tester;

pub use tester::SubscriptionTester;
