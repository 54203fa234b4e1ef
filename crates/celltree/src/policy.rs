#![forbid(unsafe_code)]

//! Change policies and the push-versus-poll dispatch rule.
//!
//! A cell's [`Changes`] tag declares how its value can change. The delivery
//! mechanism used by `subscribe` is a pure function of that tag
//! ([`Changes::delivery`]); cells and the poller never reason about policy
//! in any other way.

use std::fmt;
use std::str::FromStr;

use crate::error::CellError;

/// How (and whether) a cell's value can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Changes {
    /// Immutable after construction. No notification ever fires.
    Never,
    /// May change at any time through any path.
    Continuous,
    /// Changes only through this cell's own `set`.
    #[default]
    ThisSetter,
    /// May change through other methods on the owning object.
    ThisObject,
    /// May change due to state outside the owning object.
    Global,
    /// Like `Global`, but slow-changing; sampled on the slow queue.
    PlaceholderSlow,
}

/// Which poller queue samples a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollQueue {
    Fast,
    Slow,
}

/// How subscribers to a cell are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No callbacks ever fire.
    None,
    /// `set` invokes callbacks synchronously.
    Push,
    /// The poller samples the cell each tick of the given queue.
    Poll(PollQueue),
}

impl Changes {
    pub const ALL: [Changes; 6] = [
        Changes::Never,
        Changes::Continuous,
        Changes::ThisSetter,
        Changes::ThisObject,
        Changes::Global,
        Changes::PlaceholderSlow,
    ];

    #[must_use]
    pub const fn delivery(self) -> Delivery {
        match self {
            Self::Never => Delivery::None,
            Self::ThisSetter => Delivery::Push,
            Self::Continuous | Self::ThisObject | Self::Global => Delivery::Poll(PollQueue::Fast),
            Self::PlaceholderSlow => Delivery::Poll(PollQueue::Slow),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Continuous => "continuous",
            Self::ThisSetter => "this_setter",
            Self::ThisObject => "this_object",
            Self::Global => "global",
            Self::PlaceholderSlow => "placeholder_slow",
        }
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Changes {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CellError::coercion("change policy", format!("{s:?}")))
    }
}

impl fmt::Display for PollQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        })
    }
}
