//! Closed-open time intervals.
//!
//! A [`Window`] is `[start, end)` over UTC instants. [`Window::expand`] grows a
//! window to the enclosing span of itself and another window. The result of
//! expanding by a disjoint window therefore covers time that neither input
//! covered; callers that need exact coverage keep an interval set instead
//! (see `audit::coverage`).

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when constructing a [`Window`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {start} is after end {end}")]
    Inverted {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("unix timestamp out of range: {0}")]
    OutOfRange(i64),
}

/// A `[start, end)` interval. Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawWindow> for Window {
    type Error = WindowError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Window::new(raw.start, raw.end)
    }
}

impl Window {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a window from unix seconds.
    pub fn from_unix(start_secs: i64, end_secs: i64) -> Result<Self, WindowError> {
        let start = DateTime::<Utc>::from_timestamp(start_secs, 0)
            .ok_or(WindowError::OutOfRange(start_secs))?;
        let end =
            DateTime::<Utc>::from_timestamp(end_secs, 0).ok_or(WindowError::OutOfRange(end_secs))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// True when the window spans no time.
    pub fn is_zero(&self) -> bool {
        self.start == self.end
    }

    /// True if `t` lies in `[start, end)`.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// True if the two windows share any instant.
    pub fn overlaps(&self, other: &Window) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True if the windows overlap or are directly adjacent.
    pub fn touches(&self, other: &Window) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True if `other` lies entirely within this window.
    pub fn encloses(&self, other: &Window) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Grow this window to the enclosing span of `self` and `other`.
    ///
    /// Union, not intersection: expanding `[0,10)` by `[20,30)` yields
    /// `[0,30)` even though `[10,20)` was covered by neither.
    pub fn expand(&mut self, other: &Window) {
        if other.start < self.start {
            self.start = other.start;
        }
        if other.end > self.end {
            self.end = other.end;
        }
    }

    /// Non-mutating form of [`Window::expand`].
    pub fn union(&self, other: &Window) -> Window {
        let mut w = *self;
        w.expand(other);
        w
    }
}

impl Default for Window {
    /// Zero-length window at the unix epoch.
    fn default() -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339(),
            self.end.to_rfc3339()
        )
    }
}
