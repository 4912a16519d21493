//! Wall-clock trading windows.
//!
//! A [`TimeWindow`] is a `start`/`end` pair of wall-clock times with no date
//! component; the day-ahead market assumption is that both ends refer to the
//! next calendar day. On the wire a window travels as `"HH:MM"` strings.
//!
//! Matching uses *containment*: the buyer's window must lie entirely inside
//! the seller's, and the buyer's window must be at least as long as the
//! required delivery duration.

use serde::{Deserialize, Serialize};

use crate::error::ConstraintError;

/// A half-open wall-clock interval, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowRepr", into = "WindowRepr")]
pub struct TimeWindow {
    start_min: u16,
    end_min: u16,
}

/// Wire shape of a window: `{"start": "09:00", "end": "17:00"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WindowRepr {
    start: String,
    end: String,
}

impl TimeWindow {
    /// Build a window from minutes since midnight.
    ///
    /// Rejects `start >= end` and out-of-day values.
    pub fn from_minutes(start_min: u16, end_min: u16) -> Result<Self, ConstraintError> {
        if start_min >= end_min {
            return Err(ConstraintError::EmptyWindow { start_min, end_min });
        }
        if end_min > 24 * 60 {
            return Err(ConstraintError::BadClock(format!("{}m", end_min)));
        }
        Ok(TimeWindow { start_min, end_min })
    }

    /// Parse a window from two `"HH:MM"` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ConstraintError> {
        TimeWindow::from_minutes(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start_minutes(&self) -> u16 {
        self.start_min
    }

    pub fn end_minutes(&self) -> u16 {
        self.end_min
    }

    /// Window length in seconds.
    pub fn span_secs(&self) -> u32 {
        u32::from(self.end_min - self.start_min) * 60
    }

    /// True iff `inner` lies entirely within `self`.
    pub fn contains(&self, inner: &TimeWindow) -> bool {
        inner.start_min >= self.start_min && inner.end_min <= self.end_min
    }

    /// Full compatibility check used by both matching modes: the buyer's
    /// window is contained in the seller's and is long enough to hold the
    /// required delivery duration.
    pub fn accommodates(&self, buyer: &TimeWindow, duration_secs: u32) -> bool {
        self.contains(buyer) && buyer.span_secs() >= duration_secs
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_clock(self.start_min),
            format_clock(self.end_min)
        )
    }
}

impl TryFrom<WindowRepr> for TimeWindow {
    type Error = ConstraintError;

    fn try_from(repr: WindowRepr) -> Result<Self, Self::Error> {
        TimeWindow::parse(&repr.start, &repr.end)
    }
}

impl From<TimeWindow> for WindowRepr {
    fn from(w: TimeWindow) -> Self {
        WindowRepr {
            start: format_clock(w.start_min),
            end: format_clock(w.end_min),
        }
    }
}

fn parse_clock(s: &str) -> Result<u16, ConstraintError> {
    let bad = || ConstraintError::BadClock(s.to_string());

    let (hh, mm) = s.split_once(':').ok_or_else(bad)?;
    let hours: u16 = hh.parse().map_err(|_| bad())?;
    let minutes: u16 = mm.parse().map_err(|_| bad())?;
    if hours > 24 || minutes > 59 || (hours == 24 && minutes != 0) {
        return Err(bad());
    }
    Ok(hours * 60 + minutes)
}

fn format_clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
