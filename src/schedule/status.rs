//! Dose status transitions.
//!
//! PENDING → ON_TIME | LATE | MISSED. Every non-PENDING state is terminal.

use chrono::{Duration, NaiveDateTime};

use crate::models::enums::DoseStatus;
use crate::models::DoseWindow;

/// Where a mark attempt falls relative to the dose window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkTiming {
    /// Before the window opens.
    Early,
    /// Inside [start, end].
    InWindow,
    /// After the window, within the grace period.
    WithinGrace,
    /// After end + grace.
    PastGrace,
}

impl MarkTiming {
    /// Status a mark with this timing produces, if it is accepted at all.
    pub fn status(&self) -> Option<DoseStatus> {
        match self {
            Self::InWindow => Some(DoseStatus::OnTime),
            Self::WithinGrace => Some(DoseStatus::Late),
            Self::Early | Self::PastGrace => None,
        }
    }
}

pub fn classify_mark(window: &DoseWindow, grace: Duration, at: NaiveDateTime) -> MarkTiming {
    if at < window.start {
        MarkTiming::Early
    } else if at <= window.end {
        MarkTiming::InWindow
    } else if at <= window.end + grace {
        MarkTiming::WithinGrace
    } else {
        MarkTiming::PastGrace
    }
}

/// Latest window end that is overdue at `now`. A window ending exactly at
/// the cutoff is still markable LATE at `now`, so a mark and the sweep may
/// race for it; the conditional PENDING update lets the first writer win.
pub fn missed_cutoff(now: NaiveDateTime, grace: Duration) -> NaiveDateTime {
    now - grace
}
