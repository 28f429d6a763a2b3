//! Turning wall-clock start/end times into a relative capture window.
//!
//! Times are given as local time of day with no date, so "later than
//! now" can mean tomorrow. A start time up to 59 seconds in the past is
//! treated as "now": the recording was meant to begin a moment ago, not
//! 24 hours from now.

use std::time::Duration;

use capture_core::CaptureWindow;
use chrono::Timelike;

use crate::cli::TimeOfDay;

const DAY: i64 = 86_400;
const LATE_START_GRACE: i64 = 59;

/// Resolve optional start/end times against the current local time.
pub fn plan(start: Option<TimeOfDay>, end: Option<TimeOfDay>) -> CaptureWindow {
    plan_at(start, end, chrono::Local::now().num_seconds_from_midnight())
}

fn plan_at(start: Option<TimeOfDay>, end: Option<TimeOfDay>, now: u32) -> CaptureWindow {
    let now = i64::from(now);

    let start_at = match start {
        None => now,
        Some(TimeOfDay(s)) => {
            let s = i64::from(s);
            if s < now {
                if now - s <= LATE_START_GRACE { now } else { s + DAY }
            } else {
                s
            }
        }
    };

    let end_at = end.map(|TimeOfDay(e)| {
        let mut e = i64::from(e);
        if e < now {
            e += DAY;
        }
        if e < start_at {
            e += DAY;
        }
        e
    });

    CaptureWindow {
        start_delay: Duration::from_secs((start_at - now) as u64),
        end_delay: end_at.map(|e| Duration::from_secs((e - start_at) as u64)),
    }
}
