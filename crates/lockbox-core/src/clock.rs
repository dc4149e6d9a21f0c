//! Server-authoritative revision clock.
//!
//! Revision stamps have millisecond precision and strictly increase across
//! the whole process, even if the system clock steps backwards. Client
//! supplied timestamps never feed into a stamp.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Issues strictly increasing millisecond stamps.
#[derive(Debug, Default)]
pub struct RevisionClock {
    last_millis: AtomicI64,
}

impl RevisionClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh stamp later than every stamp issued before.
    pub fn now(&self) -> DateTime<Utc> {
        self.after(None)
    }

    /// A fresh stamp that is also strictly later than `previous`.
    ///
    /// Used when updating a row so its new stamp beats its old one even if
    /// that row was written by an earlier process.
    pub fn after(&self, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let floor = previous.map_or(i64::MIN, |p| p.timestamp_millis().saturating_add(1));
        let mut last = self.last_millis.load(Ordering::Acquire);
        loop {
            let wall = Utc::now().timestamp_millis();
            let next = wall.max(last.saturating_add(1)).max(floor);
            match self.last_millis.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return millis_to_stamp(next),
                Err(current) => last = current,
            }
        }
    }
}

fn millis_to_stamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
