//! Process-wide write clock.
//!
//! Timestamps are wall-clock milliseconds since the Unix epoch, forced to be
//! strictly increasing within the process. They are *not* comparable across
//! devices beyond what their wall clocks allow.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Returns the current wall-clock time in milliseconds.
#[must_use]
pub fn wall_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Returns a write timestamp greater than every one previously issued.
#[must_use]
pub fn next_timestamp() -> i64 {
    let wall = wall_millis();
    let mut last = LAST_TIMESTAMP.load(Ordering::SeqCst);
    loop {
        let next = wall.max(last.saturating_add(1));
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}
