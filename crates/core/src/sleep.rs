use std::thread;
use std::time::{Duration, Instant};

/// Sleep for a settle delay. Zero returns immediately.
pub fn settle(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

/// Sleep for `d`, but never past `deadline`.
pub fn settle_until(d: Duration, deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    settle(d.min(remaining));
}
