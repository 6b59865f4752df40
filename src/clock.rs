use std::time::Instant;

/// Time source for the session tracker. Production code uses the system
/// clock; tests substitute a manually stepped one so tick math runs on
/// simulated time instead of wall-clock delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
