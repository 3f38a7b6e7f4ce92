use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall-clock budget for one run, shared by every thread taking part in it.
///
/// Checks are cooperative: callers poll [`Deadline::expired`] at group
/// boundaries and before each fetch. Nothing in flight is interrupted.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// A budget too large to represent as an instant never expires.
    pub fn after(budget: Duration) -> Self {
        match Instant::now().checked_add(budget) {
            Some(at) => Self::at(at),
            None => Self::never(),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self {
            at: Some(instant),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A deadline that only trips through [`Deadline::cancel`].
    pub fn never() -> Self {
        Self {
            at: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trip the deadline now for every clone.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn expired(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        self.at.map_or(false, |at| Instant::now() >= at)
    }

    pub fn remaining(&self) -> Option<Duration> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(Duration::ZERO);
        }
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}
