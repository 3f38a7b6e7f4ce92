//! Observability hooks passed explicitly into the grouper, pool and driver.

use std::time::Duration;

use crate::day::DayGroup;
use crate::Error;

/// Receives progress events from a compaction run.
///
/// All methods default to no-ops so observers only implement what they
/// care about.
pub trait CompactionObserver: Send + Sync {
    fn key_skipped(&self, _key: &str) {}

    fn day_started(&self, _day: &DayGroup) {}

    fn object_fetched(&self, _day: &str, _key: &str, _lines: usize) {}

    fn object_failed(&self, _day: &str, _key: &str, _error: &Error) {}

    fn malformed_line(&self, _key: &str, _error: &Error) {}

    fn day_merged(&self, _day: &str, _lines: usize, _elapsed: Duration) {}

    fn day_written(&self, _day: &str, _lines: usize, _location: &str) {}

    fn day_failed(&self, _day: &str, _error: &Error) {}

    fn deadline_reached(&self) {}
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl CompactionObserver for NullObserver {}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CompactionObserver for LogObserver {
    fn key_skipped(&self, key: &str) {
        log::warn!("skipping {key}: no day token");
    }

    fn day_started(&self, day: &DayGroup) {
        log::debug!("reading group {} ({} objects)", day.token, day.len());
    }

    fn object_fetched(&self, day: &str, key: &str, lines: usize) {
        log::debug!("extracted {lines} log lines from {key} for {day}");
    }

    fn object_failed(&self, day: &str, key: &str, error: &Error) {
        log::error!("{day}: {key}: {error}");
    }

    fn malformed_line(&self, key: &str, error: &Error) {
        log::warn!("{key}: {error}");
    }

    fn day_merged(&self, day: &str, lines: usize, elapsed: Duration) {
        log::debug!("merged {lines} log lines for {day} in {elapsed:?}");
    }

    fn day_written(&self, _day: &str, lines: usize, location: &str) {
        log::info!("wrote {lines} log lines to {location}");
    }

    fn day_failed(&self, day: &str, error: &Error) {
        log::error!("day {day} not compacted: {error}");
    }

    fn deadline_reached(&self) {
        log::info!("exceeded timeout, stopping");
    }
}
