//! Run driver: listing -> day groups -> fetch/merge -> sink.

use std::sync::Arc;

use crate::config::CompactorConfig;
use crate::day::{spawn_day_feed, DayGrouper};
use crate::deadline::Deadline;
use crate::observer::{CompactionObserver, LogObserver};
use crate::pool::{DayStats, FetchParsePool, PoolOptions};
use crate::sink::DaySink;
use crate::store::{Listing, ObjectStore};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Listing,
    Grouping,
    FetchingDay(String),
    Done,
    TimedOut,
    Failed,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Listing exhausted, every group handled.
    Done,
    /// Deadline reached; days already written stay valid.
    TimedOut,
    /// Stopped by a run-level failure (listing or sink).
    Failed(Error),
}

#[derive(Debug, Clone)]
pub struct DayReceipt {
    pub day: String,
    pub lines: usize,
    pub location: String,
    pub stats: DayStats,
}

#[derive(Debug)]
pub struct DayFailure {
    pub day: String,
    pub error: Error,
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub days_written: Vec<DayReceipt>,
    pub days_failed: Vec<DayFailure>,
}

impl RunReport {
    /// The error that ended the run early, if it was not the deadline.
    pub fn fatal_error(&self) -> Option<&Error> {
        match &self.outcome {
            RunOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn total_lines(&self) -> usize {
        self.days_written.iter().map(|day| day.lines).sum()
    }
}

pub struct Compactor<S> {
    store: Arc<dyn ObjectStore>,
    sink: S,
    config: CompactorConfig,
    observer: Arc<dyn CompactionObserver>,
    state: RunState,
}

impl<S: DaySink> Compactor<S> {
    pub fn new(store: Arc<dyn ObjectStore>, sink: S, config: CompactorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            sink,
            config,
            observer: Arc::new(LogObserver),
            state: RunState::Idle,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompactionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run with the configured timeout.
    pub fn run(&mut self) -> RunReport {
        let deadline = Deadline::after(self.config.timeout());
        self.run_until(&deadline)
    }

    /// Compact days in listing order until the listing ends, the deadline
    /// trips, or a run-level error occurs.
    ///
    /// Day-scoped failures (bad timestamps, aborted or oversized days) are
    /// recorded and the run moves on to the next day.
    pub fn run_until(&mut self, deadline: &Deadline) -> RunReport {
        let mut days_written = Vec::new();
        let mut days_failed = Vec::new();
        let outcome = self.drive(deadline, &mut days_written, &mut days_failed);

        self.state = match &outcome {
            RunOutcome::Done => RunState::Done,
            RunOutcome::TimedOut => {
                self.observer.deadline_reached();
                RunState::TimedOut
            }
            RunOutcome::Failed(_) => RunState::Failed,
        };
        RunReport {
            outcome,
            days_written,
            days_failed,
        }
    }

    fn drive(
        &mut self,
        deadline: &Deadline,
        days_written: &mut Vec<DayReceipt>,
        days_failed: &mut Vec<DayFailure>,
    ) -> RunOutcome {
        self.state = RunState::Listing;
        let listing = Listing::new(
            Arc::clone(&self.store),
            self.config.source_bucket.clone(),
            self.config.source_prefix.clone(),
            self.config.list_page_size,
        );
        let grouper = DayGrouper::new(listing, self.config.day_key, deadline.clone())
            .with_observer(Arc::clone(&self.observer));
        let mut feed = match spawn_day_feed(grouper) {
            Ok(feed) => feed,
            Err(err) => return RunOutcome::Failed(err),
        };
        let pool = FetchParsePool::new(
            Arc::clone(&self.store),
            self.config.source_bucket.clone(),
            PoolOptions::from_config(&self.config),
        )
        .with_observer(Arc::clone(&self.observer));

        self.state = RunState::Grouping;
        let outcome = loop {
            if deadline.expired() {
                break RunOutcome::TimedOut;
            }
            let day = match feed.recv() {
                Some(Ok(day)) => day,
                Some(Err(err)) => break RunOutcome::Failed(err),
                // The producer also stops silently once the deadline trips.
                None if deadline.expired() => break RunOutcome::TimedOut,
                None => break RunOutcome::Done,
            };
            if deadline.expired() {
                break RunOutcome::TimedOut;
            }

            self.state = RunState::FetchingDay(day.token.clone());
            match pool.read_day(&day, deadline) {
                // Nothing fetched before the deadline: abandon the day rather
                // than replace its archive with an empty one.
                Ok(merged) if merged.stats.fetched == 0 && deadline.expired() => {
                    break RunOutcome::TimedOut;
                }
                Ok(merged) => match self.sink.write_day(&merged.token, &merged.lines) {
                    Ok(location) => {
                        self.observer
                            .day_written(&merged.token, merged.lines.len(), &location);
                        days_written.push(DayReceipt {
                            day: merged.token,
                            lines: merged.lines.len(),
                            location,
                            stats: merged.stats,
                        });
                    }
                    Err(err) => break RunOutcome::Failed(err),
                },
                Err(err) if err.is_day_scoped() => {
                    self.observer.day_failed(&day.token, &err);
                    days_failed.push(DayFailure {
                        day: day.token,
                        error: err,
                    });
                }
                Err(err) => break RunOutcome::Failed(err),
            }
            self.state = RunState::Grouping;
        };

        if let Err(err) = feed.close() {
            if !matches!(outcome, RunOutcome::Failed(_)) {
                return RunOutcome::Failed(err);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::LogLine;
    use crate::sink::MemorySink;
    use crate::store::MemoryStore;

    fn line(ts: &str) -> String {
        format!("owner logs [{ts}] 192.0.2.3 requester id REST.GET.OBJECT\n")
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert("logs", "p/2019-02-06-a", line("06/Feb/2019:10:00:00 +0000").into_bytes());
        store.insert("logs", "p/2019-02-07-a", line("07/Feb/2019:10:00:00 +0000").into_bytes());
        store
    }

    fn config() -> CompactorConfig {
        let mut config = CompactorConfig::new("logs");
        config.source_prefix = "p/".into();
        config.workers = Some(2);
        config
    }

    #[test]
    fn test_run_finishes_in_done_state() {
        let mut compactor = Compactor::new(Arc::new(store()), MemorySink::new(), config())
            .unwrap()
            .with_observer(Arc::new(crate::observer::NullObserver));
        assert_eq!(compactor.state(), &RunState::Idle);
        let report = compactor.run_until(&Deadline::never());
        assert!(matches!(report.outcome, RunOutcome::Done));
        assert_eq!(compactor.state(), &RunState::Done);
        assert_eq!(report.total_lines(), 2);
        let days: Vec<&str> = compactor.sink().days().iter().map(|(day, _)| day.as_str()).collect();
        assert_eq!(days, vec!["2019-02-06", "2019-02-07"]);
    }

    #[test]
    fn test_expired_deadline_writes_nothing() {
        let deadline = Deadline::never();
        deadline.cancel();
        let mut compactor = Compactor::new(Arc::new(store()), MemorySink::new(), config()).unwrap();
        let report = compactor.run_until(&deadline);
        assert!(matches!(report.outcome, RunOutcome::TimedOut));
        assert_eq!(compactor.state(), &RunState::TimedOut);
        assert!(report.days_written.is_empty());
        assert!(report.fatal_error().is_none());
    }

    #[test]
    fn test_missing_bucket_fails_run() {
        let mut config = config();
        config.source_bucket = "elsewhere".into();
        let mut compactor = Compactor::new(Arc::new(store()), MemorySink::new(), config).unwrap();
        let report = compactor.run_until(&Deadline::never());
        assert!(matches!(report.fatal_error(), Some(Error::Listing(_))));
        assert_eq!(compactor.state(), &RunState::Failed);
    }

    struct BrokenSink;

    impl DaySink for BrokenSink {
        fn write_day(&mut self, _day: &str, _lines: &[LogLine]) -> Result<String> {
            Err(Error::Sink("disk full".into()))
        }
    }

    #[test]
    fn test_sink_failure_is_fatal() {
        let mut compactor = Compactor::new(Arc::new(store()), BrokenSink, config()).unwrap();
        let report = compactor.run_until(&Deadline::never());
        assert!(matches!(report.fatal_error(), Some(Error::Sink(_))));
        assert!(report.days_written.is_empty());
    }

    #[test]
    fn test_unbounded_timeout_runs_to_completion() {
        let mut config = config();
        config.timeout_secs = u64::MAX;
        assert!(config.validate().is_ok());
        let mut compactor = Compactor::new(Arc::new(store()), MemorySink::new(), config)
            .unwrap()
            .with_observer(Arc::new(crate::observer::NullObserver));
        let report = compactor.run();
        assert!(matches!(report.outcome, RunOutcome::Done));
        assert_eq!(report.days_written.len(), 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = Compactor::new(Arc::new(store()), MemorySink::new(), CompactorConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
