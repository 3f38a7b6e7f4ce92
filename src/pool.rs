//! Concurrent fetch and parse of one day's objects.
//!
//! Workers pull from a pre-loaded queue, tokenize each object and hand the
//! batch to a single collector over a bounded channel. The collector merges
//! every batch and sorts the day once all workers are done.

use std::collections::VecDeque;
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use crate::config::{CompactorConfig, FetchFailurePolicy, MalformedPolicy};
use crate::day::DayGroup;
use crate::deadline::Deadline;
use crate::observer::{CompactionObserver, NullObserver};
use crate::scanner::{LogLine, Scanner};
use crate::store::{ObjectRef, ObjectStore};
use crate::timestamp::sort_lines;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub results_capacity: usize,
    pub malformed_policy: MalformedPolicy,
    pub fetch_failure_policy: FetchFailurePolicy,
    pub max_day_lines: Option<usize>,
}

impl PoolOptions {
    pub fn from_config(config: &CompactorConfig) -> Self {
        Self {
            workers: config.worker_count(),
            results_capacity: config.results_capacity,
            malformed_policy: config.malformed_policy,
            fetch_failure_policy: config.fetch_failure_policy,
            max_day_lines: config.max_day_lines,
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from_config(&CompactorConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedObject {
    pub key: String,
    pub reason: String,
}

/// Coverage of one day: every object ends up fetched, failed or skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayStats {
    pub objects: usize,
    pub fetched: usize,
    pub failed: Vec<FailedObject>,
    /// Objects never fetched because the deadline tripped first.
    pub skipped: usize,
    pub malformed_lines: usize,
}

impl DayStats {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }
}

/// All lines of one day in timestamp order.
#[derive(Debug, Clone)]
pub struct MergedDay {
    pub token: String,
    pub lines: Vec<LogLine>,
    pub stats: DayStats,
}

enum WorkerEvent {
    Batch {
        key: String,
        lines: Vec<LogLine>,
        malformed: usize,
    },
    Failed {
        key: String,
        error: Error,
    },
}

struct Collected {
    lines: Vec<LogLine>,
    stats: DayStats,
    over_limit: bool,
}

pub struct FetchParsePool {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    options: PoolOptions,
    observer: Arc<dyn CompactionObserver>,
}

impl FetchParsePool {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, options: PoolOptions) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            options,
            observer: Arc::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompactionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Fetch, tokenize and merge every object of `day`.
    ///
    /// If the deadline trips, workers stop taking new objects and whatever
    /// was already parsed is still merged; [`DayStats::skipped`] tells how
    /// much is missing. Unparseable timestamps, an exceeded line bound, or a
    /// failed fetch under [`FetchFailurePolicy::AbortDay`] fail the day.
    pub fn read_day(&self, day: &DayGroup, deadline: &Deadline) -> Result<MergedDay> {
        let started = Instant::now();
        self.observer.day_started(day);

        let queue: Mutex<VecDeque<ObjectRef>> = Mutex::new(day.objects.iter().cloned().collect());
        let stop = AtomicBool::new(false);
        let workers = self.options.workers.max(1).min(day.len().max(1));
        let (tx, rx) = mpsc::sync_channel(self.options.results_capacity.max(1));

        let collected = thread::scope(|scope| -> Result<Collected> {
            let mut handles = Vec::with_capacity(workers);
            let mut spawn_error = None;
            for worker_id in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                let stop = &stop;
                let spawned = thread::Builder::new()
                    .name(format!("fetch-worker-{worker_id}"))
                    .spawn_scoped(scope, move || {
                        self.run_worker(&day.token, queue, tx, stop, deadline)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        stop.store(true, Ordering::Release);
                        spawn_error = Some(err);
                        break;
                    }
                }
            }
            drop(tx);

            let collected = self.collect(&day.token, rx, &stop);

            let mut panicked = false;
            for handle in handles {
                panicked |= handle.join().is_err();
            }
            if let Some(err) = spawn_error {
                return Err(err.into());
            }
            if panicked {
                return Err(Error::WorkerPanicked);
            }
            Ok(collected)
        })?;

        let Collected {
            lines,
            mut stats,
            over_limit,
        } = collected;
        stats.objects = day.len();
        stats.skipped = stats.objects - stats.fetched - stats.failed.len();

        if over_limit {
            return Err(Error::DayTooLarge {
                day: day.token.clone(),
                limit: self.options.max_day_lines.unwrap_or_default(),
            });
        }
        if self.options.fetch_failure_policy == FetchFailurePolicy::AbortDay {
            if let Some(first) = stats.failed.first() {
                return Err(Error::DayAborted {
                    day: day.token.clone(),
                    reason: format!("{}: {}", first.key, first.reason),
                });
            }
        }

        let lines = sort_lines(lines)?;
        self.observer.day_merged(&day.token, lines.len(), started.elapsed());
        Ok(MergedDay {
            token: day.token.clone(),
            lines,
            stats,
        })
    }

    fn run_worker(
        &self,
        day: &str,
        queue: &Mutex<VecDeque<ObjectRef>>,
        results: SyncSender<WorkerEvent>,
        stop: &AtomicBool,
        deadline: &Deadline,
    ) {
        loop {
            if deadline.expired() || stop.load(Ordering::Acquire) {
                return;
            }
            let next = queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(object) = next else {
                return;
            };

            let event = match self.extract(&object) {
                Ok((lines, malformed)) => WorkerEvent::Batch {
                    key: object.key,
                    lines,
                    malformed,
                },
                Err(error) => {
                    if self.options.fetch_failure_policy == FetchFailurePolicy::AbortDay {
                        stop.store(true, Ordering::Release);
                    }
                    WorkerEvent::Failed {
                        key: object.key,
                        error,
                    }
                }
            };
            if results.send(event).is_err() {
                log::debug!("{day}: collector gone, worker exiting");
                return;
            }
        }
    }

    /// Fetch one object and tokenize it. Returns the lines and the number of
    /// malformed records dropped.
    fn extract(&self, object: &ObjectRef) -> Result<(Vec<LogLine>, usize)> {
        let body = self.store.fetch(&self.bucket, &object.key)?;
        let mut lines = Vec::new();
        let mut malformed = 0;
        for record in Scanner::new(BufReader::new(body)) {
            match record {
                Ok(line) => lines.push(line),
                Err(err @ Error::MalformedField { .. }) => match self.options.malformed_policy {
                    MalformedPolicy::SkipLine => {
                        self.observer.malformed_line(&object.key, &err);
                        malformed += 1;
                    }
                    MalformedPolicy::RejectObject => return Err(err),
                },
                Err(Error::Io(err)) => {
                    return Err(Error::Fetch {
                        key: object.key.clone(),
                        reason: format!("read body: {err}"),
                    })
                }
                Err(err) => return Err(err),
            }
        }
        Ok((lines, malformed))
    }

    fn collect(&self, day: &str, results: Receiver<WorkerEvent>, stop: &AtomicBool) -> Collected {
        let mut collected = Collected {
            lines: Vec::new(),
            stats: DayStats::default(),
            over_limit: false,
        };
        // Keep draining after the bound trips so no worker blocks on a full channel.
        for event in results {
            match event {
                WorkerEvent::Batch {
                    key,
                    lines,
                    malformed,
                } => {
                    collected.stats.fetched += 1;
                    collected.stats.malformed_lines += malformed;
                    self.observer.object_fetched(day, &key, lines.len());
                    if collected.over_limit {
                        continue;
                    }
                    let total = collected.lines.len() + lines.len();
                    if self.options.max_day_lines.map_or(false, |limit| total > limit) {
                        collected.over_limit = true;
                        collected.lines = Vec::new();
                        stop.store(true, Ordering::Release);
                        continue;
                    }
                    collected.lines.extend(lines);
                }
                WorkerEvent::Failed { key, error } => {
                    self.observer.object_failed(day, &key, &error);
                    collected.stats.failed.push(FailedObject {
                        key,
                        reason: error.to_string(),
                    });
                }
            }
        }
        collected
    }
}
