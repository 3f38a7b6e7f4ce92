//! Compacts per-request access-log objects into one sorted archive per day.
//!
//! A run lists a bucket in key order, groups consecutive objects by their
//! day token, fetches and tokenizes each day's objects on a worker pool,
//! sorts the merged lines by request time and hands the day to a sink.

pub mod compactor;
pub mod config;
pub mod day;
pub mod deadline;
pub mod error;
pub mod observer;
pub mod pool;
pub mod scanner;
pub mod sink;
pub mod store;
pub mod timestamp;

pub use compactor::{Compactor, DayFailure, DayReceipt, RunOutcome, RunReport, RunState};
pub use config::{CompactorConfig, FetchFailurePolicy, MalformedPolicy};
pub use day::{DayGroup, DayGrouper, DayKey};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use observer::{CompactionObserver, LogObserver, NullObserver};
pub use pool::{DayStats, FetchParsePool, MergedDay, PoolOptions};
pub use scanner::{LogLine, Scanner};
pub use sink::{DaySink, GzipCsvSink, MemorySink};
pub use store::{Listing, LocalStore, MemoryStore, ObjectRef, ObjectStore};
