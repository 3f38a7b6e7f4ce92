use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed field in record {record}: unterminated {partial:?}")]
    MalformedField { record: usize, partial: String },
    #[error("line {line} has no timestamp field")]
    MissingTimestamp { line: usize },
    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },
    #[error("fetch {key} failed: {reason}")]
    Fetch { key: String, reason: String },
    #[error("listing failed: {0}")]
    Listing(String),
    #[error("day {day} aborted: {reason}")]
    DayAborted { day: String, reason: String },
    #[error("day {day} exceeds {limit} lines")]
    DayTooLarge { day: String, limit: usize },
    #[error("sink error: {0}")]
    Sink(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl Error {
    /// Errors that invalidate a single day but leave the run usable.
    pub fn is_day_scoped(&self) -> bool {
        matches!(
            self,
            Error::MissingTimestamp { .. }
                | Error::Timestamp { .. }
                | Error::DayAborted { .. }
                | Error::DayTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
