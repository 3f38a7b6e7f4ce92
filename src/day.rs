//! Grouping a sorted object listing into per-day runs.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::observer::{CompactionObserver, NullObserver};
use crate::store::{base_name, ObjectRef};
use crate::{Error, Result};

pub const DEFAULT_TOKEN_LEN: usize = 10;

/// How an object key maps to its day token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DayKey {
    /// First `len` characters of the base name, the layout of server
    /// access logs (`logs/2019-02-23-00-15-32-ABCD` -> `2019-02-23`).
    BaseName { len: usize },
    /// The directory directly holding the object (`2019-02-23/a` -> `2019-02-23`).
    ParentDir,
}

impl DayKey {
    pub fn base_name(len: usize) -> Self {
        DayKey::BaseName { len }
    }

    pub fn token(&self, key: &str) -> Option<String> {
        let token = match self {
            DayKey::BaseName { len } => base_name(key).get(..*len)?,
            DayKey::ParentDir => {
                let (dirs, _) = key.rsplit_once('/')?;
                base_name(dirs)
            }
        };
        (!token.is_empty()).then(|| token.to_string())
    }
}

impl Default for DayKey {
    fn default() -> Self {
        Self::base_name(DEFAULT_TOKEN_LEN)
    }
}

/// Objects sharing one day token, in listing order. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub token: String,
    pub objects: Vec<ObjectRef>,
}

impl DayGroup {
    fn start(token: String, first: ObjectRef) -> Self {
        Self {
            token,
            objects: vec![first],
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|object| object.key.as_str())
    }
}

/// Lazily turns a key-ordered object stream into [`DayGroup`]s.
///
/// Only the group being built is held in memory. A group is emitted when
/// the first object of the next day arrives, or at end of input. Once the
/// deadline trips the in-progress group is dropped and nothing more is
/// emitted. A listing error is yielded once and ends the sequence.
pub struct DayGrouper<I> {
    source: I,
    key: DayKey,
    deadline: Deadline,
    observer: Arc<dyn CompactionObserver>,
    pending: Option<DayGroup>,
    finished: bool,
}

impl<I> DayGrouper<I>
where
    I: Iterator<Item = Result<ObjectRef>>,
{
    pub fn new(source: I, key: DayKey, deadline: Deadline) -> Self {
        Self {
            source,
            key,
            deadline,
            observer: Arc::new(NullObserver),
            pending: None,
            finished: false,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompactionObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn stop(&mut self) {
        self.finished = true;
        self.pending = None;
    }
}

impl<I> Iterator for DayGrouper<I>
where
    I: Iterator<Item = Result<ObjectRef>>,
{
    type Item = Result<DayGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.deadline.expired() {
                self.stop();
                return None;
            }
            let object = match self.source.next() {
                Some(Ok(object)) => object,
                Some(Err(err)) => {
                    self.stop();
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return self.pending.take().map(Ok);
                }
            };
            let Some(token) = self.key.token(&object.key) else {
                self.observer.key_skipped(&object.key);
                continue;
            };
            match self.pending.as_mut() {
                Some(group) if group.token == token => group.objects.push(object),
                Some(_) => {
                    let done = self.pending.replace(DayGroup::start(token, object));
                    return done.map(Ok);
                }
                None => self.pending = Some(DayGroup::start(token, object)),
            }
        }
    }
}

/// Day groups produced on a background thread.
///
/// The channel holds a single finished group, so listing runs at most one
/// day ahead of the consumer.
pub struct DayFeed {
    groups: Option<Receiver<Result<DayGroup>>>,
    handle: Option<JoinHandle<()>>,
}

pub fn spawn_day_feed<I>(grouper: DayGrouper<I>) -> Result<DayFeed>
where
    I: Iterator<Item = Result<ObjectRef>> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let handle = thread::Builder::new()
        .name("day-feed".to_string())
        .spawn(move || {
            for group in grouper {
                if tx.send(group).is_err() {
                    break;
                }
            }
        })?;
    Ok(DayFeed {
        groups: Some(rx),
        handle: Some(handle),
    })
}

impl DayFeed {
    /// Block until the next group is ready. `None` once the producer is done.
    pub fn recv(&mut self) -> Option<Result<DayGroup>> {
        self.groups.as_ref()?.recv().ok()
    }

    /// Stop consuming and wait for the producer thread to exit.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the receiver unblocks a producer waiting on a full channel.
        self.groups = None;
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| Error::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for DayFeed {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
