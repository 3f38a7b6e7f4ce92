//! Object-store collaborator: listing and fetching access-log objects.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;

use crate::Result;

mod local;
mod memory;

pub use local::LocalStore;
pub use memory::MemoryStore;

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One stored object as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub key: String,
    pub size: u64,
}

impl ObjectRef {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }

    /// Last `/`-separated component of the key.
    pub fn base_name(&self) -> &str {
        base_name(&self.key)
    }
}

pub fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectRef>,
    /// Token for the following page, `None` on the last page.
    pub next_token: Option<String>,
}

/// Listing and fetch capability handed to the compactor.
///
/// Implementations must list keys in ascending byte order; the day grouping
/// depends on it.
pub trait ObjectStore: Send + Sync {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage>;

    fn fetch(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>>;
}

/// Pages through a listing one request at a time.
///
/// At most one page is buffered; a failed page request is yielded once and
/// ends the iteration.
pub struct Listing {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    page_size: usize,
    buffered: VecDeque<ObjectRef>,
    next_token: Option<String>,
    pages: usize,
    exhausted: bool,
}

impl Listing {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
            page_size: page_size.max(1),
            buffered: VecDeque::new(),
            next_token: None,
            pages: 0,
            exhausted: false,
        }
    }

    /// Pages requested so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = self.store.list_page(
            &self.bucket,
            &self.prefix,
            self.next_token.as_deref(),
            self.page_size,
        )?;
        self.pages += 1;
        log::debug!(
            "listed page {} of {}/{}: {} objects",
            self.pages,
            self.bucket,
            self.prefix,
            page.objects.len()
        );
        self.buffered.extend(page.objects);
        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for Listing {
    type Item = Result<ObjectRef>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(object) = self.buffered.pop_front() {
                return Some(Ok(object));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }
}
