use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::ops::Bound;
use std::sync::Arc;

use super::{ListPage, ObjectRef, ObjectStore};
use crate::{Error, Result};

/// In-memory buckets, mostly for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    buckets: BTreeMap<String, BTreeMap<String, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket: impl Into<String>, key: impl Into<String>, body: Vec<u8>) {
        self.buckets
            .entry(bucket.into())
            .or_default()
            .insert(key.into(), Arc::from(body));
    }

    pub fn len(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, BTreeMap::len)
    }
}

impl ObjectStore for MemoryStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let Some(objects) = self.buckets.get(bucket) else {
            return Err(Error::Listing(format!("no such bucket: {bucket}")));
        };
        let lower = match continuation {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut page: Vec<ObjectRef> = objects
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(max_keys.max(1) + 1)
            .map(|(key, body)| ObjectRef::new(key.clone(), body.len() as u64))
            .collect();

        let next_token = if page.len() > max_keys.max(1) {
            page.pop();
            page.last().map(|object| object.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>> {
        let body = self
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| Error::Fetch {
                key: key.to_string(),
                reason: "no such key".to_string(),
            })?;
        Ok(Box::new(Cursor::new(Arc::clone(body))))
    }
}
