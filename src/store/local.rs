use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use super::{ListPage, ObjectRef, ObjectStore};
use crate::{Error, Result};

/// Buckets laid out as directories: `<root>/<bucket>/<key>`.
///
/// Every page request walks the bucket directory, so this is meant for
/// replaying downloaded log dumps rather than very large buckets.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(Error::Fetch {
                key: key.to_string(),
                reason: "key escapes the bucket".to_string(),
            });
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

impl ObjectStore for LocalStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage> {
        let bucket_dir = self.root.join(bucket);
        if !bucket_dir.is_dir() {
            return Err(Error::Listing(format!(
                "bucket directory {} not found",
                bucket_dir.display()
            )));
        }

        let mut objects = Vec::new();
        collect_objects(&bucket_dir, "", &mut objects)
            .map_err(|err| Error::Listing(format!("walk {}: {err}", bucket_dir.display())))?;
        objects.retain(|object| {
            object.key.starts_with(prefix)
                && continuation.map_or(true, |token| object.key.as_str() > token)
        });
        objects.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let max_keys = max_keys.max(1);
        let next_token = if objects.len() > max_keys {
            objects.truncate(max_keys);
            objects.last().map(|object| object.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects,
            next_token,
        })
    }

    fn fetch(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.object_path(bucket, key)?;
        let file = File::open(&path).map_err(|err| Error::Fetch {
            key: key.to_string(),
            reason: format!("open {}: {err}", path.display()),
        })?;
        Ok(Box::new(file))
    }
}

fn collect_objects(dir: &Path, key_prefix: &str, out: &mut Vec<ObjectRef>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("skipping non utf-8 path under {}", dir.display());
            continue;
        };
        let key = format!("{key_prefix}{name}");
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_objects(&entry.path(), &format!("{key}/"), out)?;
        } else if file_type.is_file() {
            out.push(ObjectRef::new(key, entry.metadata()?.len()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bucket() -> (TempDir, LocalStore) {
        let temp = TempDir::new().expect("tempdir");
        let logs = temp.path().join("bucket").join("logs");
        std::fs::create_dir_all(logs.join("nested")).expect("mkdir");
        std::fs::write(logs.join("2019-02-24-b"), b"bb").expect("write");
        std::fs::write(logs.join("2019-02-23-a"), b"a").expect("write");
        std::fs::write(logs.join("nested").join("x"), b"xyz").expect("write");
        std::fs::write(temp.path().join("bucket").join("root"), b"").expect("write");
        let store = LocalStore::new(temp.path());
        (temp, store)
    }

    #[test]
    fn lists_sorted_keys_under_prefix() {
        let (_temp, store) = bucket();
        let page = store.list_page("bucket", "logs/", None, 10).expect("page");
        let keys: Vec<_> = page.objects.iter().map(|o| (o.key.as_str(), o.size)).collect();
        assert_eq!(
            keys,
            vec![
                ("logs/2019-02-23-a", 1),
                ("logs/2019-02-24-b", 2),
                ("logs/nested/x", 3),
            ]
        );
        assert!(page.next_token.is_none());
    }

    #[test]
    fn paginates_with_continuation() {
        let (_temp, store) = bucket();
        let first = store.list_page("bucket", "", None, 2).expect("page");
        assert_eq!(first.objects.len(), 2);
        let token = first.next_token.expect("token");
        let second = store
            .list_page("bucket", "", Some(&token), 2)
            .expect("page");
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["logs/nested/x", "root"]);
        assert!(second.next_token.is_none());
    }

    #[test]
    fn fetch_reads_file_and_rejects_escapes() {
        let (_temp, store) = bucket();
        let mut body = Vec::new();
        store
            .fetch("bucket", "logs/2019-02-24-b")
            .expect("fetch")
            .read_to_end(&mut body)
            .expect("read");
        assert_eq!(body, b"bb");

        assert!(matches!(store.fetch("bucket", "../secret"), Err(Error::Fetch { .. })));
        assert!(matches!(store.fetch("bucket", "missing"), Err(Error::Fetch { .. })));
    }

    #[test]
    fn missing_bucket_is_listing_error() {
        let (_temp, store) = bucket();
        assert!(matches!(
            store.list_page("nope", "", None, 1),
            Err(Error::Listing(_))
        ));
    }
}
