//! Filesystem cache backend.
//!
//! Layout: `{root}/{sha256(identity)}/{resource}/{namespace}/{name}.json`,
//! with cluster-scoped records under the `_cluster` directory. Writes go to
//! a temporary file in the target directory and are renamed into place, so a
//! reader sees either the old or the new value, never a torn one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::hash::identity_digest;
use super::store::{CacheStore, RecordKey, RecordScope};
use crate::Error;

const CLUSTER_DIR: &str = "_cluster";
const EXTENSION: &str = "json";

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), tmp_seq: AtomicU64::new(0) }
    }

    fn resource_dir(&self, identity: &str, resource: &str) -> Result<PathBuf, Error> {
        check_component("resource", resource)?;
        Ok(self.root.join(identity_digest(identity)).join(resource))
    }

    fn namespace_dir(&self, identity: &str, resource: &str, namespace: &str) -> Result<PathBuf, Error> {
        let dir = if namespace.is_empty() {
            CLUSTER_DIR
        } else {
            check_component("namespace", namespace)?;
            namespace
        };
        Ok(self.resource_dir(identity, resource)?.join(dir))
    }

    fn record_path(&self, key: &RecordKey) -> Result<PathBuf, Error> {
        check_component("name", &key.name)?;
        let dir = self.namespace_dir(&key.identity, &key.resource, &key.namespace)?;
        Ok(dir.join(format!("{}.{EXTENSION}", key.name)))
    }

    /// Namespace directories in scope, paired with the namespace they hold.
    async fn scope_dirs(&self, scope: &RecordScope) -> Result<Vec<(String, PathBuf)>, Error> {
        if let Some(namespace) = &scope.namespace {
            let dir = self.namespace_dir(&scope.identity, &scope.resource, namespace)?;
            return Ok(vec![(namespace.clone(), dir)]);
        }

        let mut dirs = Vec::new();
        for (dir_name, path) in read_dir_sorted(&self.resource_dir(&scope.identity, &scope.resource)?).await? {
            let namespace = if dir_name == CLUSTER_DIR { String::new() } else { dir_name };
            dirs.push((namespace, path));
        }
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs)
    }

    /// Record files in one namespace directory, ordered by name.
    async fn record_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
        let mut files: Vec<(String, PathBuf)> = read_dir_sorted(dir)
            .await?
            .into_iter()
            .filter_map(|(file_name, path)| {
                let name = file_name.strip_suffix(&format!(".{EXTENSION}"))?.to_string();
                Some((name, path))
            })
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }
}

/// Reject components that would escape or alias the directory layout.
fn check_component(field: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidRequest(format!("{field} {value:?} is not a valid path component")));
    }
    Ok(())
}

/// Directory entries as (file name, path). A missing directory is empty.
async fn read_dir_sorted(dir: &Path) -> Result<Vec<(String, PathBuf)>, Error> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str()
            && !name.starts_with('.')
        {
            out.push((name.to_string(), entry.path()));
        }
    }
    out.sort();
    Ok(out)
}

#[async_trait]
impl CacheStore for FsStore {
    async fn upsert(&self, key: &RecordKey, value: &[u8]) -> Result<(), Error> {
        let path = self.record_path(key)?;
        let dir = path.parent().ok_or_else(|| Error::InvalidRequest("record path has no parent".into()))?;
        tokio::fs::create_dir_all(dir).await?;

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!(".{}.{}.{seq}.tmp", key.name, std::process::id()));
        tokio::fs::write(&tmp, value).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, Error> {
        match tokio::fs::read(self.record_path(key)?).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, scope: &RecordScope) -> Result<Vec<Vec<u8>>, Error> {
        let mut values = Vec::new();
        for (_, dir) in self.scope_dirs(scope).await? {
            for path in Self::record_files(&dir).await? {
                match tokio::fs::read(&path).await {
                    Ok(value) => values.push(value),
                    // Deleted between listing and reading.
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(values)
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, Error> {
        match tokio::fs::remove_file(self.record_path(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_scope(&self, scope: &RecordScope) -> Result<u64, Error> {
        let mut removed = 0;
        for (_, dir) in self.scope_dirs(scope).await? {
            for path in Self::record_files(&dir).await? {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(removed)
    }
}
