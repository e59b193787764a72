//! Backend-neutral keyed table.

use async_trait::async_trait;

use crate::Error;

/// Unique key of a cache record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub identity: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

impl RecordKey {
    pub fn new(
        identity: impl Into<String>, resource: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>,
    ) -> Self {
        Self { identity: identity.into(), resource: resource.into(), namespace: namespace.into(), name: name.into() }
    }
}

/// All records of one resource type for one identity, optionally narrowed
/// to a namespace. `namespace: None` spans every namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordScope {
    pub identity: String,
    pub resource: String,
    pub namespace: Option<String>,
}

impl RecordScope {
    pub fn contains(&self, key: &RecordKey) -> bool {
        key.identity == self.identity
            && key.resource == self.resource
            && self.namespace.as_ref().is_none_or(|ns| *ns == key.namespace)
    }
}

/// Keyed table of canonical values.
///
/// Writes are insert-or-replace. Backends serialize concurrent writes to the
/// same key themselves.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn upsert(&self, key: &RecordKey, value: &[u8]) -> Result<(), Error>;

    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, Error>;

    /// Values in scope, ordered by namespace then name.
    async fn list(&self, scope: &RecordScope) -> Result<Vec<Vec<u8>>, Error>;

    /// Returns whether a record was removed.
    async fn delete(&self, key: &RecordKey) -> Result<bool, Error>;

    /// Returns the number of records removed.
    async fn delete_scope(&self, scope: &RecordScope) -> Result<u64, Error>;

    /// Clear the scope, then write `records`.
    async fn replace_scope(&self, scope: &RecordScope, records: Vec<(RecordKey, Vec<u8>)>) -> Result<(), Error> {
        self.delete_scope(scope).await?;
        for (key, value) in &records {
            self.upsert(key, value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_contains() {
        let key = RecordKey::new("default", "pods", "ns", "x");
        let ns_scope = RecordScope { identity: "default".into(), resource: "pods".into(), namespace: Some("ns".into()) };
        let all = RecordScope { namespace: None, ..ns_scope.clone() };
        let other = RecordScope { namespace: Some("kube-system".into()), ..ns_scope.clone() };

        assert!(ns_scope.contains(&key));
        assert!(all.contains(&key));
        assert!(!other.contains(&key));
    }
}
