//! Cache record CRUD on the SQLite backend.

use async_trait::async_trait;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::store::{CacheStore, RecordKey, RecordScope};
use crate::Error;

const UPSERT: &str = "INSERT INTO cache_records (identity, resource, namespace, name, value, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(identity, resource, namespace, name) DO UPDATE SET
         value = excluded.value,
         updated_at = excluded.updated_at";

const SCOPE_FILTER: &str = "identity = ?1 AND resource = ?2 AND (?3 IS NULL OR namespace = ?3)";

fn upsert_row(conn: &rusqlite::Connection, key: &RecordKey, value: &[u8], now: &str) -> Result<(), Error> {
    conn.execute(UPSERT, params![key.identity, key.resource, key.namespace, key.name, value, now])?;
    Ok(())
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn upsert(&self, key: &RecordKey, value: &[u8]) -> Result<(), Error> {
        let key = key.clone();
        let value = value.to_vec();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> { upsert_row(conn, &key, &value, &now) })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Vec<u8>>, Error> {
        let key = key.clone();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let result = conn.query_row(
                    "SELECT value FROM cache_records
                     WHERE identity = ?1 AND resource = ?2 AND namespace = ?3 AND name = ?4",
                    params![key.identity, key.resource, key.namespace, key.name],
                    |row| row.get(0),
                );

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self, scope: &RecordScope) -> Result<Vec<Vec<u8>>, Error> {
        let scope = scope.clone();
        self.conn
            .call(move |conn| -> Result<Vec<Vec<u8>>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT value FROM cache_records WHERE {SCOPE_FILTER} ORDER BY namespace, name"
                ))?;
                let rows = stmt.query_map(params![scope.identity, scope.resource, scope.namespace], |row| row.get(0))?;
                let values = rows.collect::<Result<Vec<Vec<u8>>, _>>()?;
                Ok(values)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, Error> {
        let key = key.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_records
                     WHERE identity = ?1 AND resource = ?2 AND namespace = ?3 AND name = ?4",
                    params![key.identity, key.resource, key.namespace, key.name],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_scope(&self, scope: &RecordScope) -> Result<u64, Error> {
        let scope = scope.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    &format!("DELETE FROM cache_records WHERE {SCOPE_FILTER}"),
                    params![scope.identity, scope.resource, scope.namespace],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Clears and refills the scope in one transaction, so readers never see
    /// the empty intermediate state.
    async fn replace_scope(&self, scope: &RecordScope, records: Vec<(RecordKey, Vec<u8>)>) -> Result<(), Error> {
        let scope = scope.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    &format!("DELETE FROM cache_records WHERE {SCOPE_FILTER}"),
                    params![scope.identity, scope.resource, scope.namespace],
                )?;
                for (key, value) in &records {
                    upsert_row(&tx, key, value, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
