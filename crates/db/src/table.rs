//! A keyed row store with optional JSON-file backing.
//!
//! Every mutation rewrites the backing file (when there is one) while the
//! write lock is held, so the file always reflects a consistent snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::DbError;

/// Rows of type `T` keyed by [`Uuid`].
pub struct Table<T> {
    name: String,
    path: Option<PathBuf>,
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T> Table<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// A table that lives only as long as the process.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: None,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or create) the table stored at `<dir>/<name>.json`.
    pub async fn open(dir: &Path, name: impl Into<String>) -> Result<Self, DbError> {
        let name = name.into();
        let path = dir.join(format!("{name}.json"));

        let rows = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("opened table '{}' ({} rows) at {}", name, rows.len(), path.display());

        Ok(Self {
            name,
            path: Some(path),
            rows: RwLock::new(rows),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or replace the row under `id`.
    pub async fn insert(&self, id: Uuid, row: T) -> Result<(), DbError> {
        let mut rows = self.rows.write().await;
        rows.insert(id, row);
        self.flush(&rows).await
    }

    /// Fetch a copy of the row under `id`.
    pub async fn get(&self, id: Uuid) -> Result<T, DbError> {
        self.rows.read().await.get(&id).cloned().ok_or(DbError::NotFound)
    }

    /// Copies of every row, in no particular order.
    pub async fn list(&self) -> Vec<T> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// Mutate the row under `id` in place and persist it.
    ///
    /// Returns `DbError::NotFound` if no such row exists.
    pub async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut T) -> R) -> Result<R, DbError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(DbError::NotFound)?;
        let out = f(row);
        self.flush(&rows).await?;
        Ok(out)
    }

    /// Remove and return the row under `id`.
    ///
    /// Returns `DbError::NotFound` if no row was deleted.
    pub async fn delete(&self, id: Uuid) -> Result<T, DbError> {
        let mut rows = self.rows.write().await;
        let row = rows.remove(&id).ok_or(DbError::NotFound)?;
        self.flush(&rows).await?;
        Ok(row)
    }

    async fn flush(&self, rows: &HashMap<Uuid, T>) -> Result<(), DbError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(rows)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!("flushed table '{}' ({} rows)", self.name, rows.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        name: String,
        count: u32,
    }

    fn row(name: &str) -> Row {
        Row {
            name: name.into(),
            count: 0,
        }
    }

    #[tokio::test]
    async fn crud_in_memory() {
        let table = Table::in_memory("rows");
        let id = Uuid::new_v4();

        table.insert(id, row("a")).await.unwrap();
        assert_eq!(table.get(id).await.unwrap(), row("a"));
        assert_eq!(table.len().await, 1);

        let count = table
            .update(id, |r| {
                r.count += 1;
                r.count
            })
            .await
            .unwrap();
        assert_eq!(count, 1);

        assert_eq!(table.delete(id).await.unwrap().count, 1);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let table: Table<Row> = Table::in_memory("rows");
        let id = Uuid::new_v4();
        assert!(matches!(table.get(id).await, Err(DbError::NotFound)));
        assert!(matches!(table.update(id, |_| ()).await, Err(DbError::NotFound)));
        assert!(matches!(table.delete(id).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn file_backed_table_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        {
            let table = Table::open(dir.path(), "rows").await.unwrap();
            table.insert(id, row("persisted")).await.unwrap();
        }

        let reopened: Table<Row> = Table::open(dir.path(), "rows").await.unwrap();
        assert_eq!(reopened.get(id).await.unwrap(), row("persisted"));
        assert!(dir.path().join("rows.json").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rows.json"), b"{ not json").unwrap();
        let result: Result<Table<Row>, _> = Table::open(dir.path(), "rows").await;
        assert!(matches!(result, Err(DbError::Serde(_))));
    }
}
