//! Script CRUD over a `db::Table`.

use std::path::Path;

use chrono::{DateTime, Utc};
use db::{DbError, Table};
use tracing::info;
use uuid::Uuid;

use crate::models::Script;
use crate::EngineError;

pub struct ScriptStore {
    table: Table<Script>,
}

fn not_found(id: Uuid) -> impl FnOnce(DbError) -> EngineError {
    move |e| match e {
        DbError::NotFound => EngineError::ScriptNotFound(id),
        other => other.into(),
    }
}

impl ScriptStore {
    pub fn in_memory() -> Self {
        Self {
            table: Table::in_memory("scripts"),
        }
    }

    pub async fn open(dir: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            table: Table::open(dir, "scripts").await?,
        })
    }

    /// Create a script; its diagnostics reflect the initial code.
    pub async fn create(&self, name: impl Into<String>, code: impl Into<String>) -> Result<Script, EngineError> {
        let script = Script::new(name, code);
        self.table.insert(script.id, script.clone()).await?;
        info!(script_id = %script.id, "created script '{}'", script.name);
        Ok(script)
    }

    pub async fn get(&self, id: Uuid) -> Result<Script, EngineError> {
        self.table.get(id).await.map_err(not_found(id))
    }

    /// Every script, oldest first.
    pub async fn list(&self) -> Vec<Script> {
        let mut scripts = self.table.list().await;
        scripts.sort_by_key(|s| s.created_at);
        scripts
    }

    /// Replace the code and refresh the cached diagnostics.
    pub async fn update_code(&self, id: Uuid, code: impl Into<String>) -> Result<Script, EngineError> {
        let code = code.into();
        self.table
            .update(id, |s| {
                s.set_code(code);
                s.clone()
            })
            .await
            .map_err(not_found(id))
    }

    pub async fn rename(&self, id: Uuid, name: impl Into<String>) -> Result<Script, EngineError> {
        let name = name.into();
        self.table
            .update(id, |s| {
                s.name = name;
                s.clone()
            })
            .await
            .map_err(not_found(id))
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Script, EngineError> {
        self.table
            .update(id, |s| {
                s.enabled = enabled;
                s.clone()
            })
            .await
            .map_err(not_found(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        self.table.delete(id).await.map_err(not_found(id))?;
        info!(script_id = %id, "deleted script");
        Ok(())
    }

    /// Bump `runCount` and set `lastRun`.
    pub async fn record_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.table
            .update(id, |s| s.record_run(at))
            .await
            .map_err(not_found(id))
    }
}
