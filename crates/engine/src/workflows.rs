//! Workflow CRUD, node editing and JSON import/export.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use db::{DbError, Table};
use dsl::Trigger;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dag::check_graph;
use crate::models::{Connection, NodePatch, Position, Workflow, WorkflowNode, WorkflowPatch};
use crate::templates::TemplateCatalog;
use crate::EngineError;

pub struct WorkflowStore {
    table: Table<Workflow>,
    catalog: Arc<TemplateCatalog>,
    unknown_templates: AtomicU64,
}

fn not_found(id: Uuid) -> impl FnOnce(DbError) -> EngineError {
    move |e| match e {
        DbError::NotFound => EngineError::WorkflowNotFound(id),
        other => other.into(),
    }
}

impl WorkflowStore {
    pub fn in_memory(catalog: Arc<TemplateCatalog>) -> Self {
        Self::with_table(Table::in_memory("workflows"), catalog)
    }

    pub async fn open(dir: &Path, catalog: Arc<TemplateCatalog>) -> Result<Self, EngineError> {
        Ok(Self::with_table(Table::open(dir, "workflows").await?, catalog))
    }

    fn with_table(table: Table<Workflow>, catalog: Arc<TemplateCatalog>) -> Self {
        Self {
            table,
            catalog,
            unknown_templates: AtomicU64::new(0),
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub async fn create(
        &self,
        name: impl Into<String>,
        description: Option<String>,
        trigger: Trigger,
    ) -> Result<Workflow, EngineError> {
        let mut workflow = Workflow::new(name, trigger);
        workflow.description = description;
        self.insert(workflow).await
    }

    /// Store a fully built workflow as-is.
    pub async fn insert(&self, workflow: Workflow) -> Result<Workflow, EngineError> {
        self.table.insert(workflow.id, workflow.clone()).await?;
        info!(workflow_id = %workflow.id, "stored workflow '{}'", workflow.name);
        Ok(workflow)
    }

    pub async fn get(&self, id: Uuid) -> Result<Workflow, EngineError> {
        self.table.get(id).await.map_err(not_found(id))
    }

    /// Every workflow, oldest first.
    pub async fn list(&self) -> Vec<Workflow> {
        let mut workflows = self.table.list().await;
        workflows.sort_by_key(|w| w.created_at);
        workflows
    }

    pub async fn update(&self, id: Uuid, patch: WorkflowPatch) -> Result<Workflow, EngineError> {
        self.table
            .update(id, |w| {
                patch.apply(w);
                w.clone()
            })
            .await
            .map_err(not_found(id))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        self.table.delete(id).await.map_err(not_found(id))?;
        info!(workflow_id = %id, "deleted workflow");
        Ok(())
    }

    /// Copy a workflow under a fresh id, named "<name> (copy)", with its run
    /// statistics reset. Node and connection ids are kept.
    pub async fn duplicate(&self, id: Uuid) -> Result<Workflow, EngineError> {
        let mut copy = self.get(id).await?;
        copy.id = Uuid::new_v4();
        copy.name = format!("{} (copy)", copy.name);
        copy.created_at = Utc::now();
        copy.last_run = None;
        copy.run_count = 0;
        self.insert(copy).await
    }

    // -----------------------------------------------------------------------
    // Nodes and connections
    // -----------------------------------------------------------------------

    /// Append a node instantiated from `template_id`.
    ///
    /// An unknown template is a silent no-op: `Ok(None)`, a warning and a
    /// bump of [`WorkflowStore::unknown_templates`]. The workflow is untouched.
    pub async fn add_node(
        &self,
        workflow_id: Uuid,
        template_id: &str,
        position: Position,
    ) -> Result<Option<WorkflowNode>, EngineError> {
        let Some(template) = self.catalog.get(template_id) else {
            self.unknown_templates.fetch_add(1, Ordering::Relaxed);
            warn!(workflow_id = %workflow_id, "unknown node template '{}', node not added", template_id);
            // Still report a missing workflow.
            self.get(workflow_id).await?;
            return Ok(None);
        };

        let node = WorkflowNode::from_template(template, position);
        self.table
            .update(workflow_id, |w| w.nodes.push(node.clone()))
            .await
            .map_err(not_found(workflow_id))?;
        Ok(Some(node))
    }

    pub async fn update_node(
        &self,
        workflow_id: Uuid,
        node_id: &str,
        patch: NodePatch,
    ) -> Result<WorkflowNode, EngineError> {
        self.table
            .update(workflow_id, |w| {
                let node = w.nodes.iter_mut().find(|n| n.id == node_id)?;
                patch.apply(node);
                Some(node.clone())
            })
            .await
            .map_err(not_found(workflow_id))?
            .ok_or_else(|| EngineError::NodeNotFound {
                workflow_id,
                node_id: node_id.to_owned(),
            })
    }

    /// Remove a node together with every connection touching it.
    pub async fn remove_node(&self, workflow_id: Uuid, node_id: &str) -> Result<WorkflowNode, EngineError> {
        self.table
            .update(workflow_id, |w| w.remove_node(node_id))
            .await
            .map_err(not_found(workflow_id))?
            .ok_or_else(|| EngineError::NodeNotFound {
                workflow_id,
                node_id: node_id.to_owned(),
            })
    }

    pub async fn connect(
        &self,
        workflow_id: Uuid,
        source_node_id: &str,
        target_node_id: &str,
        source_handle: Option<String>,
        target_handle: Option<String>,
    ) -> Result<Connection, EngineError> {
        self.table
            .update(workflow_id, |w| {
                w.connect(source_node_id, target_node_id, source_handle, target_handle)
            })
            .await
            .map_err(not_found(workflow_id))?
    }

    /// `false` if the workflow has no such connection.
    pub async fn disconnect(&self, workflow_id: Uuid, connection_id: &str) -> Result<bool, EngineError> {
        self.table
            .update(workflow_id, |w| w.disconnect(connection_id))
            .await
            .map_err(not_found(workflow_id))
    }

    pub async fn set_variable(
        &self,
        workflow_id: Uuid,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.table
            .update(workflow_id, |w| {
                w.variables.insert(name, value);
            })
            .await
            .map_err(not_found(workflow_id))
    }

    // -----------------------------------------------------------------------
    // Import / export
    // -----------------------------------------------------------------------

    /// The workflow as pretty-printed JSON.
    pub async fn export(&self, id: Uuid) -> Result<String, EngineError> {
        let workflow = self.get(id).await?;
        Ok(serde_json::to_string_pretty(&workflow)?)
    }

    /// Store a workflow from exported JSON under a new id and `createdAt`.
    ///
    /// Malformed input, duplicate node ids and connections to missing nodes
    /// are soft failures: `None` and a warning.
    pub async fn import(&self, json: &str) -> Option<Workflow> {
        let mut workflow: Workflow = match serde_json::from_str(json) {
            Ok(workflow) => workflow,
            Err(e) => {
                warn!("rejected workflow import: {}", e);
                return None;
            }
        };
        if let Err(e) = check_graph(&workflow) {
            warn!("rejected workflow import: {}", e);
            return None;
        }
        workflow.id = Uuid::new_v4();
        workflow.created_at = Utc::now();

        match self.insert(workflow).await {
            Ok(workflow) => Some(workflow),
            Err(e) => {
                warn!("could not store imported workflow: {}", e);
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Run bookkeeping
    // -----------------------------------------------------------------------

    /// Bump the run statistics and write back the run's variables.
    pub(crate) async fn record_run(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        variables: HashMap<String, Value>,
    ) -> Result<(), EngineError> {
        self.table
            .update(id, |w| w.record_run(at, variables))
            .await
            .map_err(not_found(id))
    }

    /// How many `add_node` calls named a template the catalog lacks.
    pub fn unknown_templates(&self) -> u64 {
        self.unknown_templates.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> WorkflowStore {
        WorkflowStore::in_memory(Arc::new(TemplateCatalog::builtin()))
    }

    async fn with_nodes(store: &WorkflowStore, templates: &[&str]) -> (Uuid, Vec<String>) {
        let wf = store.create("wf", None, Trigger::Manual).await.unwrap();
        let mut ids = Vec::new();
        for t in templates {
            let node = store.add_node(wf.id, t, Position::default()).await.unwrap().unwrap();
            ids.push(node.id);
        }
        (wf.id, ids)
    }

    #[tokio::test]
    async fn add_node_uses_template_defaults() {
        let store = store();
        let (id, nodes) = with_nodes(&store, &["play-sound"]).await;
        let wf = store.get(id).await.unwrap();
        assert_eq!(wf.nodes[0].id, nodes[0]);
        assert_eq!(wf.nodes[0].template_id, "play-sound");
        assert_eq!(wf.nodes[0].config["volume"], json!(100));
    }

    #[tokio::test]
    async fn unknown_template_is_a_counted_no_op() {
        let store = store();
        let (id, _) = with_nodes(&store, &["speak"]).await;

        let added = store.add_node(id, "teleport", Position::default()).await.unwrap();
        assert!(added.is_none());
        assert_eq!(store.get(id).await.unwrap().nodes.len(), 1);
        assert_eq!(store.unknown_templates(), 1);
    }

    #[tokio::test]
    async fn unknown_template_on_missing_workflow_is_not_found() {
        let store = store();
        let result = store.add_node(Uuid::new_v4(), "teleport", Position::default()).await;
        assert!(matches!(result, Err(EngineError::WorkflowNotFound(_))));
    }

    #[tokio::test]
    async fn removing_a_node_removes_its_connections() {
        let store = store();
        let (id, n) = with_nodes(&store, &["speak", "delay", "log"]).await;
        store.connect(id, &n[0], &n[1], None, None).await.unwrap();
        store.connect(id, &n[1], &n[2], None, None).await.unwrap();

        store.remove_node(id, &n[1]).await.unwrap();
        let wf = store.get(id).await.unwrap();
        assert_eq!(wf.nodes.len(), 2);
        assert!(wf.connections.is_empty());

        assert!(matches!(
            store.remove_node(id, &n[1]).await,
            Err(EngineError::NodeNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn connect_rejects_dangling_ends() {
        let store = store();
        let (id, n) = with_nodes(&store, &["speak"]).await;
        let result = store.connect(id, &n[0], "ghost", None, None).await;
        assert!(matches!(result, Err(EngineError::UnknownNodeReference { side: "target", .. })));
        assert!(store.get(id).await.unwrap().connections.is_empty());
    }

    #[tokio::test]
    async fn update_node_applies_patch() {
        let store = store();
        let (id, n) = with_nodes(&store, &["log"]).await;
        let node = store
            .update_node(
                id,
                &n[0],
                NodePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!node.enabled);
        assert!(!store.get(id).await.unwrap().nodes[0].enabled);
    }

    #[tokio::test]
    async fn export_then_import_gives_a_new_identity() {
        let store = store();
        let (id, n) = with_nodes(&store, &["speak", "delay"]).await;
        store.connect(id, &n[0], &n[1], None, None).await.unwrap();
        store.set_variable(id, "count", json!(3)).await.unwrap();
        let original = store.get(id).await.unwrap();

        let json = store.export(id).await.unwrap();
        let imported = store.import(&json).await.unwrap();

        assert_ne!(imported.id, original.id);
        assert!(imported.created_at >= original.created_at);
        assert_eq!(imported.nodes, original.nodes);
        assert_eq!(imported.connections, original.connections);
        assert_eq!(imported.variables, original.variables);
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn malformed_import_is_none() {
        let store = store();
        assert!(store.import("{\"name\": 42").await.is_none());
        assert!(store.import("[]").await.is_none());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn import_rejects_broken_graphs() {
        let store = store();
        let (id, n) = with_nodes(&store, &["speak", "delay"]).await;
        store.connect(id, &n[0], &n[1], None, None).await.unwrap();
        let exported: Value = serde_json::from_str(&store.export(id).await.unwrap()).unwrap();

        let mut duplicate_ids = exported.clone();
        duplicate_ids["nodes"][1]["id"] = json!(n[0]);
        assert!(store.import(&duplicate_ids.to_string()).await.is_none());

        let mut dangling = exported.clone();
        dangling["connections"][0]["targetNodeId"] = json!("ghost");
        assert!(store.import(&dangling.to_string()).await.is_none());

        assert_eq!(store.list().await.len(), 1);
        assert!(store.import(&exported.to_string()).await.is_some());
    }

    #[tokio::test]
    async fn duplicate_resets_run_statistics() {
        let store = store();
        let (id, _) = with_nodes(&store, &["speak"]).await;
        store.record_run(id, Utc::now(), HashMap::new()).await.unwrap();

        let copy = store.duplicate(id).await.unwrap();
        assert_ne!(copy.id, id);
        assert_eq!(copy.name, "wf (copy)");
        assert_eq!(copy.run_count, 0);
        assert_eq!(copy.nodes.len(), 1);
    }

    #[tokio::test]
    async fn update_patch_and_delete() {
        let store = store();
        let wf = store.create("old", Some("desc".into()), Trigger::event("raid")).await.unwrap();
        let wf = store
            .update(
                wf.id,
                WorkflowPatch {
                    name: Some("new".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(wf.name, "new");
        assert_eq!(wf.description.as_deref(), Some("desc"));

        store.delete(wf.id).await.unwrap();
        assert!(matches!(store.delete(wf.id).await, Err(EngineError::WorkflowNotFound(_))));
    }
}
