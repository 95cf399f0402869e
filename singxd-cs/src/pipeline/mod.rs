//! Pipeline stages
//!
//! Each stage follows the same shape: validate input, acquire a workspace,
//! run one external tool, check its outputs, then store and/or return the
//! result. Stages share the store handle, the tool invoker (and with it the
//! concurrency cap) and the workspace root through [`Pipeline`].

mod alignment;
mod rendering;
mod separation;

pub use alignment::{LyricsInput, ToolTiming};
pub use rendering::{RenderOutput, RenderRequest};
pub use separation::SeparationOutput;

use std::sync::Arc;

use singxd_common::SessionId;

use crate::config::{RetentionConfig, ServiceConfig, ToolSpecs};
use crate::error::PipelineError;
use crate::invoker::ToolInvoker;
use crate::store::{ArtifactKey, ArtifactKind, ArtifactStore};
use crate::workspace::WorkspaceManager;

/// Shared stage dependencies
pub struct Pipeline {
    store: Arc<dyn ArtifactStore>,
    invoker: ToolInvoker,
    workspaces: WorkspaceManager,
    tools: ToolSpecs,
    namespace: String,
    retention: RetentionConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        invoker: ToolInvoker,
        workspaces: WorkspaceManager,
        tools: ToolSpecs,
        namespace: impl Into<String>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            workspaces,
            tools,
            namespace: namespace.into(),
            retention,
        }
    }

    /// Wire a pipeline from validated configuration
    pub fn from_config(
        config: &ServiceConfig,
        tools: ToolSpecs,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let invoker = ToolInvoker::new(
            config.execution.max_concurrent_tools,
            config.execution.admission_timeout(),
            config.execution.tool_timeout(),
        );
        Self::new(
            store,
            invoker,
            WorkspaceManager::new(&config.execution.workspace_root),
            tools,
            config.store.namespace.trim(),
            config.retention.clone(),
        )
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn retention(&self) -> &RetentionConfig {
        &self.retention
    }

    pub fn key(&self, session: SessionId, kind: ArtifactKind) -> ArtifactKey {
        ArtifactKey::new(self.namespace.clone(), session, kind)
    }

    /// Fresh download URL for an existing artifact
    pub async fn presign(&self, key: &ArtifactKey) -> Result<String, PipelineError> {
        Ok(self
            .store
            .presign(key, self.retention.presign_ttl())
            .await?)
    }

    /// Live artifacts of one session
    pub async fn session_artifacts(
        &self,
        session: SessionId,
    ) -> Result<Vec<ArtifactKey>, PipelineError> {
        let prefix = ArtifactKey::session_prefix(&self.namespace, &session);
        let keys = self.store.list(&prefix).await?;
        // Files the pipeline did not write are not artifacts
        Ok(keys.iter().filter_map(|k| k.parse().ok()).collect())
    }

    /// Delete every artifact of a session; returns the number removed
    pub async fn delete_session(&self, session: SessionId) -> Result<usize, PipelineError> {
        let keys = self.session_artifacts(session).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        tracing::info!(session_id = %session, deleted = keys.len(), "Session artifacts deleted");
        Ok(keys.len())
    }
}
