//! Test Helper Utilities
//!
//! Shared fixtures for singxd-cs integration tests: a pipeline wired to an
//! in-memory store and `/bin/sh` stand-ins for the external tools.

#![allow(dead_code)]

pub mod fake_tools;
pub mod multipart;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use singxd_cs::config::{RetentionConfig, ServerConfig, ToolSpecs};
use singxd_cs::invoker::{ToolInvoker, ToolSpec};
use singxd_cs::pipeline::Pipeline;
use singxd_cs::store::{ArtifactStore, LocalUrlSigner, ObjectArtifactStore};
use singxd_cs::workspace::WorkspaceManager;
use singxd_cs::{build_router, AppState};
use tempfile::TempDir;

pub use fake_tools::*;
pub use multipart::multipart_body;

pub const SIGNING_SECRET: &str = "test-signing-secret-0123456789";
pub const PUBLIC_BASE_URL: &str = "http://localhost:8080";

/// A tool that runs `script` under `/bin/sh -c`; positional args are `$1..`
pub fn sh_tool(name: &str, script: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        program: PathBuf::from("/bin/sh"),
        leading_args: vec!["-c".into(), script.into(), name.into()],
        env: Vec::new(),
        working_dir: None,
    }
}

pub fn signer() -> LocalUrlSigner {
    LocalUrlSigner::new(SIGNING_SECRET, PUBLIC_BASE_URL).unwrap()
}

/// Pipeline plus everything a test needs to inspect afterwards
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<dyn ArtifactStore>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new(separation: &str, alignment: &str, rendering: &str) -> Self {
        Self::with_limits(
            separation,
            alignment,
            rendering,
            ToolInvoker::new(2, Duration::from_secs(10), Duration::from_secs(30)),
        )
    }

    pub fn with_limits(
        separation: &str,
        alignment: &str,
        rendering: &str,
        invoker: ToolInvoker,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ArtifactStore> = Arc::new(ObjectArtifactStore::in_memory(signer()));
        let tools = ToolSpecs {
            separation: sh_tool("separation", separation),
            alignment: sh_tool("alignment", alignment),
            rendering: sh_tool("rendering", rendering),
        };
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&store),
            invoker,
            WorkspaceManager::new(dir.path().join("workspaces")),
            tools,
            "creates",
            RetentionConfig::default(),
        ));
        Self {
            dir,
            store,
            pipeline,
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.dir.path().join("workspaces")
    }

    /// Scratch path outside the workspace root, for tool side effects
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Entries left under the workspace root
    pub fn leftover_workspaces(&self) -> usize {
        count_entries(&self.workspace_root())
    }

    pub fn router(&self) -> axum::Router {
        self.router_with(ServerConfig::default())
    }

    pub fn router_with(&self, server: ServerConfig) -> axum::Router {
        let state = AppState::new(
            Arc::clone(&self.pipeline),
            Some(signer()),
            server.expose_tool_output,
        );
        build_router(state, &server)
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}
