//! Ephemeral per-invocation workspaces
//!
//! Every stage call gets its own directory under the configured root. Names
//! carry a random suffix from [`tempfile`], so two invocations started in the
//! same clock tick never share a directory. The directory is removed when the
//! [`Workspace`] is released or dropped, which covers early returns, panics,
//! and cancelled request futures alike.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::PipelineError;

/// Creates workspaces under a fixed root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh directory `<root>/<prefix>_<random>`
    pub fn acquire(&self, prefix: &str) -> Result<Workspace, PipelineError> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            PipelineError::resource(
                format!("Failed to create workspace root {}", self.root.display()),
                e,
            )
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}_", prefix))
            .tempdir_in(&self.root)
            .map_err(|e| PipelineError::resource("Failed to create temp directory", e))?;

        tracing::debug!(workspace = %dir.path().display(), "Workspace acquired");
        Ok(Workspace { dir })
    }
}

/// Scoped directory, deleted on release or drop
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a fixed file name inside the workspace
    ///
    /// Names are constants chosen by the pipeline; anything that could escape
    /// the directory is rejected.
    pub fn file(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let candidate = Path::new(name);
        let single_component = candidate.components().count() == 1
            && candidate.file_name().map(|n| n == name).unwrap_or(false);
        if !single_component {
            return Err(PipelineError::Validation(format!(
                "Invalid workspace file name: {}",
                name
            )));
        }
        Ok(self.dir.path().join(name))
    }

    /// Write `bytes` to `name`, returning the full path
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let path = self.file(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::resource(format!("Failed to save {}", name), e))?;
        Ok(path)
    }

    /// Read `name` fully
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.require(name).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::resource(format!("Failed to read {}", name), e))
    }

    /// Require that a tool produced `name`
    ///
    /// Checked regardless of the tool's exit status.
    pub async fn require(&self, name: &str) -> Result<PathBuf, PipelineError> {
        let path = self.file(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(PipelineError::OutputMissing {
                file: name.to_string(),
            }),
        }
    }

    /// Delete the directory now, logging any failure
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(workspace = %path.display(), "Workspace released"),
            Err(e) => tracing::warn!(
                workspace = %path.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}
