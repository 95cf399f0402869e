//! External tool invocation
//!
//! Separation, alignment and rendering are opaque executables driven through
//! positional filesystem-path arguments. This module runs them:
//!
//! - **Admission control**: a shared semaphore caps concurrent tool processes.
//!   A caller that cannot get a slot within the admission window fails with
//!   [`PipelineError::Busy`] instead of queueing forever.
//! - **Timeout**: each run has a wall-clock budget; on expiry the child is
//!   killed and [`PipelineError::ToolTimeout`] is returned.
//! - **Cancellation**: children are spawned with `kill_on_drop`, so a dropped
//!   request future terminates the process.
//!
//! Success requires a zero exit status. Output files are checked separately
//! by the caller (see [`crate::workspace::Workspace::require`]).

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;

/// Resolved description of one external tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Short name used in logs and errors ("separation", ...)
    pub name: String,
    /// Executable or interpreter
    pub program: PathBuf,
    /// Arguments placed before the per-call arguments (typically a script path)
    pub leading_args: Vec<OsString>,
    /// Extra environment on top of the inherited process environment
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
}

/// Output of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// stdout followed by stderr
    pub captured: String,
    pub elapsed: Duration,
}

/// Runs tools under a shared concurrency cap
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    permits: Arc<Semaphore>,
    capacity: usize,
    admission_timeout: Duration,
    run_timeout: Duration,
}

impl ToolInvoker {
    pub fn new(capacity: usize, admission_timeout: Duration, run_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            admission_timeout,
            run_timeout,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tool processes currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Run `spec` with `args` appended to its leading arguments
    pub async fn invoke<I, S>(&self, spec: &ToolSpec, args: I) -> Result<ToolOutput, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let _permit = match tokio::time::timeout(
            self.admission_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            // The semaphore is never closed; treat it like exhaustion anyway
            Ok(Err(_)) | Err(_) => {
                warn!(tool = %spec.name, "No tool slot available within admission window");
                return Err(PipelineError::Busy {
                    tool: spec.name.clone(),
                });
            }
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.leading_args)
            .args(args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        info!(tool = %spec.name, program = %spec.program.display(), "Running external tool");
        let started = Instant::now();

        let child = command.spawn().map_err(|e| {
            error!(tool = %spec.name, error = %e, "Failed to spawn external tool");
            PipelineError::resource(format!("Failed to start {} tool", spec.name), e)
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.run_timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                PipelineError::resource(format!("Failed to collect {} tool output", spec.name), e)
            })?,
            Err(_) => {
                error!(
                    tool = %spec.name,
                    timeout_secs = self.run_timeout.as_secs(),
                    "External tool timed out and was killed"
                );
                return Err(PipelineError::ToolTimeout {
                    tool: spec.name.clone(),
                    seconds: self.run_timeout.as_secs(),
                });
            }
        };

        let elapsed = started.elapsed();
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!(tool = %spec.name, output = %captured, "External tool output");

        if !output.status.success() {
            error!(
                tool = %spec.name,
                exit_code = ?output.status.code(),
                elapsed_ms = elapsed.as_millis() as u64,
                "External tool failed"
            );
            return Err(PipelineError::ToolExecution {
                tool: spec.name.clone(),
                exit_code: output.status.code(),
                output: captured,
            });
        }

        info!(
            tool = %spec.name,
            elapsed_ms = elapsed.as_millis() as u64,
            "External tool completed"
        );
        Ok(ToolOutput { captured, elapsed })
    }
}
