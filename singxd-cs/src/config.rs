//! Configuration for singxd-cs
//!
//! Bootstrap configuration comes from a TOML file (see
//! [`singxd_common::config::resolve_config_path`]) with environment overrides
//! applied on top. Everything is resolved and validated once at startup; the
//! pipeline never re-resolves tool locations per request.

use serde::Deserialize;
use singxd_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::invoker::ToolSpec;

/// Module name, used for config file lookup and health reporting
pub const MODULE_NAME: &str = "singxd-cs";

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SINGXD_CONFIG";

/// Minimum length of the local URL signing secret
const MIN_SIGNING_SECRET_LEN: usize = 16;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub tools: ToolsConfig,
    pub execution: ExecutionConfig,
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Externally reachable base URL, used for locally signed artifact links
    pub public_base_url: String,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
    /// Request body cap (uploads)
    pub max_upload_bytes: usize,
    /// Echo raw tool output in error responses
    pub expose_tool_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            max_upload_bytes: 200 * 1024 * 1024,
            expose_tool_output: true,
        }
    }
}

/// Which blob store backs artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Local,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "local" => Ok(StoreBackend::Local),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Artifact store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (MinIO etc.)
    pub endpoint: Option<String>,
    /// Root directory for the `local` backend
    pub local_root: PathBuf,
    /// Key namespace; must stay stable once artifacts exist
    pub namespace: String,
    /// HMAC secret for locally signed URLs (`local` / `memory`)
    pub signing_secret: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::S3,
            bucket: None,
            region: None,
            endpoint: None,
            local_root: std::env::temp_dir().join("singxd-artifacts"),
            namespace: "creates".to_string(),
            signing_secret: None,
        }
    }
}

/// One external tool: an interpreter plus optional script
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Executable or interpreter
    pub program: PathBuf,
    /// Script handed to the interpreter as first argument
    #[serde(default)]
    pub script: Option<PathBuf>,
    /// Extra environment variables
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory for the process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ToolConfig {
    fn python(script: &str) -> Self {
        Self {
            program: PathBuf::from("../ctc/.venv/bin/python"),
            script: Some(PathBuf::from(script)),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Resolve relative paths against `base` and build the invocation spec
    pub fn to_spec(&self, name: &str, base: &Path) -> ToolSpec {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        // Bare program names ("python3") are looked up on PATH
        let program = if self.program.components().count() == 1 {
            self.program.clone()
        } else {
            resolve(&self.program)
        };

        ToolSpec {
            name: name.to_string(),
            program,
            leading_args: self
                .script
                .iter()
                .map(|s| resolve(s).into_os_string())
                .collect(),
            env: self.env.clone().into_iter().collect(),
            working_dir: self.working_dir.as_deref().map(resolve),
        }
    }
}

/// The three pipeline tools
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub separation: ToolConfig,
    pub alignment: ToolConfig,
    pub rendering: ToolConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            separation: ToolConfig::python("../ctc/separator.py"),
            alignment: ToolConfig::python("../ctc/align.py"),
            rendering: ToolConfig::python("../ctc/video.py"),
        }
    }
}

/// Admission control and tool time budget
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Concurrent external tool processes across all stages
    pub max_concurrent_tools: usize,
    /// How long a request may wait for a tool slot
    pub admission_timeout_secs: u64,
    /// Wall-clock budget per tool run
    pub tool_timeout_secs: u64,
    /// Parent directory for per-invocation workspaces
    pub workspace_root: PathBuf,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tools: 2,
            admission_timeout_secs: 30,
            tool_timeout_secs: 20 * 60,
            workspace_root: std::env::temp_dir().join("singxd-workspaces"),
        }
    }
}

impl ExecutionConfig {
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Artifact lifetimes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Separated stems expire after this many minutes
    pub stem_ttl_minutes: u64,
    /// Rendered videos expire after this many minutes
    pub video_ttl_minutes: u64,
    /// Lifetime of presigned URLs handed to clients
    pub presign_ttl_secs: u64,
    /// Interval of the expired-artifact sweep
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            stem_ttl_minutes: 60 * 24,
            video_ttl_minutes: 60 * 24,
            presign_ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

impl RetentionConfig {
    pub fn stem_ttl(&self) -> Duration {
        Duration::from_secs(self.stem_ttl_minutes * 60)
    }

    pub fn video_ttl(&self) -> Duration {
        Duration::from_secs(self.video_ttl_minutes * 60)
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolved tool invocation specs
#[derive(Debug, Clone)]
pub struct ToolSpecs {
    pub separation: ToolSpec,
    pub alignment: ToolSpec,
    pub rendering: ToolSpec,
}

/// Resolve and load configuration with `subscriber` as the active logger
///
/// The service subscriber is built from `logging.level`, so it cannot exist
/// yet; this keeps the loader's own log lines visible. Returns the file used
/// (if any) and the loaded config.
pub fn bootstrap<S>(
    cli_path: Option<&Path>,
    subscriber: S,
) -> Result<(Option<PathBuf>, ServiceConfig)>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::with_default(subscriber, || {
        let path = singxd_common::config::resolve_config_path(cli_path, CONFIG_ENV, MODULE_NAME)?;
        let config = ServiceConfig::load(path.as_deref())?;
        Ok((path, config))
    })
}

impl ServiceConfig {
    /// Load from the resolved config file (or defaults) and apply ENV overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: ServiceConfig = singxd_common::config::load_toml_or_default(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// ENV overrides: S3_BUCKET, AWS_REGION, SINGXD_STORE_BACKEND, SINGXD_PUBLIC_URL,
    /// SINGXD_SIGNING_SECRET
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(bucket) = non_empty_env("S3_BUCKET") {
            self.store.bucket = Some(bucket);
        }
        if let Some(region) = non_empty_env("AWS_REGION") {
            self.store.region = Some(region);
        }
        if let Some(backend) = non_empty_env("SINGXD_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Some(url) = non_empty_env("SINGXD_PUBLIC_URL") {
            self.server.public_base_url = url;
        }
        if let Some(secret) = non_empty_env("SINGXD_SIGNING_SECRET") {
            self.store.signing_secret = Some(secret);
        }
        Ok(())
    }

    /// Resolve tool specs relative to `base` (normally the config file's directory)
    pub fn tool_specs(&self, base: &Path) -> ToolSpecs {
        ToolSpecs {
            separation: self.tools.separation.to_spec("separation", base),
            alignment: self.tools.alignment.to_spec("alignment", base),
            rendering: self.tools.rendering.to_spec("rendering", base),
        }
    }

    /// Fail-fast startup validation
    ///
    /// Checks tool locations, store settings and limits. Called once before
    /// the server binds.
    pub fn validate(&self, specs: &ToolSpecs) -> Result<()> {
        for spec in [&specs.separation, &specs.alignment, &specs.rendering] {
            validate_tool(spec)?;
        }

        match self.store.backend {
            StoreBackend::S3 => {
                if self.store.bucket.as_deref().map_or(true, |b| b.trim().is_empty()) {
                    return Err(Error::Config(
                        "S3 bucket not configured (store.bucket or S3_BUCKET)".to_string(),
                    ));
                }
            }
            StoreBackend::Local | StoreBackend::Memory => {
                let secret_len = self.store.signing_secret.as_deref().map_or(0, str::len);
                if secret_len < MIN_SIGNING_SECRET_LEN {
                    return Err(Error::Config(format!(
                        "store.signing_secret must be at least {} bytes for the {:?} backend",
                        MIN_SIGNING_SECRET_LEN, self.store.backend
                    )));
                }
            }
        }

        let namespace = self.store.namespace.trim();
        if namespace.is_empty() || namespace.contains('/') {
            return Err(Error::Config(format!(
                "store.namespace must be a single non-empty path segment, got '{}'",
                self.store.namespace
            )));
        }

        if self.execution.max_concurrent_tools == 0 {
            return Err(Error::Config(
                "execution.max_concurrent_tools must be at least 1".to_string(),
            ));
        }
        if self.execution.tool_timeout_secs == 0
            || self.retention.presign_ttl_secs == 0
            || self.retention.sweep_interval_secs == 0
        {
            return Err(Error::Config(
                "tool_timeout_secs, presign_ttl_secs and sweep_interval_secs must be non-zero"
                    .to_string(),
            ));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(Error::Config("server.max_upload_bytes must be non-zero".to_string()));
        }

        if self.server.expose_tool_output {
            warn!("server.expose_tool_output is enabled: raw tool output is returned to clients");
        }

        info!(
            backend = ?self.store.backend,
            namespace = %self.store.namespace,
            max_concurrent_tools = self.execution.max_concurrent_tools,
            "Configuration validated"
        );
        Ok(())
    }
}

fn validate_tool(spec: &ToolSpec) -> Result<()> {
    let program_is_bare = spec.program.components().count() == 1;
    if !program_is_bare && !spec.program.is_file() {
        return Err(Error::Config(format!(
            "{} tool program not found: {}",
            spec.name,
            spec.program.display()
        )));
    }
    for arg in &spec.leading_args {
        let script = Path::new(arg);
        if !script.is_file() {
            return Err(Error::Config(format!(
                "{} tool script not found: {}",
                spec.name,
                script.display()
            )));
        }
    }
    if let Some(dir) = &spec.working_dir {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "{} tool working directory not found: {}",
                spec.name,
                dir.display()
            )));
        }
    }
    Ok(())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
