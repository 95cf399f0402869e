//! singxd-cs - Creation Service
//!
//! Runs the separation, alignment and rendering stages behind an HTTP API.
//! Startup order: CLI → config file → ENV overrides → validation → store →
//! expiry sweeper → server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use singxd_cs::config::{bootstrap, StoreBackend, CONFIG_ENV, MODULE_NAME};
use singxd_cs::pipeline::Pipeline;
use singxd_cs::store::{ArtifactStore, LocalUrlSigner, ObjectArtifactStore};
use singxd_cs::AppState;

/// Command-line arguments for singxd-cs
#[derive(Parser, Debug)]
#[command(name = "singxd-cs")]
#[command(about = "SingXD Creation Service: separation, alignment and rendering")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind
    #[arg(short, long, env = "SINGXD_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging level comes from the config, so loading runs under a plain subscriber
    let bootstrap_logger = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    let (config_path, mut config) = bootstrap(args.config.as_deref(), bootstrap_logger)
        .context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting {}",
        MODULE_NAME
    );
    if let Some(path) = &config_path {
        info!(config = %path.display(), "Configuration file in use");
    }

    // Relative tool paths are anchored at the config file, else the working directory
    let base = match config_path.as_ref().and_then(|p| p.parent()) {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("Failed to read working directory")?,
    };
    let tools = config.tool_specs(&base);
    config.validate(&tools).context("Invalid configuration")?;

    let url_signer = match config.store.backend {
        StoreBackend::S3 => None,
        StoreBackend::Local | StoreBackend::Memory => Some(
            LocalUrlSigner::new(
                config.store.signing_secret.as_deref().unwrap_or_default(),
                &config.server.public_base_url,
            )
            .context("Failed to set up URL signing")?,
        ),
    };
    let store: Arc<dyn ArtifactStore> = Arc::new(
        ObjectArtifactStore::from_config(&config.store, url_signer.clone())
            .context("Failed to open artifact store")?,
    );

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(singxd_cs::run_expiry_sweeper(
        Arc::clone(&store),
        config.retention.sweep_interval(),
        shutdown.clone(),
    ));

    let pipeline = Arc::new(Pipeline::from_config(&config, tools, store));
    let state = AppState::new(pipeline, url_signer, config.server.expose_tool_output);
    let app = singxd_cs::build_router(state, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Expiry sweeper task failed");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels background tasks
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
    shutdown.cancel();
}
