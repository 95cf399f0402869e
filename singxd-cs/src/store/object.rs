//! [`ArtifactStore`] over the `object_store` crate
//!
//! One implementation serves all three backends: S3 in production, a local
//! directory for single-host deployments, and memory for development and
//! tests. Only URL signing differs: S3 signs natively, the others go through
//! [`LocalUrlSigner`] and the `/artifacts` route.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info, warn};

use super::{ArtifactKey, ArtifactStore, LocalUrlSigner, StoreError, StoreResult, EXPIRY_PREFIX};
use crate::config::{StoreBackend, StoreConfig};

enum UrlSigning {
    Native(Arc<dyn Signer>),
    Local(LocalUrlSigner),
}

pub struct ObjectArtifactStore {
    inner: Arc<dyn ObjectStore>,
    urls: UrlSigning,
}

impl std::fmt::Debug for ObjectArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let signing = match &self.urls {
            UrlSigning::Native(_) => "native",
            UrlSigning::Local(_) => "local",
        };
        f.debug_struct("ObjectArtifactStore")
            .field("backend", &self.inner.to_string())
            .field("signing", &signing)
            .finish()
    }
}

impl ObjectArtifactStore {
    /// Store whose URLs are signed by this process
    pub fn with_local_signing(inner: Arc<dyn ObjectStore>, signer: LocalUrlSigner) -> Self {
        Self {
            inner,
            urls: UrlSigning::Local(signer),
        }
    }

    /// Store whose backend signs its own URLs
    pub fn with_native_signing<S>(store: Arc<S>) -> Self
    where
        S: ObjectStore + Signer,
    {
        let signer: Arc<dyn Signer> = store.clone();
        Self {
            inner: store,
            urls: UrlSigning::Native(signer),
        }
    }

    /// In-memory store (development, tests)
    pub fn in_memory(signer: LocalUrlSigner) -> Self {
        Self::with_local_signing(Arc::new(InMemory::new()), signer)
    }

    /// Build the configured backend
    ///
    /// `signer` is required for `local` and `memory`.
    pub fn from_config(config: &StoreConfig, signer: Option<LocalUrlSigner>) -> StoreResult<Self> {
        let require_signer = || {
            signer.clone().ok_or_else(|| {
                StoreError::Configuration(format!(
                    "{:?} backend needs store.signing_secret",
                    config.backend
                ))
            })
        };

        let store = match config.backend {
            StoreBackend::S3 => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    StoreError::Configuration("S3 backend requires a bucket".to_string())
                })?;
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                Self::with_native_signing(Arc::new(builder.build()?))
            }
            StoreBackend::Local => {
                std::fs::create_dir_all(&config.local_root).map_err(|e| {
                    StoreError::Configuration(format!(
                        "cannot create {}: {}",
                        config.local_root.display(),
                        e
                    ))
                })?;
                let fs = LocalFileSystem::new_with_prefix(&config.local_root)?;
                Self::with_local_signing(Arc::new(fs), require_signer()?)
            }
            StoreBackend::Memory => Self::in_memory(require_signer()?),
        };

        info!(backend = ?config.backend, store = %store.inner, "Artifact store ready");
        Ok(store)
    }

    fn object_path(key: &str) -> StoreResult<ObjectPath> {
        ObjectPath::parse(key).map_err(|e| StoreError::InvalidKey(format!("{}: {}", key, e)))
    }

    fn marker_path(key: &str) -> StoreResult<ObjectPath> {
        Self::object_path(&format!("{}/{}", EXPIRY_PREFIX, key))
    }

    /// Delete, treating an absent object as success
    async fn delete_quietly(&self, path: &ObjectPath) -> StoreResult<()> {
        match self.inner.delete(path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn deadline(&self, key: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let bytes = match self.inner.get(&Self::marker_path(key)?).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |message: String| StoreError::ExpiryMarker {
            key: key.to_string(),
            message,
        };
        let text = std::str::from_utf8(&bytes).map_err(|e| corrupt(e.to_string()))?;
        let deadline = DateTime::parse_from_rfc3339(text.trim())
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);
        Ok(Some(deadline))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.delete_quietly(&Self::object_path(key)?).await?;
        self.delete_quietly(&Self::marker_path(key)?).await
    }

    /// NotFound if `key` is past its deadline (and remove it)
    ///
    /// An unreadable marker counts as expired: the object was stored with a
    /// TTL, and an unknown deadline must not keep it alive forever.
    async fn ensure_live(&self, key: &str) -> StoreResult<()> {
        match self.deadline(key).await {
            Ok(Some(deadline)) if deadline <= Utc::now() => {
                debug!(key = %key, deadline = %deadline, "Artifact expired, removing");
            }
            Ok(_) => return Ok(()),
            Err(StoreError::ExpiryMarker { key, message }) => {
                warn!(key = %key, error = %message, "Unreadable expiry marker, removing artifact");
            }
            Err(e) => return Err(e),
        }
        self.remove(key).await?;
        Err(StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self.inner.head(&Self::object_path(key)?).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_raw(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.trim_matches('/');
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(Self::object_path(prefix)?)
        };

        let metas: Vec<_> = self.inner.list(prefix_path.as_ref()).try_collect().await?;
        Ok(metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .collect())
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn put(&self, key: &ArtifactKey, bytes: Bytes, ttl: Option<Duration>) -> StoreResult<()> {
        let key_str = key.to_string();
        let size = bytes.len();

        // Marker first so a failed upload never leaves an object without its expiry
        match ttl {
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl).map_err(|e| StoreError::ExpiryMarker {
                    key: key_str.clone(),
                    message: e.to_string(),
                })?;
                let deadline = (Utc::now() + ttl).to_rfc3339();
                self.inner
                    .put(&Self::marker_path(&key_str)?, PutPayload::from(deadline))
                    .await?;
            }
            None => self.delete_quietly(&Self::marker_path(&key_str)?).await?,
        }

        self.inner
            .put(&Self::object_path(&key_str)?, PutPayload::from(bytes))
            .await?;

        debug!(key = %key_str, bytes = size, ttl_secs = ?ttl.map(|t| t.as_secs()), "Artifact stored");
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> StoreResult<Bytes> {
        let key_str = key.to_string();
        self.ensure_live(&key_str).await?;

        match self.inner.get(&Self::object_path(&key_str)?).await {
            Ok(result) => Ok(result.bytes().await?),
            Err(object_store::Error::NotFound { .. }) => Err(StoreError::NotFound(key_str)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &ArtifactKey) -> StoreResult<()> {
        let key_str = key.to_string();
        self.remove(&key_str).await?;
        debug!(key = %key_str, "Artifact deleted");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut live = Vec::new();
        for key in self.list_raw(prefix).await? {
            if key.starts_with(&format!("{}/", EXPIRY_PREFIX)) {
                continue;
            }
            match self.ensure_live(&key).await {
                Ok(()) => live.push(key),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        live.sort();
        Ok(live)
    }

    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> StoreResult<String> {
        let key_str = key.to_string();
        self.ensure_live(&key_str).await?;
        if !self.exists(&key_str).await? {
            return Err(StoreError::NotFound(key_str));
        }

        match &self.urls {
            UrlSigning::Native(signer) => {
                let url = signer
                    .signed_url(Method::GET, &Self::object_path(&key_str)?, ttl)
                    .await
                    .map_err(|e| StoreError::Signing {
                        key: key_str.clone(),
                        message: e.to_string(),
                    })?;
                Ok(url.to_string())
            }
            UrlSigning::Local(signer) => Ok(signer.sign_url(&key_str, ttl)),
        }
    }

    async fn sweep_expired(&self) -> StoreResult<usize> {
        let now = Utc::now();
        let marker_prefix = format!("{}/", EXPIRY_PREFIX);
        let mut removed = 0;

        for marker in self.list_raw(EXPIRY_PREFIX).await? {
            let Some(key) = marker.strip_prefix(&marker_prefix) else {
                continue;
            };
            match self.deadline(key).await {
                Ok(Some(deadline)) if deadline <= now => {}
                Ok(_) => continue,
                Err(StoreError::ExpiryMarker { key, message }) => {
                    warn!(key = %key, error = %message, "Unreadable expiry marker, removing artifact");
                }
                Err(e) => return Err(e),
            }
            self.remove(key).await?;
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "Expired artifacts swept");
        }
        Ok(removed)
    }
}
