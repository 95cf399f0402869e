//! Artifact store
//!
//! Artifacts are immutable blobs addressed by `<namespace>/<sessionId>/<file>`.
//! The pipeline only talks to the [`ArtifactStore`] trait; the handle is
//! injected (`Arc<dyn ArtifactStore>`) so tests can swap in an in-memory
//! backend.
//!
//! # Expiry
//!
//! A TTL on `put` is recorded as a marker object `_expiry/<key>` holding an
//! RFC 3339 deadline. Reads treat a key past its deadline as absent;
//! [`ArtifactStore::sweep_expired`] deletes expired objects for good.

mod object;
mod signer;

pub use object::ObjectArtifactStore;
pub use signer::{LocalUrlSigner, SignatureError};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use singxd_common::SessionId;
use thiserror::Error;

/// Prefix under which expiry markers live
pub const EXPIRY_PREFIX: &str = "_expiry";

/// Artifact store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key absent or expired
    #[error("{0}")]
    NotFound(String),

    /// Key could not be mapped onto a store path
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    /// Expiry marker exists but is unreadable
    #[error("Corrupt expiry marker for {key}: {message}")]
    ExpiryMarker { key: String, message: String },

    /// Backend cannot be built from the given settings
    #[error("Artifact store configuration error: {0}")]
    Configuration(String),

    /// Presigning failed
    #[error("Failed to sign URL for {key}: {message}")]
    Signing { key: String, message: String },

    /// Backend failure
    #[error(transparent)]
    Backend(#[from] object_store::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Vocals,
    Instrumental,
    /// Mixed-down track from the legacy pipeline generation
    Combined,
    Video,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Vocals,
        ArtifactKind::Instrumental,
        ArtifactKind::Combined,
        ArtifactKind::Video,
    ];

    /// File name under the session prefix
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Vocals => "vocals.wav",
            ArtifactKind::Instrumental => "inst.wav",
            ArtifactKind::Combined => "combined.mp3",
            ArtifactKind::Video => "video.mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Vocals => "vocals",
            ArtifactKind::Instrumental => "instrumental",
            ArtifactKind::Combined => "combined",
            ArtifactKind::Video => "video",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.file_name() == name)
    }

    /// MIME type used when streaming the artifact
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Vocals | ArtifactKind::Instrumental => "audio/wav",
            ArtifactKind::Combined => "audio/mpeg",
            ArtifactKind::Video => "video/mp4",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| StoreError::InvalidKey(format!("unknown artifact kind '{}'", s)))
    }
}

/// Fully qualified artifact address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub namespace: String,
    pub session: SessionId,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn new(namespace: impl Into<String>, session: SessionId, kind: ArtifactKind) -> Self {
        Self {
            namespace: namespace.into(),
            session,
            kind,
        }
    }

    /// `<namespace>/<sessionId>`, the listing prefix for one session
    pub fn session_prefix(namespace: &str, session: &SessionId) -> String {
        format!("{}/{}", namespace, session)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.namespace,
            self.session,
            self.kind.file_name()
        )
    }
}

impl FromStr for ArtifactKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidKey(s.to_string());

        let mut parts = s.split('/');
        let (Some(namespace), Some(session), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if namespace.is_empty() || namespace == EXPIRY_PREFIX {
            return Err(invalid());
        }

        let session: SessionId = session.parse().map_err(|_| invalid())?;
        let kind = ArtifactKind::from_file_name(file).ok_or_else(invalid)?;
        Ok(Self::new(namespace, session, kind))
    }
}

/// Blob storage for pipeline artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object
    ///
    /// With `ttl` the object expires after that long; without it any earlier
    /// expiry is cleared.
    async fn put(&self, key: &ArtifactKey, bytes: Bytes, ttl: Option<Duration>) -> StoreResult<()>;

    /// Fetch an artifact; absent or expired keys are [`StoreError::NotFound`]
    async fn get(&self, key: &ArtifactKey) -> StoreResult<Bytes>;

    /// Remove an artifact and its expiry marker (idempotent)
    async fn delete(&self, key: &ArtifactKey) -> StoreResult<()>;

    /// Live keys under a path prefix, sorted
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Time-limited download URL for an existing artifact
    async fn presign(&self, key: &ArtifactKey, ttl: Duration) -> StoreResult<String>;

    /// Delete every expired artifact, returning how many were removed
    async fn sweep_expired(&self) -> StoreResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let session: SessionId = "0f8fad5b-d9cb-469f-a165-70867728950e".parse().unwrap();
        let key = ArtifactKey::new("creates", session, ArtifactKind::Instrumental);
        assert_eq!(
            key.to_string(),
            "creates/0f8fad5b-d9cb-469f-a165-70867728950e/inst.wav"
        );
        assert_eq!(key.to_string().parse::<ArtifactKey>().unwrap(), key);
    }

    #[test]
    fn test_legacy_namespace_parses() {
        let key: ArtifactKey = "sessions/0f8fad5b-d9cb-469f-a165-70867728950e/combined.mp3"
            .parse()
            .unwrap();
        assert_eq!(key.namespace, "sessions");
        assert_eq!(key.kind, ArtifactKind::Combined);
    }

    #[test]
    fn test_key_parse_rejects_foreign_paths() {
        for bad in [
            "creates/not-a-uuid/vocals.wav",
            "creates/0f8fad5b-d9cb-469f-a165-70867728950e/notes.txt",
            "creates/0f8fad5b-d9cb-469f-a165-70867728950e",
            "a/creates/0f8fad5b-d9cb-469f-a165-70867728950e/vocals.wav",
            "_expiry/0f8fad5b-d9cb-469f-a165-70867728950e/vocals.wav",
            "/0f8fad5b-d9cb-469f-a165-70867728950e/vocals.wav",
        ] {
            assert!(bad.parse::<ArtifactKey>().is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!("instrumental".parse::<ArtifactKind>().unwrap(), ArtifactKind::Instrumental);
        assert!("inst".parse::<ArtifactKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ArtifactKind::Video).unwrap(),
            "\"video\""
        );
    }
}
