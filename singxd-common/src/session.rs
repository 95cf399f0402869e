//! Session identifiers
//!
//! A session ID correlates the artifacts of one separation run across later
//! alignment calls. Rendering mints its own, unrelated ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Opaque, never-reused session token (UUIDv4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mint a fresh session ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated lowercase, matching keys written by earlier deployments
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("sessionID is required".to_string()));
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|e| Error::InvalidInput(format!("Invalid sessionID '{}': {}", trimmed, e)))
    }
}
