//! # SingXD Common Library
//!
//! Shared code for SingXD services including:
//! - Sync map data model (lyric lines, word timings, sync points, resolved alignment)
//! - Session identifiers
//! - Configuration file discovery
//! - Common error type

pub mod config;
pub mod error;
pub mod session;
pub mod sync_map;

pub use error::{Error, Result};
pub use session::SessionId;
