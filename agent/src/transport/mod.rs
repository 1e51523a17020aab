//! Remote document transport.
//!
//! The remote holds one JSON document guarded by a version stamp. Reads
//! return the document and its stamp; writes are compare-and-swap: they only
//! succeed if the caller's base stamp equals the remote's current stamp.
//!
//! Transport calls never raise. Every call returns an outcome that the
//! orchestrator matches exhaustively.

mod http;
mod memory;
pub mod wire;

pub use http::HttpTransport;
pub use memory::MemoryRemote;

use async_trait::async_trait;
use clubsync_engine::Document;
use serde::Serialize;

/// Result of reading the remote document.
#[derive(Debug, Clone, PartialEq)]
pub enum GetOutcome {
    Ok {
        /// `None` when the remote has never been written
        updated_at: Option<String>,
        data: Document,
    },
    Failed(TransportError),
}

/// Result of a compare-and-swap write.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Ok { updated_at: String },
    /// The remote moved past the base stamp
    Conflict,
    Failed(TransportError),
}

/// Non-conflict transport failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timeout")]
    Timeout,

    #[error("non_json")]
    NonJson,

    #[error("http_{0}")]
    Status(u16),

    /// The remote answered `ok:false` with a reason
    #[error("{0}")]
    Remote(String),

    /// The remote accepted a write without returning a stamp
    #[error("missing updatedAt")]
    MissingStamp,

    #[error("offline")]
    Offline,
}

/// A remote holding the shared document.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Fetch the current document and its version stamp.
    async fn get(&self) -> GetOutcome;

    /// Replace the document if the remote is still at `base_updated_at`.
    async fn set(&self, data: &Document, base_updated_at: Option<&str>) -> SetOutcome;
}

/// Transport used when no endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl RemoteTransport for Offline {
    async fn get(&self) -> GetOutcome {
        GetOutcome::Failed(TransportError::Offline)
    }

    async fn set(&self, _data: &Document, _base_updated_at: Option<&str>) -> SetOutcome {
        SetOutcome::Failed(TransportError::Offline)
    }
}
