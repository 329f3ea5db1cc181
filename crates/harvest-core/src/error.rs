//! Error taxonomy for the collection pipeline.
//!
//! Per-member discovery failures are not represented here: they are recorded
//! as [`crate::collect::SkippedMember`] entries and the run continues.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::CallError;

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network, timeout, 5xx or rate-limit failure that survived every retry.
    #[error("{endpoint}: transient failure after {attempts} attempts: {cause}")]
    Transient {
        endpoint: String,
        attempts: u32,
        cause: CallError,
    },

    #[error("{endpoint}: permission denied (HTTP {status}): {body}")]
    PermissionDenied {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Non-transient client error other than auth (404, 400, ...).
    #[error("{endpoint}: request rejected (HTTP {status}): {body}")]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{endpoint}: unexpected response shape: {reason}")]
    Decode { endpoint: String, reason: String },

    /// A chat archive stopped because a page fetch failed. The partial
    /// archive has already been persisted with `truncated = true`.
    #[error("archive of chat {chat_id} incomplete after {fetched} messages: {source}")]
    ArchiveIncomplete {
        chat_id: String,
        fetched: usize,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("checkpoint {path:?} is corrupt: {reason}")]
    ResumeStateCorrupt { path: PathBuf, reason: String },

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("endpoint {endpoint} requires parameter {param}")]
    MissingParameter { endpoint: String, param: String },

    #[error("endpoint {endpoint} does not accept parameter {param}")]
    UnexpectedParameter { endpoint: String, param: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this failure invalidates every subsequent request of the run
    /// (an unauthenticated token), as opposed to a single entity.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::PermissionDenied { status: 401, .. })
    }

    /// Attempts spent before giving up, where meaningful.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transient { attempts, .. } => *attempts,
            Self::PermissionDenied { .. } | Self::Rejected { .. } | Self::Decode { .. } => 1,
            Self::ArchiveIncomplete { source, .. } => source.attempts(),
            _ => 0,
        }
    }
}
