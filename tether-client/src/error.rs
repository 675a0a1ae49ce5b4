//! Error types for tether-client.
//!
//! Remote-call failures never surface through these enums; the retry layer
//! absorbs them into outcomes and terminal statuses. These cover local
//! concerns only: transport plumbing, settings persistence, and the
//! orchestrator's entry-point guards.

use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failure talking to the control channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The client process is not reachable at all.
    #[error("control channel not connected (socket missing: {socket})")]
    Disconnected { socket: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel protocol error: {0}")]
    Protocol(String),
}

impl ChannelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChannelError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure reading or writing the last-used-credentials settings file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Refusal at an orchestrator entry point. Both variants leave all state
/// untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// A configuration batch is still running; selection is single-flight.
    #[error("a project configuration batch is still running")]
    BatchInFlight,

    /// The control channel is down; refusing to start a background batch.
    #[error("control channel not connected")]
    Disconnected,
}
