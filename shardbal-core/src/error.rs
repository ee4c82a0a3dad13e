//! Error types for shardbal
//!
//! Every failure a balancer command can run into is expressed as a
//! `BalancerError`. The error is `Clone` because a single outcome is
//! observed by every waiter on a response handle.

use std::fmt;
use thiserror::Error;

/// Result type alias for shardbal operations
pub type Result<T> = std::result::Result<T, BalancerError>;

/// Status codes reported by the remote-command transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorCode {
    NetworkTimeout,
    HostUnreachable,
    ConnectionReset,
    ExceededTimeLimit,
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorCode::NetworkTimeout => "NetworkTimeout",
            TransportErrorCode::HostUnreachable => "HostUnreachable",
            TransportErrorCode::ConnectionReset => "ConnectionReset",
            TransportErrorCode::ExceededTimeLimit => "ExceededTimeLimit",
        };
        f.write_str(name)
    }
}

/// A transport-level failure, surfaced verbatim to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: TransportErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn network_timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorCode::NetworkTimeout, message)
    }
}

/// Coarse classification of a `BalancerError`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Rejected,
    Canceled,
    LockBusy,
    ShardNotFound,
    Transport,
    RemoteCommand,
    Storage,
    Serialization,
    MalformedReply,
    InvalidArgument,
    PayloadAbsent,
    Internal,
}

/// Unified error type for shardbal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalancerError {
    // ===== Scheduler Lifecycle =====
    #[error("Request rejected - balancer scheduler is stopped")]
    Rejected,

    #[error("Request cancelled - balancer scheduler is stopping")]
    Canceled,

    // ===== Locking & Targeting =====
    #[error("Failed to acquire dist lock {0} locally")]
    LockBusy(String),

    #[error("Shard {0} not found")]
    ShardNotFound(String),

    // ===== Remote Execution =====
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{code_name} ({code}): {message}")]
    RemoteCommand {
        code: i64,
        code_name: String,
        message: String,
    },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    // ===== Persistence =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Arguments =====
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    // ===== Response Access =====
    #[error("Payload absent: {0}")]
    PayloadAbsent(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BalancerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BalancerError::Rejected => ErrorKind::Rejected,
            BalancerError::Canceled => ErrorKind::Canceled,
            BalancerError::LockBusy(_) => ErrorKind::LockBusy,
            BalancerError::ShardNotFound(_) => ErrorKind::ShardNotFound,
            BalancerError::Transport(_) => ErrorKind::Transport,
            BalancerError::RemoteCommand { .. } => ErrorKind::RemoteCommand,
            BalancerError::MalformedReply(_) => ErrorKind::MalformedReply,
            BalancerError::Storage(_) => ErrorKind::Storage,
            BalancerError::Serialization(_) => ErrorKind::Serialization,
            BalancerError::InvalidNamespace(_) | BalancerError::InvalidHost(_) => {
                ErrorKind::InvalidArgument
            }
            BalancerError::PayloadAbsent(_) => ErrorKind::PayloadAbsent,
            BalancerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<bincode::Error> for BalancerError {
    fn from(err: bincode::Error) -> Self {
        BalancerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BalancerError {
    fn from(err: serde_json::Error) -> Self {
        BalancerError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for BalancerError {
    fn from(err: std::io::Error) -> Self {
        BalancerError::Storage(err.to_string())
    }
}
