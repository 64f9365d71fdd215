// ABOUTME: Error types for remote target connections and sessions.
// ABOUTME: Separates trust violations from transient network failures.

use super::known_hosts::KnownHostsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid remote target: {0}")]
    Config(String),

    #[error("failed to read private key {}: {source}", path.display())]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse private key {}: {source}", path.display())]
    KeyParse {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    #[error("failed to load known hosts from {}: {source}", path.display())]
    HostRegistry {
        path: PathBuf,
        #[source]
        source: KnownHostsError,
    },

    #[error("failed to connect to {address}: {failure}")]
    Connection {
        address: String,
        #[source]
        failure: ConnectFailure,
    },

    #[error("failed to create session on {target}: {source}")]
    Session {
        target: String,
        #[source]
        source: russh::Error,
    },

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("command execution failed: {0}")]
    Exec(#[source] russh::Error),

    #[error("channel closed unexpectedly without exit status")]
    ChannelClosed,

    #[error("failed to disconnect from {target}: {source}")]
    Disconnect {
        target: String,
        #[source]
        source: russh::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the remote host could not be trusted.
    pub fn is_trust_violation(&self) -> bool {
        matches!(self, Error::Connection { failure, .. } if failure.is_trust_violation())
    }

    /// True for failures a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection { failure, .. } if failure.is_transient())
    }
}

/// Why a connection attempt failed.
#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error("network error: {0}")]
    Network(#[source] std::io::Error),

    #[error("host key is not present in {}", registry.display())]
    UnknownHostKey { registry: PathBuf },

    #[error("host key does not match {} line {line}", registry.display())]
    HostKeyMismatch { registry: PathBuf, line: usize },

    #[error("host key is revoked by {} line {line}", registry.display())]
    RevokedHostKey { registry: PathBuf, line: usize },

    #[error("authentication rejected for user {user:?}")]
    AuthenticationRejected { user: String },

    #[error("SSH protocol error: {0}")]
    Protocol(#[source] russh::Error),
}

impl ConnectFailure {
    pub fn is_trust_violation(&self) -> bool {
        matches!(
            self,
            ConnectFailure::UnknownHostKey { .. }
                | ConnectFailure::HostKeyMismatch { .. }
                | ConnectFailure::RevokedHostKey { .. }
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectFailure::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
