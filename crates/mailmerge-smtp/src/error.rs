//! Error types for SMTP operations.

use std::io;
use std::time::Duration;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name or IP address for TLS.
    #[error("Invalid server name: {0}")]
    InvalidServerName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// TCP connect did not complete in time.
    #[error("Connection to {address} timed out after {timeout:?}")]
    ConnectTimeout {
        /// `host:port` that was dialed.
        address: String,
        /// Configured connect timeout.
        timeout: Duration,
    },

    /// TCP connect failed (refused, unreachable, DNS failure).
    #[error("Connection to {address} failed: {source}")]
    ConnectRefused {
        /// `host:port` that was dialed.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// An operation on an established session exceeded its time budget.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The auth mechanism received a challenge it does not know how to answer.
    #[error("Unknown authentication challenge from server: {0:?}")]
    UnknownChallenge(String),

    /// A command argument contains CR or LF.
    #[error("A line must not contain CR or LF: {0:?}")]
    LineBreak(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Message too large.
    #[error("Message exceeds size limit: {0} bytes")]
    MessageTooLarge(usize),

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the connection can no longer be trusted to be in sync
    /// with the server after this error.
    #[must_use]
    pub const fn breaks_session(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::Timeout(_) | Self::Protocol(_)
        )
    }
}
