//! SMTP connection management.

mod client;
mod config;
mod stream;

pub use client::{Client, SessionState};
pub use config::{Endpoint, Timeouts, TlsOptions};
pub use stream::{SmtpStream, Transport, connect, create_tls_connector};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from the greeting and EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions. Empty after a HELO fallback.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if the server advertised one.
    ///
    /// `SIZE 0` means no fixed maximum (RFC 1870) and yields `None`.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Size(size) => *size,
                _ => None,
            })
            .filter(|&limit| limit > 0)
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
