//! Connection configuration types.

use std::time::Duration;

/// Where to connect and how to secure the first bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Start TLS immediately instead of upgrading with STARTTLS (port 465).
    pub implicit_tls: bool,
}

impl Endpoint {
    /// Creates a plaintext endpoint on port 25.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 25,
            implicit_tls: false,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Requests implicit TLS.
    #[must_use]
    pub const fn implicit_tls(mut self, implicit_tls: bool) -> Self {
        self.implicit_tls = implicit_tls;
        self
    }

    /// `host:port` as passed to the resolver.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TLS client settings shared by implicit TLS and STARTTLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsOptions {
    /// Accept any server certificate.
    ///
    /// Defaults to `true`: bulk sends usually target relays with self-signed
    /// or mismatched certificates. Set to `false` to verify against the
    /// bundled webpki roots.
    pub accept_invalid_certs: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
        }
    }
}

impl TlsOptions {
    /// Settings that verify the server certificate chain and name.
    #[must_use]
    pub const fn verified() -> Self {
        Self {
            accept_invalid_certs: false,
        }
    }
}

/// Time budgets for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Budget for the TCP connect.
    pub connect: Duration,
    /// Budget for each command exchange and for each whole mail
    /// transaction. `None` waits forever.
    pub transaction: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            transaction: Some(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builder() {
        let endpoint = Endpoint::new("smtp.example.com").port(465).implicit_tls(true);
        assert_eq!(endpoint.address(), "smtp.example.com:465");
        assert!(endpoint.implicit_tls);
        assert_eq!(Endpoint::new("mx").port, 25);
    }

    #[test]
    fn tls_skips_verification_unless_asked() {
        assert!(TlsOptions::default().accept_invalid_certs);
        assert!(!TlsOptions::verified().accept_invalid_certs);
    }

    #[test]
    fn default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.connect, Duration::from_secs(10));
        assert_eq!(timeouts.transaction, Some(Duration::from_secs(60)));
    }
}
