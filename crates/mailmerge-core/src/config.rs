//! Run configuration.

use std::time::Duration;

use mailmerge_smtp::{AuthMechanism, Credentials, Endpoint, Timeouts, TlsOptions};

/// Format of the `Date` merge field, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Everything one run needs besides the recipients and the template.
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// SMTP server to deliver to.
    pub endpoint: Endpoint,
    /// How the session is set up.
    pub session: SessionSettings,
    /// How the batch is sent.
    pub dispatch: DispatchConfig,
}

/// SMTP session setup parameters.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Name sent with EHLO/HELO.
    pub client_name: String,
    /// TLS client settings for implicit TLS and STARTTLS.
    pub tls: TlsOptions,
    /// Connect and per-transaction time budgets.
    pub timeouts: Timeouts,
    /// Credentials; `None` skips AUTH.
    pub credentials: Option<Credentials>,
    /// Mechanism used when credentials are present.
    pub auth_mechanism: AuthMechanism,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            client_name: "localhost".to_string(),
            tls: TlsOptions::default(),
            timeouts: Timeouts::default(),
            credentials: None,
            auth_mechanism: AuthMechanism::Login,
        }
    }
}

/// Batch parameters shared by every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Sender, either a bare address or `Display Name <addr>`.
    pub sender: String,
    /// `Subject` merge field.
    pub subject: String,
    /// `Url` merge field.
    pub url: String,
    /// Pause after every transaction, successful or not.
    pub delay: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            sender: "Test Person <test@example.com>".to_string(),
            subject: "Test mail".to_string(),
            url: String::new(),
            delay: Duration::ZERO,
        }
    }
}
