//! Command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mailmerge_core::{DispatchConfig, MailerConfig, SessionSettings};
use mailmerge_smtp::{AuthMechanism, Credentials, Endpoint, Timeouts, TlsOptions};

/// Send one personalized email per CSV row over a single SMTP session
#[derive(Debug, Parser)]
#[command(name = "mailmerge")]
#[command(version)]
pub struct Cli {
    /// SMTP server host
    #[arg(long)]
    pub host: String,

    /// SMTP server port
    #[arg(long, default_value_t = 25)]
    pub port: u16,

    /// SMTP username; leave empty to skip authentication
    #[arg(long, default_value = "")]
    pub username: String,

    /// SMTP password
    #[arg(long, default_value = "")]
    pub password: String,

    /// CSV file with a `first_name,last_name,email` header row
    #[arg(short = 'f', long = "file")]
    pub recipients: PathBuf,

    /// Email template file
    #[arg(short = 't', long = "template")]
    pub template: PathBuf,

    /// From address, bare or as `Display Name <addr>`
    #[arg(long, default_value = "Test Person <test@example.com>")]
    pub sender: String,

    /// Subject line
    #[arg(long, default_value = "Test mail")]
    pub subject: String,

    /// URL made available to the template as `{{.Url}}`
    #[arg(long, default_value = "")]
    pub url: String,

    /// Use implicit TLS (typically port 465) instead of STARTTLS
    #[arg(long)]
    pub ssl: bool,

    /// Verify the server certificate
    #[arg(long)]
    pub verify_tls: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Delay between emails in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// TCP connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,

    /// Time limit for each SMTP exchange and mail transaction in seconds (0 disables)
    #[arg(long, default_value_t = 60)]
    pub transaction_timeout: u64,

    /// Name sent with EHLO/HELO
    #[arg(long, default_value = "localhost")]
    pub client_name: String,

    /// AUTH mechanism
    #[arg(long, value_enum, default_value_t = AuthArg::Login)]
    pub auth: AuthArg,
}

/// `--auth` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthArg {
    /// Two-step username/password prompts
    Login,
    /// Single-message credentials
    Plain,
}

impl From<AuthArg> for AuthMechanism {
    fn from(arg: AuthArg) -> Self {
        match arg {
            AuthArg::Login => Self::Login,
            AuthArg::Plain => Self::Plain,
        }
    }
}

impl Cli {
    /// Builds the run configuration.
    pub fn to_config(&self) -> MailerConfig {
        let endpoint = Endpoint::new(self.host.clone())
            .port(self.port)
            .implicit_tls(self.ssl);

        let tls = if self.verify_tls {
            TlsOptions::verified()
        } else {
            TlsOptions::default()
        };

        let timeouts = Timeouts {
            connect: Duration::from_secs(self.connect_timeout),
            transaction: (self.transaction_timeout > 0)
                .then(|| Duration::from_secs(self.transaction_timeout)),
        };

        let credentials = (!self.username.is_empty())
            .then(|| Credentials::new(self.username.clone(), self.password.clone()));

        MailerConfig {
            endpoint,
            session: SessionSettings {
                client_name: self.client_name.clone(),
                tls,
                timeouts,
                credentials,
                auth_mechanism: self.auth.into(),
            },
            dispatch: DispatchConfig {
                sender: self.sender.clone(),
                subject: self.subject.clone(),
                url: self.url.clone(),
                delay: Duration::from_millis(self.delay),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 7] = [
        "mailmerge",
        "--host",
        "mx.example.com",
        "-f",
        "people.csv",
        "-t",
        "mail.tmpl",
    ];

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        let config = cli.to_config();

        assert_eq!(config.endpoint.address(), "mx.example.com:25");
        assert!(!config.endpoint.implicit_tls);
        assert!(config.session.tls.accept_invalid_certs);
        assert!(config.session.credentials.is_none());
        assert_eq!(config.session.auth_mechanism, AuthMechanism::Login);
        assert_eq!(config.session.client_name, "localhost");
        assert_eq!(config.session.timeouts.connect, Duration::from_secs(10));
        assert_eq!(
            config.session.timeouts.transaction,
            Some(Duration::from_secs(60))
        );
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(cli.recipients, PathBuf::from("people.csv"));
        assert_eq!(cli.template, PathBuf::from("mail.tmpl"));
    }

    #[test]
    fn all_flags() {
        let args = REQUIRED.into_iter().chain([
            "--port",
            "465",
            "--username",
            "john",
            "--password",
            "hunter2",
            "--sender",
            "Ops <ops@corp.example>",
            "--subject",
            "Reset",
            "--url",
            "https://t.example/1",
            "--ssl",
            "--verify-tls",
            "--debug",
            "--delay",
            "250",
            "--transaction-timeout",
            "0",
            "--auth",
            "plain",
        ]);
        let cli = Cli::try_parse_from(args).unwrap();
        let config = cli.to_config();

        assert!(cli.debug);
        assert!(config.endpoint.implicit_tls);
        assert_eq!(config.endpoint.port, 465);
        assert!(!config.session.tls.accept_invalid_certs);
        assert_eq!(
            config.session.credentials.as_ref().map(Credentials::username),
            Some("john")
        );
        assert_eq!(config.session.auth_mechanism, AuthMechanism::Plain);
        assert_eq!(config.session.timeouts.transaction, None);
        assert_eq!(config.dispatch.delay, Duration::from_millis(250));
        assert_eq!(config.dispatch.sender, "Ops <ops@corp.example>");
    }

    #[test]
    fn host_and_inputs_are_required() {
        assert!(Cli::try_parse_from(["mailmerge", "-f", "a.csv", "-t", "b"]).is_err());
        assert!(Cli::try_parse_from(["mailmerge", "--host", "h", "-t", "b"]).is_err());
    }

    #[test]
    fn rejects_unknown_auth() {
        let args = REQUIRED.into_iter().chain(["--auth", "cram-md5"]);
        assert!(Cli::try_parse_from(args).is_err());
    }
}
