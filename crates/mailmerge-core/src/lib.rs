//! # mailmerge-core
//!
//! Mail-merge engine for `mailmerge`.
//!
//! This crate provides:
//! - Recipient list loading (CSV)
//! - Message templates with per-recipient merge fields
//! - SMTP session setup (STARTTLS, AUTH)
//! - The batch dispatcher and its outcome report
//!
//! A run opens exactly one SMTP session, sends one message per recipient over
//! it and always closes it, whether the batch finished or failed part way.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod dispatcher;
mod error;
pub mod recipient;
pub mod session;
pub mod template;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use mailmerge_smtp::connection::connect;
use mailmerge_smtp::{Client, Transport};

pub use config::{DATE_FORMAT, DispatchConfig, MailerConfig, SessionSettings};
pub use dispatcher::{BatchReport, Dispatcher, extract_address};
pub use error::{Error, Result, TemplateError};
pub use recipient::{BatchFields, MergeFields, Recipient, load_recipients, read_recipients};
pub use template::{Context, Template};

/// Connects to the configured server and delivers the batch.
///
/// # Errors
///
/// Returns an error if the connection, STARTTLS or AUTH fails, or if a
/// message cannot be rendered. Per-recipient delivery failures are counted
/// in the report instead.
pub async fn run(
    config: &MailerConfig,
    recipients: &[Recipient],
    template: &Template,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<BatchReport> {
    tracing::info!(
        host = %config.endpoint.host,
        port = config.endpoint.port,
        implicit_tls = config.endpoint.implicit_tls,
        "Attempting to connect to SMTP server"
    );
    let stream = connect(
        &config.endpoint,
        config.session.timeouts.connect,
        config.session.tls,
    )
    .await?;
    deliver(stream, config, recipients, template, cancel).await
}

/// Delivers the batch over an already connected stream.
///
/// Reads the greeting, sets up the session, sends every message and then
/// closes the session. QUIT is attempted exactly once whatever happened
/// after the greeting; a failed QUIT is only logged.
///
/// # Errors
///
/// As for [`run`], minus connection failures.
pub async fn deliver<S: Transport>(
    stream: S,
    config: &MailerConfig,
    recipients: &[Recipient],
    template: &Template,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<BatchReport> {
    let mut client = Client::from_stream(stream, config.session.timeouts.transaction).await?;
    tracing::debug!(server = %client.server_info().hostname, "connected");

    let outcome = async {
        session::establish(&mut client, &config.endpoint, &config.session).await?;
        let mut dispatcher = Dispatcher::new(template, &config.dispatch);
        if let Some(flag) = cancel {
            dispatcher = dispatcher.cancel_on(flag);
        }
        dispatcher.run(&mut client, recipients).await
    }
    .await;

    if let Err(err) = client.quit().await {
        tracing::warn!(error = %err, "QUIT failed");
    }
    outcome
}
