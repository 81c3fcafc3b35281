//! `mailmerge` - bulk personalized email over a single SMTP session
//!
//! Reads recipients from CSV, renders the template once per row and sends
//! every message through one connection to the configured server.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use clap::Parser;
use mailmerge_core::{Template, load_recipients};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.debug {
        "mailmerge=debug,mailmerge_core=debug,mailmerge_smtp=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = cli.to_config();

    let recipients = load_recipients(&cli.recipients)
        .with_context(|| format!("loading recipients from {}", cli.recipients.display()))?;
    let template = Template::load(&cli.template)
        .with_context(|| format!("loading template from {}", cli.template.display()))?;
    info!(
        recipients = recipients.len(),
        sender = %config.dispatch.sender,
        "Loaded recipients and template"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current email");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let report = mailmerge_core::run(&config, &recipients, &template, Some(cancel))
        .await
        .with_context(|| format!("mail merge via {} failed", config.endpoint.address()))?;

    info!("{report}");
    Ok(())
}
