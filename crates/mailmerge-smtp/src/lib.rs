//! # mailmerge-smtp
//!
//! SMTP client session layer for sending many messages over one connection.
//!
//! ## Features
//!
//! - **Timed connect**: one TCP socket per run, optional implicit TLS
//! - **STARTTLS**: in-band upgrade with EHLO re-negotiation
//! - **Pluggable AUTH**: [`Authenticator`] strategies, LOGIN and PLAIN included
//! - **Long-lived sessions**: a rejected transaction is reset and the next
//!   one runs on the same connection
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use mailmerge_smtp::{Client, Credentials, Endpoint, Envelope, LoginAuth, TlsOptions};
//! use mailmerge_smtp::connection::connect;
//!
//! #[tokio::main]
//! async fn main() -> mailmerge_smtp::Result<()> {
//!     let endpoint = Endpoint::new("smtp.example.com").port(587);
//!     let stream = connect(&endpoint, Duration::from_secs(10), TlsOptions::default()).await?;
//!     let mut client = Client::from_stream(stream, Some(Duration::from_secs(60))).await?;
//!
//!     client.hello("localhost").await?;
//!     client.starttls("smtp.example.com", TlsOptions::default(), "localhost").await?;
//!     client
//!         .authenticate(&mut LoginAuth::new(Credentials::new("user", "secret")))
//!         .await?;
//!
//!     let envelope = Envelope::new(
//!         "sender@example.com",
//!         ["recipient@example.com"],
//!         "Subject: Test\r\n\r\nHello, World!\r\n",
//!     )?;
//!     client.send(&envelope).await?;
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected ── hello() ──→ Greeted ── starttls()/authenticate() ──→ Ready
//!                                                                     │
//!            ┌──────────────────────── send() ────────────────────────┤
//!            ↓                                                        │
//!   MailFrom → RcptAccepted → DataSent ── reply / RSET ───────────────┘
//!
//! any state ── quit() ──→ Closed        I/O error or timeout ──→ Broken
//! ```
//!
//! ## Modules
//!
//! - [`auth`]: SASL strategies
//! - [`command`]: SMTP command builders and DATA encoding
//! - [`connection`]: Transport, configuration and session client
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, envelopes, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use auth::{Authenticator, Credentials, LoginAuth, PlainAuth};
pub use connection::{
    Client, Endpoint, ServerInfo, SessionState, SmtpStream, Timeouts, TlsOptions, Transport,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode};
