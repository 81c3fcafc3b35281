//! Stateful SMTP session client.
//!
//! One [`Client`] owns one connection for its whole life. Setup steps
//! (greeting, EHLO, STARTTLS, AUTH) run once; [`Client::send`] then runs any
//! number of mail transactions on the same connection. A failed transaction
//! leaves the session ready for the next one unless the failure desynced the
//! connection, in which case the session is marked broken and every later
//! call fails without touching the network.

use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::config::TlsOptions;
use super::stream::Transport;
use super::ServerInfo;
use crate::auth::Authenticator;
use crate::command::{Command, encode_data};
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Envelope, Extension, Reply, ReplyCode};

/// Where the session is in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeting received, no EHLO/HELO accepted yet.
    Connected,
    /// EHLO or HELO accepted.
    Greeted,
    /// Authenticated, or a transaction has completed; ready for MAIL.
    Ready,
    /// MAIL FROM accepted.
    MailFrom,
    /// At least one RCPT TO accepted.
    RcptAccepted,
    /// DATA accepted and the message is being transferred.
    DataSent,
    /// An I/O error, timeout or garbled reply left the connection unusable.
    Broken,
    /// QUIT sent and the connection shut down.
    Closed,
}

impl SessionState {
    const fn is_idle(self) -> bool {
        matches!(self, Self::Connected | Self::Greeted | Self::Ready)
    }
}

/// SMTP session over a stream.
pub struct Client<S> {
    stream: Option<BufReader<S>>,
    server_info: ServerInfo,
    state: SessionState,
    authenticated: bool,
    timeout: Option<Duration>,
}

// Manual Debug implementation since the stream is not required to be Debug
impl<S> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_info", &self.server_info)
            .field("state", &self.state)
            .field("authenticated", &self.authenticated)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S> Client<S> {
    /// Returns the server information.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns the current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true once AUTH has succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn ensure_idle(&self, operation: &str) -> Result<()> {
        match self.state {
            state if state.is_idle() => Ok(()),
            SessionState::Broken => Err(Error::InvalidState(format!(
                "cannot {operation}: session broken by an earlier error"
            ))),
            SessionState::Closed => Err(Error::InvalidState(format!(
                "cannot {operation}: session closed"
            ))),
            state => Err(Error::InvalidState(format!(
                "cannot {operation} while in {state:?}"
            ))),
        }
    }

    /// Marks the session broken if `result` carries an error that leaves the
    /// connection out of sync.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.breaks_session() && self.state != SessionState::Closed {
                tracing::warn!(error = %err, "SMTP session is no longer usable");
                self.state = SessionState::Broken;
            }
        }
        result
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream and reads the 220 greeting.
    ///
    /// `timeout` bounds every later command exchange and every whole mail
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting cannot be read or is not a 220.
    pub async fn from_stream(stream: S, timeout: Option<Duration>) -> Result<Self> {
        let mut client = Self {
            stream: Some(BufReader::new(stream)),
            server_info: ServerInfo::default(),
            state: SessionState::Connected,
            authenticated: false,
            timeout,
        };

        let greeting = within(timeout, client.read_reply())
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;

        // Extract hostname from greeting (first word after code)
        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        tracing::debug!(server = %client.server_info.hostname, "received SMTP greeting");

        Ok(client)
    }

    /// Identifies the client with EHLO, falling back to HELO if the server
    /// rejects EHLO, and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if both EHLO and HELO are rejected or the exchange
    /// fails.
    pub async fn hello(&mut self, client_name: &str) -> Result<()> {
        let limit = self.timeout;
        let result = within(limit, self.hello_exchange(client_name)).await;
        self.track(result)
    }

    async fn hello_exchange(&mut self, client_name: &str) -> Result<()> {
        self.ensure_idle("EHLO")?;
        crate::types::validate_line(client_name)?;

        let reply = self
            .exchange(Command::Ehlo {
                hostname: client_name.to_string(),
            })
            .await?;

        if reply.is_success() {
            // Skip first line which is the server's greeting
            self.server_info.extensions = reply
                .message
                .iter()
                .skip(1)
                .map(|line| Extension::parse(line))
                .collect();
        } else {
            tracing::debug!(code = %reply.code, "EHLO rejected, falling back to HELO");
            self.exchange(Command::Helo {
                hostname: client_name.to_string(),
            })
            .await?
            .expect_success()?;
            self.server_info.extensions.clear();
        }

        if self.state == SessionState::Connected {
            self.state = SessionState::Greeted;
        }
        Ok(())
    }

    /// Authenticates with the given strategy.
    ///
    /// 334 challenges are base64-decoded before they reach the strategy and
    /// its answers are base64-encoded on the way out. If the strategy fails
    /// on a challenge, the exchange is cancelled with `*` and the strategy's
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection, the strategy's error, or an I/O error.
    pub async fn authenticate(&mut self, auth: &mut dyn Authenticator) -> Result<()> {
        let limit = self.timeout;
        let result = within(limit, self.auth_exchange(auth)).await;
        self.track(result)
    }

    async fn auth_exchange(&mut self, auth: &mut dyn Authenticator) -> Result<()> {
        self.ensure_idle("AUTH")?;
        if self.authenticated {
            return Err(Error::InvalidState("already authenticated".into()));
        }

        let (mechanism, initial) = auth.start()?;
        let advertised = self.server_info.auth_mechanisms();
        if !advertised.is_empty() && !advertised.contains(&mechanism) {
            tracing::warn!(%mechanism, ?advertised, "server did not advertise this AUTH mechanism");
        }

        let initial_response = initial.map(|bytes| encode_sasl(&bytes));
        let mut reply = self
            .exchange(Command::Auth {
                mechanism,
                initial_response,
            })
            .await?;

        loop {
            match reply.code {
                ReplyCode::AUTH_SUCCESS => {
                    auth.next(reply.message_text().as_bytes(), false)?;
                    break;
                }
                ReplyCode::AUTH_CONTINUE => {
                    let challenge = STANDARD
                        .decode(reply.message_text().trim())
                        .map_err(|e| Error::Protocol(format!("Invalid base64 challenge: {e}")))?;
                    match auth.next(&challenge, true) {
                        Ok(answer) => {
                            let data = encode_sasl(&answer.unwrap_or_default());
                            reply = self.exchange(Command::AuthResponse(data)).await?;
                        }
                        Err(err) => {
                            if let Err(cancel) =
                                self.exchange(Command::AuthResponse("*".into())).await
                            {
                                tracing::debug!(error = %cancel, "AUTH cancel failed");
                            }
                            return Err(err);
                        }
                    }
                }
                _ => return Err(reply.into_error()),
            }
        }

        self.authenticated = true;
        self.state = SessionState::Ready;
        tracing::debug!(%mechanism, "authenticated");
        Ok(())
    }

    /// Runs one mail transaction: MAIL FROM, one RCPT TO per recipient,
    /// DATA, message, terminator.
    ///
    /// On a rejected MAIL/RCPT/DATA the transaction is reset with RSET so the
    /// session is ready for the next envelope.
    ///
    /// # Errors
    ///
    /// Returns the first rejection or failure. The session stays usable
    /// unless [`Error::breaks_session`] is true for the error.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.ensure_idle("MAIL FROM")?;

        if let Some(limit) = self.server_info.max_message_size() {
            if envelope.message().len() > limit {
                return Err(Error::MessageTooLarge(envelope.message().len()));
            }
        }

        let limit = self.timeout;
        let result = within(limit, self.transaction(envelope)).await;
        let result = self.track(result);

        if result.is_err() && matches!(
            self.state,
            SessionState::MailFrom | SessionState::RcptAccepted
        ) {
            self.reset().await;
        } else if self.state != SessionState::Broken {
            self.state = SessionState::Ready;
        }
        result
    }

    async fn transaction(&mut self, envelope: &Envelope) -> Result<()> {
        self.exchange(Command::MailFrom {
            from: envelope.sender().clone(),
        })
        .await?
        .expect_success()?;
        self.state = SessionState::MailFrom;

        for to in envelope.recipients() {
            self.exchange(Command::RcptTo { to: to.clone() })
                .await?
                .expect_success()?;
            self.state = SessionState::RcptAccepted;
        }

        self.exchange(Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;
        self.state = SessionState::DataSent;

        self.write_all(&encode_data(envelope.message())).await?;
        self.read_reply().await?.expect_success()?;
        Ok(())
    }

    /// Aborts a half-finished transaction so the next MAIL starts clean.
    async fn reset(&mut self) {
        let limit = self.timeout;
        let result = within(limit, async {
            self.exchange(Command::Rset).await?.expect_success()
        })
        .await;
        match result {
            Ok(_) => self.state = SessionState::Ready,
            Err(err) => {
                tracing::warn!(error = %err, "RSET failed");
                self.state = SessionState::Broken;
            }
        }
    }

    /// Sends QUIT and shuts the connection down.
    ///
    /// The connection is closed whatever the server answers. Calling this
    /// again after the session is closed does nothing. A broken session is
    /// shut down without sending QUIT.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT is rejected or the exchange fails.
    pub async fn quit(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }

        let result = if self.state == SessionState::Broken {
            Ok(())
        } else {
            let limit = self.timeout;
            within(limit, async {
                let reply = self.exchange(Command::Quit).await?;
                if reply.is_success() || reply.code == ReplyCode::CLOSING {
                    Ok(())
                } else {
                    Err(reply.into_error())
                }
            })
            .await
        };

        if let Some(mut reader) = self.stream.take() {
            if let Err(err) = reader.get_mut().shutdown().await {
                tracing::debug!(error = %err, "shutdown after QUIT failed");
            }
        }
        self.state = SessionState::Closed;
        tracing::debug!("SMTP session closed");
        result
    }

    async fn exchange(&mut self, cmd: Command) -> Result<Reply> {
        tracing::trace!(command = cmd.verb(), "C:");
        self.write_all(&cmd.serialize()).await?;
        let reply = self.read_reply().await?;
        tracing::trace!(command = cmd.verb(), code = %reply.code, "S: {}", reply.message_text());
        Ok(reply)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.reader()?.get_mut();
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let reader = self.reader()?;
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Err(Error::Protocol("Connection closed by server".into()));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(line);
            lines.push(line.to_string());

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }

    fn reader(&mut self) -> Result<&mut BufReader<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| Error::InvalidState("connection closed".into()))
    }
}

impl<S> Client<S>
where
    S: Transport,
{
    /// Upgrades the connection with STARTTLS and repeats EHLO over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake
    /// fails. A failed handshake leaves the session broken.
    pub async fn starttls(&mut self, host: &str, tls: TlsOptions, client_name: &str) -> Result<()> {
        let limit = self.timeout;
        let result = within(limit, self.starttls_exchange(host, tls, client_name)).await;
        self.track(result)
    }

    async fn starttls_exchange(&mut self, host: &str, tls: TlsOptions, client_name: &str) -> Result<()> {
        self.ensure_idle("STARTTLS")?;
        if self.reader()?.get_ref().is_tls() {
            return Err(Error::InvalidState("Stream is already TLS".into()));
        }
        if !self.server_info.supports_starttls() {
            tracing::debug!("server did not advertise STARTTLS, trying anyway");
        }

        self.exchange(Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;

        let reader = self
            .stream
            .take()
            .ok_or_else(|| Error::InvalidState("connection closed".into()))?;
        let upgraded = reader.into_inner().upgrade_to_tls(host, tls).await;
        let upgraded = match upgraded {
            Ok(stream) => stream,
            Err(err) => {
                // The socket went down with the failed handshake.
                self.state = SessionState::Closed;
                return Err(err);
            }
        };
        self.stream = Some(BufReader::new(upgraded));
        tracing::debug!(%host, "STARTTLS handshake complete");

        // Capabilities must be rediscovered over the encrypted channel
        self.hello_exchange(client_name).await
    }
}

fn encode_sasl(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        // RFC 4954: a zero-length response is sent as "="
        "=".to_string()
    } else {
        STANDARD.encode(bytes)
    }
}

async fn within<T>(limit: Option<Duration>, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}
