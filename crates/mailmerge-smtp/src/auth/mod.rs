//! SASL authentication strategies for the AUTH command.
//!
//! The session client drives the exchange; an [`Authenticator`] only decides
//! what to say. Base64 framing happens in the client, so strategies work on
//! decoded bytes.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::AuthMechanism;

/// Username and password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

// Keep the password out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"******")
            .finish()
    }
}

/// A server-driven SASL exchange.
///
/// [`start`](Authenticator::start) names the mechanism and optionally
/// supplies an initial response. [`next`](Authenticator::next) is then called
/// for every 334 challenge with `more == true`, and once with `more == false`
/// when the server accepts.
pub trait Authenticator: Send {
    /// Begins the exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the mechanism cannot be used.
    fn start(&mut self) -> Result<(AuthMechanism, Option<Vec<u8>>)>;

    /// Answers a decoded server challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not understood.
    fn next(&mut self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>>;
}

/// `AUTH LOGIN`: the server asks for `Username:` then `Password:`.
#[derive(Debug, Clone)]
pub struct LoginAuth {
    credentials: Credentials,
}

impl LoginAuth {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Authenticator for LoginAuth {
    fn start(&mut self) -> Result<(AuthMechanism, Option<Vec<u8>>)> {
        Ok((
            AuthMechanism::Login,
            Some(self.credentials.username.as_bytes().to_vec()),
        ))
    }

    fn next(&mut self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if !more {
            return Ok(None);
        }
        match challenge {
            b"Username:" => Ok(Some(self.credentials.username.as_bytes().to_vec())),
            b"Password:" => Ok(Some(self.credentials.password.as_bytes().to_vec())),
            other => Err(Error::UnknownChallenge(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

/// `AUTH PLAIN`: everything goes in the initial response.
#[derive(Debug, Clone)]
pub struct PlainAuth {
    credentials: Credentials,
}

impl PlainAuth {
    /// Creates the strategy.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Authenticator for PlainAuth {
    fn start(&mut self) -> Result<(AuthMechanism, Option<Vec<u8>>)> {
        let Credentials { username, password } = &self.credentials;
        Ok((
            AuthMechanism::Plain,
            Some(format!("\0{username}\0{password}").into_bytes()),
        ))
    }

    fn next(&mut self, challenge: &[u8], more: bool) -> Result<Option<Vec<u8>>> {
        if more {
            // The whole response was already sent; a further challenge is a
            // server the mechanism cannot satisfy.
            return Err(Error::UnknownChallenge(
                String::from_utf8_lossy(challenge).into_owned(),
            ));
        }
        Ok(None)
    }
}

/// Builds the strategy for a mechanism.
#[must_use]
pub fn authenticator(mechanism: AuthMechanism, credentials: Credentials) -> Box<dyn Authenticator> {
    match mechanism {
        AuthMechanism::Login => Box::new(LoginAuth::new(credentials)),
        AuthMechanism::Plain => Box::new(PlainAuth::new(credentials)),
    }
}
