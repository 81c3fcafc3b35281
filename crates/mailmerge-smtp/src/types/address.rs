//! Envelope address types.

use crate::error::{Error, Result};

/// Rejects any string containing CR or LF.
///
/// Every value interpolated into an SMTP command line goes through this
/// check so that a crafted address cannot smuggle extra commands.
///
/// # Errors
///
/// Returns [`Error::LineBreak`] if `line` contains `\r` or `\n`.
pub fn validate_line(line: &str) -> Result<()> {
    if line.contains(['\r', '\n']) {
        return Err(Error::LineBreak(line.to_string()));
    }
    Ok(())
}

/// Email address for SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address contains CR/LF or is not of the form
    /// `local@domain`.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        validate_line(&addr)?;
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("{addr:?} must contain @")));
        };
        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} has an empty local or domain part"
            )));
        }
        if domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} must have exactly one @"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything one SMTP transaction needs: reverse path, forward paths and
/// the message bytes.
///
/// An `Envelope` can only be built from addresses that passed
/// [`validate_line`], so holding one means no command injection is possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    from: Address,
    to: Vec<Address>,
    message: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope, validating every address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineBreak`] if any address contains CR/LF,
    /// [`Error::InvalidAddress`] if one is malformed or `to` is empty.
    pub fn new<I, T>(from: &str, to: I, message: impl Into<Vec<u8>>) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let from = Address::new(from)?;
        let to = to
            .into_iter()
            .map(|addr| Address::new(addr.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(Error::InvalidAddress("no recipients".into()));
        }
        Ok(Self {
            from,
            to,
            message: message.into(),
        })
    }

    /// Reverse path.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.from
    }

    /// Forward paths.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.to
    }

    /// Raw message (headers and body).
    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
