//! SMTP command builder.

use crate::types::{Address, AuthMechanism};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Base64 initial response (SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 challenge, or `*` to cancel the exchange
    AuthResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command as one CRLF-terminated line.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Helo { hostname } | Self::Ehlo { hostname } => {
                format!("{} {hostname}", self.verb())
            }
            Self::Auth {
                mechanism,
                initial_response: Some(initial),
            } => format!("AUTH {mechanism} {initial}"),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {mechanism}"),
            Self::AuthResponse(data) => data.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::StartTls | Self::Data | Self::Rset | Self::Quit => self.verb().to_string(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command verb, for logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH (response)",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }
}

/// Prepares a message for transmission after a 354 reply.
///
/// Bare LF and CRLF line endings both become CRLF, lines starting with `.`
/// get an extra leading `.`, and the `.` terminator line is appended. A
/// trailing line ending on the input does not produce an empty line.
#[must_use]
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 32 + 5);

    if !message.is_empty() {
        let body = message.strip_suffix(b"\n").unwrap_or(message);
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings() {
        let ehlo = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        let helo = Command::Helo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO localhost\r\n");
        assert_eq!(helo.serialize(), b"HELO localhost\r\n");
    }

    #[test]
    fn test_auth_login_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: Some("am9obg==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH LOGIN am9obg==\r\n");
    }

    #[test]
    fn test_auth_without_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN\r\n");
    }

    #[test]
    fn test_auth_cancel() {
        assert_eq!(Command::AuthResponse("*".into()).serialize(), b"*\r\n");
    }

    #[test]
    fn test_envelope_commands() {
        let from = Command::MailFrom {
            from: Address::new("sender@example.com").unwrap(),
        };
        let to = Command::RcptTo {
            to: Address::new("recipient@example.com").unwrap(),
        };
        assert_eq!(from.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
        assert_eq!(to.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
        assert_eq!(from.verb(), "MAIL FROM");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_data_normalises_line_endings() {
        assert_eq!(
            encode_data(b"Subject: hi\n\nline one\r\nline two"),
            b"Subject: hi\r\n\r\nline one\r\nline two\r\n.\r\n"
        );
    }

    #[test]
    fn test_data_trailing_newline_adds_no_blank_line() {
        assert_eq!(encode_data(b"Hi Ann\r\n"), b"Hi Ann\r\n.\r\n");
        assert_eq!(encode_data(b"Hi Ann\n"), b"Hi Ann\r\n.\r\n");
    }

    #[test]
    fn test_data_dot_stuffing() {
        assert_eq!(
            encode_data(b"top\n.\n..twice\nmid.dle"),
            b"top\r\n..\r\n...twice\r\nmid.dle\r\n.\r\n"
        );
    }

    #[test]
    fn test_data_empty_message() {
        assert_eq!(encode_data(b""), b".\r\n");
    }
}
