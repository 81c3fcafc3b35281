//! Batch delivery over one SMTP session.

use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use mailmerge_smtp::{Client, Envelope};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{DATE_FORMAT, DispatchConfig};
use crate::error::Result;
use crate::recipient::{BatchFields, MergeFields, Recipient};
use crate::template::Template;

/// Bytes of each rendered message shown at debug level.
const PREVIEW_LEN: usize = 300;

#[allow(clippy::expect_used)] // constant pattern
static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.*@.*)>").expect("address pattern is valid"));

/// Returns the address inside the first `<...@...>` group of `sender`, or
/// `sender` unchanged when there is none.
///
/// ```
/// use mailmerge_core::dispatcher::extract_address;
///
/// assert_eq!(extract_address("Test Person <test@example.com>"), "test@example.com");
/// assert_eq!(extract_address("plain@example.com"), "plain@example.com");
/// ```
#[must_use]
pub fn extract_address(sender: &str) -> &str {
    ANGLE_ADDRESS
        .captures(sender)
        .and_then(|caps| caps.get(1))
        .map_or(sender, |m| m.as_str())
}

/// Outcome counters of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages accepted by the server.
    pub sent: usize,
    /// Messages that failed for any reason.
    pub failed: usize,
    /// Whether the batch stopped early on request.
    pub cancelled: bool,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - Emails sent successfully\n ({} errors)",
            self.sent, self.failed
        )
    }
}

/// Sends one rendered message per recipient over an established session.
#[derive(Debug)]
pub struct Dispatcher<'a> {
    template: &'a Template,
    config: &'a DispatchConfig,
    date: String,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Dispatcher<'a> {
    /// Creates a dispatcher. The `Date` field is fixed to the current local
    /// time.
    #[must_use]
    pub fn new(template: &'a Template, config: &'a DispatchConfig) -> Self {
        Self {
            template,
            config,
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
            cancel: None,
        }
    }

    /// Overrides the `Date` field.
    #[must_use]
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    /// Stops the batch before the next recipient once `flag` is set.
    #[must_use]
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Delivers to every recipient in order.
    ///
    /// A recipient whose envelope is invalid or whose transaction fails is
    /// counted in [`BatchReport::failed`] and the batch moves on. The
    /// configured delay follows every attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Template`](crate::Error::Template) if a message
    /// cannot be rendered; nothing further is sent.
    pub async fn run<S>(&self, client: &mut Client<S>, recipients: &[Recipient]) -> Result<BatchReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let from = extract_address(&self.config.sender);
        let batch = BatchFields {
            subject: &self.config.subject,
            from: &self.config.sender,
            url: &self.config.url,
            date: &self.date,
        };
        let total = recipients.len();
        let mut report = BatchReport::default();

        for (index, recipient) in recipients.iter().enumerate() {
            if self.is_cancelled() {
                tracing::warn!(remaining = total - index, "batch cancelled");
                report.cancelled = true;
                break;
            }

            let message = self.template.render(&MergeFields::new(recipient, batch))?;
            tracing::debug!(
                n = index + 1,
                total,
                from,
                to = %recipient.email,
                preview = preview(&message),
                "sending email"
            );

            let outcome = match Envelope::new(from, [recipient.email.as_str()], message) {
                Ok(envelope) => client.send(&envelope).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {
                    report.sent += 1;
                    tracing::info!(
                        "Email to {} sent successfully at {}",
                        recipient.email,
                        chrono::Local::now().format(DATE_FORMAT)
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(email = %recipient.email, error = %err, "unable to send email");
                }
            }

            if !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
        }

        Ok(report)
    }
}

/// Cuts `message` to at most [`PREVIEW_LEN`] bytes on a char boundary.
fn preview(message: &str) -> &str {
    if message.len() <= PREVIEW_LEN {
        return message;
    }
    let mut end = PREVIEW_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{Error, TemplateError};
    use proptest::prelude::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    const GREETING: &[u8] = b"220 mx.example.com ESMTP\r\n";
    const LIMIT: Option<Duration> = Some(Duration::from_secs(60));

    fn config() -> DispatchConfig {
        DispatchConfig {
            sender: "Phish Team <team@corp.example>".into(),
            subject: "Reset".into(),
            url: "https://t.example/1".into(),
            delay: Duration::ZERO,
        }
    }

    fn template() -> Template {
        Template::parse("Subject: {{.Subject}}\n\nHi {{.FirstName}}").unwrap()
    }

    #[test]
    fn extracts_angle_address() {
        assert_eq!(
            extract_address("Test Person <test@example.com>"),
            "test@example.com"
        );
        assert_eq!(extract_address("<a@b.c>"), "a@b.c");
    }

    #[test]
    fn falls_back_to_whole_sender() {
        assert_eq!(extract_address("team@corp.example"), "team@corp.example");
        assert_eq!(extract_address("Someone <nobody>"), "Someone <nobody>");
        assert_eq!(extract_address(""), "");
    }

    proptest! {
        #[test]
        fn display_name_never_leaks_into_address(
            name in "[A-Za-z ]{0,20}",
            local in "[a-z0-9.]{1,12}",
            domain in "[a-z0-9]{1,12}\\.[a-z]{2,4}",
        ) {
            let address = format!("{local}@{domain}");
            let sender = format!("{name} <{address}>");
            prop_assert_eq!(extract_address(&sender), address.as_str());
        }
    }

    #[test]
    fn report_summary_format() {
        let report = BatchReport {
            sent: 1,
            failed: 1,
            cancelled: false,
        };
        assert_eq!(report.to_string(), "1 - Emails sent successfully\n (1 errors)");
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let long = "é".repeat(200);
        let cut = preview(&long);
        assert!(cut.len() <= PREVIEW_LEN);
        assert!(long.starts_with(cut));
        assert_eq!(preview("short"), "short");
    }

    #[tokio::test]
    async fn counts_successes_and_failures() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"MAIL FROM:<team@corp.example>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<a@x.com>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b"Subject: Reset\r\n\r\nHi Ann\r\n.\r\n")
            .read(b"250 queued\r\n")
            .write(b"MAIL FROM:<team@corp.example>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<b@x.com>\r\n")
            .read(b"550 5.1.1 No such user\r\n")
            .write(b"RSET\r\n")
            .read(b"250 Ok\r\n")
            .build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![
            Recipient::new("ann", "smith", "a@x.com"),
            Recipient::new("bob", "jones", "b@x.com"),
            Recipient::new("eve", "doe", "not-an-address"),
        ];

        let template = template();
        let config = config();
        let report = Dispatcher::new(&template, &config)
            .run(&mut client, &recipients)
            .await
            .unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.sent + report.failed, recipients.len());
    }

    #[tokio::test]
    async fn line_break_in_email_never_reaches_the_wire() {
        let mock = Builder::new().read(GREETING).build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![Recipient::new("ann", "smith", "a@x.com\r\nRCPT TO:<c@x.com>")];

        let template = template();
        let config = config();
        let report = Dispatcher::new(&template, &config)
            .run(&mut client, &recipients)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn render_failure_aborts_before_any_transaction() {
        let mock = Builder::new().read(GREETING).build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![Recipient::new("ann", "smith", "a@x.com")];

        let template = Template::parse("Hi {{.Nickname}}").unwrap();
        let config = config();
        let err = Dispatcher::new(&template, &config)
            .run(&mut client, &recipients)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Template(TemplateError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn merge_fields_reach_the_message() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"MAIL FROM:<team@corp.example>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<a@x.com>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b"From: Phish Team <team@corp.example>\r\nDate: fixed\r\n\r\nhttps://t.example/1 Smith\r\n.\r\n")
            .read(b"250 queued\r\n")
            .build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![Recipient::new("ann", "smith", "a@x.com")];

        let template =
            Template::parse("From: {{.From}}\nDate: {{.Date}}\n\n{{.Url}} {{.LastName}}\n").unwrap();
        let config = config();
        let report = Dispatcher::new(&template, &config)
            .date("fixed")
            .run(&mut client, &recipients)
            .await
            .unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_follows_every_attempt() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"MAIL FROM:<team@corp.example>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<a@x.com>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b"Subject: Reset\r\n\r\nHi Ann\r\n.\r\n")
            .read(b"250 queued\r\n")
            .build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![
            Recipient::new("ann", "smith", "a@x.com"),
            Recipient::new("bob", "jones", "broken"),
        ];

        let template = template();
        let mut config = config();
        config.delay = Duration::from_millis(500);

        let start = tokio::time::Instant::now();
        let report = Dispatcher::new(&template, &config)
            .run(&mut client, &recipients)
            .await
            .unwrap();
        assert_eq!(report.sent + report.failed, 2);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_recipient() {
        let mock = Builder::new().read(GREETING).build();
        let mut client = Client::from_stream(mock, LIMIT).await.unwrap();
        let recipients = vec![Recipient::new("ann", "smith", "a@x.com")];

        let template = template();
        let config = config();
        let flag = Arc::new(AtomicBool::new(true));
        let report = Dispatcher::new(&template, &config)
            .cancel_on(flag)
            .run(&mut client, &recipients)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.sent + report.failed, 0);
    }
}
