//! Recipient list loading and per-recipient merge fields.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::template::Context;

/// One row of the recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Recipient {
    /// Given name, as written in the source.
    pub first_name: String,
    /// Family name, as written in the source.
    pub last_name: String,
    /// Delivery address.
    pub email: String,
}

impl Recipient {
    /// Creates a recipient.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }
}

/// Reads recipients from CSV with a header row.
///
/// Columns are matched by header name (`first_name`, `last_name`, `email`);
/// extra columns are ignored and header cells are trimmed.
///
/// # Errors
///
/// Returns [`Error::Csv`] if the data is malformed or a required column is
/// missing.
pub fn read_recipients<R: Read>(reader: R) -> Result<Vec<Recipient>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<Recipient>, _>>()
        .map_err(Error::from)
}

/// Reads recipients from a CSV file.
///
/// # Errors
///
/// Returns [`Error::Read`] if the file cannot be opened, or [`Error::Csv`]
/// as for [`read_recipients`].
pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>> {
    let file = std::fs::File::open(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    read_recipients(std::io::BufReader::new(file))
}

/// Values shared by every message of a batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchFields<'a> {
    /// `Subject` field.
    pub subject: &'a str,
    /// `From` field, the sender string exactly as configured.
    pub from: &'a str,
    /// `Url` field.
    pub url: &'a str,
    /// `Date` field, already formatted.
    pub date: &'a str,
}

/// A recipient with its derived fields, ready to render.
#[derive(Debug, Clone)]
pub struct MergeFields<'a> {
    first_name: String,
    last_name: String,
    email: &'a str,
    batch: BatchFields<'a>,
}

impl<'a> MergeFields<'a> {
    /// Derives the merge fields for one recipient.
    ///
    /// Names are title-cased with [`title_case`].
    #[must_use]
    pub fn new(recipient: &'a Recipient, batch: BatchFields<'a>) -> Self {
        Self {
            first_name: title_case(&recipient.first_name),
            last_name: title_case(&recipient.last_name),
            email: &recipient.email,
            batch,
        }
    }
}

impl Context for MergeFields<'_> {
    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "FirstName" => Some(self.first_name.as_str()),
            "LastName" => Some(self.last_name.as_str()),
            "Email" => Some(self.email),
            "Subject" => Some(self.batch.subject),
            "From" => Some(self.batch.from),
            "Url" => Some(self.batch.url),
            "Date" => Some(self.batch.date),
            _ => None,
        }
    }
}

/// Upper-cases the first letter of every word.
///
/// Only ASCII letters change case. A word starts after any ASCII character
/// other than a letter, digit or `_`, or after whitespace; other characters
/// are left untouched, so `mcdonald` becomes `Mcdonald` and `o'neil` becomes
/// `O'Neil`.
#[must_use]
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = is_separator(c);
    }
    out
}

fn is_separator(c: char) -> bool {
    if c.is_ascii() {
        !(c.is_ascii_alphanumeric() || c == '_')
    } else {
        c.is_whitespace()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const BATCH: BatchFields<'static> = BatchFields {
        subject: "Quarterly update",
        from: "Test Person <test@example.com>",
        url: "https://example.com/t",
        date: "Mon, 02 Jan 2006 15:04:05 -0700",
    };

    #[test]
    fn reads_rows_by_header_name() {
        let csv = "email,last_name,first_name,team\n\
                   ann@x.com,smith,ann,blue\n\
                   bob@x.com,jones,bob,red\n";
        let recipients = read_recipients(csv.as_bytes()).unwrap();
        assert_eq!(
            recipients,
            vec![
                Recipient::new("ann", "smith", "ann@x.com"),
                Recipient::new("bob", "jones", "bob@x.com"),
            ]
        );
    }

    #[test]
    fn trims_header_cells() {
        let csv = "first_name , last_name , email\nann,smith,ann@x.com\n";
        let recipients = read_recipients(csv.as_bytes()).unwrap();
        assert_eq!(recipients[0].email, "ann@x.com");
    }

    #[test]
    fn missing_column_is_an_error() {
        let csv = "first_name,last_name\nann,smith\n";
        assert!(matches!(read_recipients(csv.as_bytes()), Err(Error::Csv(_))));
    }

    #[test]
    fn ragged_row_is_an_error() {
        let csv = "first_name,last_name,email\nann,smith\n";
        assert!(read_recipients(csv.as_bytes()).is_err());
    }

    #[test]
    fn header_only_file_is_empty_list() {
        let csv = "first_name,last_name,email\n";
        assert!(read_recipients(csv.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first_name,last_name,email\nann,smith,ann@x.com").unwrap();
        let recipients = load_recipients(file.path()).unwrap();
        assert_eq!(recipients.len(), 1);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_recipients(Path::new("/nonexistent/recipients.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/recipients.csv"));
    }

    #[test]
    fn title_case_is_ascii_and_word_based() {
        assert_eq!(title_case("ann"), "Ann");
        assert_eq!(title_case("mary ann"), "Mary Ann");
        assert_eq!(title_case("o'neil-smith"), "O'Neil-Smith");
        assert_eq!(title_case("mcDONALD"), "McDONALD");
        assert_eq!(title_case("snake_case"), "Snake_case");
        assert_eq!(title_case("élodie"), "élodie");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn merge_fields_expose_every_variable() {
        let recipient = Recipient::new("ann", "smith", "ann@x.com");
        let fields = MergeFields::new(&recipient, BATCH);
        assert_eq!(fields.field("FirstName"), Some("Ann"));
        assert_eq!(fields.field("LastName"), Some("Smith"));
        assert_eq!(fields.field("Email"), Some("ann@x.com"));
        assert_eq!(fields.field("Subject"), Some("Quarterly update"));
        assert_eq!(fields.field("From"), Some("Test Person <test@example.com>"));
        assert_eq!(fields.field("Url"), Some("https://example.com/t"));
        assert_eq!(fields.field("Date"), Some("Mon, 02 Jan 2006 15:04:05 -0700"));
        assert_eq!(fields.field("Phone"), None);
    }
}
