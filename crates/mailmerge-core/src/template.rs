//! Message templates.
//!
//! Templates are plain text with `{{.Field}}` substitution actions. The
//! accepted syntax is the field-reference subset of Go's `text/template`, so
//! templates written for the usual phishing-simulation and mail-merge tools
//! work unchanged:
//!
//! - `{{.FirstName}}`, `{{ .FirstName }}`: substitute a field
//! - `{{- .Field}}`, `{{.Field -}}`: also trim whitespace before/after
//! - `{{/* comment */}}`: produces nothing
//!
//! Any other action (`if`, `range`, pipelines...) is rejected when the
//! template is parsed.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result, TemplateError};

#[allow(clippy::expect_used)] // constant pattern
static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{(-\s)?(.*?)(\s-)?\}\}").expect("action pattern is valid")
});

/// Source of field values for rendering.
pub trait Context {
    /// Returns the value of `name`, or `None` if there is no such field.
    fn field(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field { name: String, line: usize },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses template source.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Syntax`] for an unterminated or unsupported
    /// action.
    pub fn parse(source: &str) -> std::result::Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut cursor = 0;
        let mut line = 1;
        let mut trim_next = false;

        for caps in ACTION.captures_iter(source) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(2)) else {
                continue;
            };

            let mut text = &source[cursor..whole.start()];
            check_unclosed(text, line)?;
            line += count_lines(text);
            if trim_next {
                text = text.trim_start();
            }
            if caps.get(1).is_some() {
                text = text.trim_end();
            }
            if !text.is_empty() {
                segments.push(Segment::Text(text.to_string()));
            }

            if let Some(name) = parse_action(body.as_str(), line)? {
                segments.push(Segment::Field { name, line });
            }

            line += count_lines(whole.as_str());
            trim_next = caps.get(3).is_some();
            cursor = whole.end();
        }

        let mut tail = &source[cursor..];
        check_unclosed(tail, line)?;
        if trim_next {
            tail = tail.trim_start();
        }
        if !tail.is_empty() {
            segments.push(Segment::Text(tail.to_string()));
        }

        Ok(Self { segments })
    }

    /// Reads and parses a template file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Read`] if the file cannot be read, or
    /// [`Error::Template`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&source)?)
    }

    /// Renders the template against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownField`] for the first referenced field
    /// the context does not provide.
    pub fn render(&self, context: &impl Context) -> std::result::Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field { name, line } => {
                    let value = context.field(name).ok_or_else(|| TemplateError::UnknownField {
                        line: *line,
                        field: name.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// Returns the field name of a `.Field` action, `None` for a comment.
fn parse_action(body: &str, line: usize) -> std::result::Result<Option<String>, TemplateError> {
    let body = body.trim();
    if body.starts_with("/*") && body.ends_with("*/") && body.len() >= 4 {
        return Ok(None);
    }

    let syntax = |message: String| TemplateError::Syntax { line, message };
    let Some(name) = body.strip_prefix('.') else {
        return Err(syntax(format!("unsupported action {{{{{body}}}}}")));
    };
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(syntax(format!("bad field reference {{{{{body}}}}}")));
    }
    Ok(Some(name.to_string()))
}

fn check_unclosed(text: &str, line: usize) -> std::result::Result<(), TemplateError> {
    match text.find("{{") {
        Some(pos) => Err(TemplateError::Syntax {
            line: line + count_lines(&text[..pos]),
            message: "unclosed action".into(),
        }),
        None => Ok(()),
    }
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}
