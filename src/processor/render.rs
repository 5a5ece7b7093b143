//! Message rendering.
//!
//! Templates are Handlebars with HTML escaping turned off: the rendered text
//! is the complete message (headers and body) handed to the SMTP transport.
//! Available fields are `FromAddress`, `ToAddress`, `Subject`, `Date`,
//! `HumanDate` and `RecResponse.Suggestions`.

use std::path::Path;

use chrono::{DateTime, TimeZone};
use handlebars::Handlebars;

use crate::error::{Error, ProcessError, Result};
use crate::types::EmailData;

const TEMPLATE_NAME: &str = "message";

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`
const MESSAGE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Long form for message bodies, e.g. `Monday, January 2, 2006`
const HUMAN_DATE_FORMAT: &str = "%A, %B %-d, %Y";

/// Parsed presentation template, shared read-only by every executor
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

impl Renderer {
    /// Parse a template from source text
    pub fn new(template: &str) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(|e| Error::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    /// Read and parse a template file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::Template(format!("unable to read {}: {}", path.display(), e))
        })?;
        Self::new(&source).map_err(|e| match e {
            Error::Template(reason) => {
                Error::Template(format!("unable to parse {}: {}", path.display(), reason))
            }
            other => other,
        })
    }

    /// Render the message for one recipient
    pub fn render(&self, data: &EmailData) -> std::result::Result<String, ProcessError> {
        self.registry
            .render(TEMPLATE_NAME, data)
            .map_err(|e| ProcessError::Render(e.to_string()))
    }
}

/// `(Date, HumanDate)` template values for the given instant
pub fn message_dates<Tz>(now: &DateTime<Tz>) -> (String, String)
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    (
        now.format(MESSAGE_DATE_FORMAT).to_string(),
        now.format(HUMAN_DATE_FORMAT).to_string(),
    )
}
