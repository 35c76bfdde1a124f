use ariadne::{Config as ReportConfig, Label, Report, ReportKind, Source};
use std::ops::Range;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the runtime surfaces.
///
/// Cloneable so failed reactive runs can be recorded and handed back to the host
/// without losing the original error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{name} is not defined")]
    NameNotDefined { name: String },

    #[error("<{tag}>: default slot content found after a named slot")]
    SlotOrderViolation { tag: String },

    #[error("<{tag}>: <slot> needs a `name` attribute or a `#name` marker")]
    MissingSlotNameMarker { tag: String },

    #[error("<{tag}> requires the `{prop}` prop")]
    MissingProp { tag: String, prop: String },

    #[error("syntax error in `{expression}`: {message}")]
    Syntax {
        expression: String,
        message: String,
        span: Range<usize>,
    },

    #[error("markup error: {message}")]
    Markup { message: String, span: Range<usize> },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid assignment target")]
    InvalidAssignment,

    #[error("config: {0}")]
    Config(String),
}

impl Error {
    pub fn name_not_defined(name: impl Into<String>) -> Self {
        Self::NameNotDefined { name: name.into() }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch(message.into())
    }

    /// Renders the error as a plain-text ariadne report.
    ///
    /// Expression syntax errors are drawn against their own expression text,
    /// markup errors against `document`. Errors without a span render as their message.
    pub fn report(&self, filename: &str, document: &str) -> String {
        let (source, span, reason) = match self {
            Self::Syntax {
                expression,
                message,
                span,
            } => (expression.as_str(), span.clone(), message.as_str()),
            Self::Markup { message, span } => (document, span.clone(), message.as_str()),
            _ => return self.to_string(),
        };
        let span = clamp(span, source.len());
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (filename, span.clone()))
            .with_config(ReportConfig::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new((filename, span)).with_message(reason))
            .finish()
            .write((filename, Source::from(source)), &mut report_bytes);
        match written {
            Ok(()) => String::from_utf8_lossy(&report_bytes).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

fn clamp(span: Range<usize>, len: usize) -> Range<usize> {
    let start = span.start.min(len);
    start..span.end.clamp(start, len)
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_not_defined_message() {
        let error = Error::name_not_defined("unknownVar");
        assert_eq!(error.to_string(), "unknownVar is not defined");
    }

    #[test]
    fn syntax_report_points_into_expression() {
        let error = Error::Syntax {
            expression: "count +".into(),
            message: "unexpected end of input".into(),
            span: 7..7,
        };
        let report = error.report("page.html", "");
        assert!(report.contains("page.html"));
        assert!(report.contains("unexpected end of input"));
    }

    #[test]
    fn spanless_errors_report_their_message() {
        let error = Error::InvalidAssignment;
        assert_eq!(error.report("page.html", "<p></p>"), "invalid assignment target");
    }
}
