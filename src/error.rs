//! Error types for docfield

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// docfield errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Markup parse error: {0}")]
    Markup(String),

    /// A recorded node span no longer resolves against the live tree.
    /// Fatal: the whole transform is abandoned.
    #[error("Structural inconsistency: {0}")]
    Structure(String),

    #[error("Expression error in '{source_text}': {message}")]
    Expression {
        source_text: String,
        message: String,
    },

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_norway::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn expression(source_text: &str, message: impl Into<String>) -> Self {
        Error::Expression {
            source_text: source_text.to_string(),
            message: message.into(),
        }
    }

    /// Message without the offending expression, for callers that show it
    /// themselves
    pub fn detail(&self) -> String {
        match self {
            Error::Expression { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Markup(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Error::Markup(e.to_string())
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_detail_omits_the_source() {
        let e = Error::expression("a[0", "unbalanced '['");
        assert_eq!(e.to_string(), "Expression error in 'a[0': unbalanced '['");
        assert_eq!(e.detail(), "unbalanced '['");
        assert_eq!(Error::Mapping("x".into()).detail(), "Mapping error: x");
    }
}
