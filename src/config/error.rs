//! Errors raised while turning configuration into rules

use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown fix-set '{name}'{}", .suggestion.as_ref().map(|s| format!(", did you mean '{}'?", s)).unwrap_or_default())]
    UnknownFixSet {
        name: String,
        suggestion: Option<String>,
    },

    #[error("invalid fix-set '{name}':\n  {}", .errors.join("\n  "))]
    InvalidFixSet { name: String, errors: Vec<String> },

    #[error("rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("rule '{rule}': invalid pattern: {source}")]
    InvalidPattern { rule: String, source: regex::Error },

    #[error("rule '{rule}': {source}")]
    Template { rule: String, source: TemplateError },

    #[error("missing value: {message}")]
    MissingValue { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fixset_display() {
        let err = ConfigError::UnknownFixSet {
            name: "cpp41".into(),
            suggestion: Some("cpp14".into()),
        };
        assert_eq!(
            err.to_string(),
            "unknown fix-set 'cpp41', did you mean 'cpp14'?"
        );

        let err = ConfigError::UnknownFixSet {
            name: "zzz".into(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "unknown fix-set 'zzz'");
    }

    #[test]
    fn test_invalid_fixset_lists_errors() {
        let err = ConfigError::InvalidFixSet {
            name: "mine".into(),
            errors: vec!["a".into(), "b".into()],
        };
        let display = err.to_string();
        assert!(display.contains("mine"));
        assert!(display.contains("\n  a\n  b"));
    }
}
