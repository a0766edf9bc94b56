//! Protocol error types

/// Protocol error types
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Failed to load protocol from {path}: {reason}{}", .hint.as_ref().map(|h| format!("\n Hint: {}", h)).unwrap_or_default())]
    LoadError {
        path: String,
        reason: String,
        hint: Option<String>,
    },

    #[error("Protocol validation failed: {0}")]
    ValidationError(String),

    #[error("Service not found: {name}{}", .hint.as_ref().map(|h| format!("\n Hint: {}", h)).unwrap_or_default())]
    NotFound { name: String, hint: Option<String> },

    #[error("YAML syntax error: {0}")]
    YamlError(String),

    #[error("JSON syntax error: {0}")]
    JsonError(String),
}

impl ProtocolError {
    /// Attach an actionable hint to the error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        let hint_val = Some(hint.into());
        match self {
            ProtocolError::LoadError { ref mut hint, .. } => *hint = hint_val,
            ProtocolError::NotFound { ref mut hint, .. } => *hint = hint_val,
            _ => (),
        }
        self
    }
}
