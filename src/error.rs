use crate::protocol::ProtocolError;
use thiserror::Error;

/// Structured error context for setup-time failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Configuration key or protocol path that caused the error (e.g., "config.server", "services[2].name")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected scheme, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "client_config", "http_transport")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for building clients and loading protocols.
///
/// Calls never return this type: their failures travel inside
/// [`ApiReturn`](crate::types::ApiReturn) as an [`ApiError`](crate::types::ApiError).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Protocol definition error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Transport setup error: {message}{}", format_context(.context))]
    Transport {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new transport setup error with structured context
    pub fn transport_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Transport {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::configuration_with_context(msg, ErrorContext::new())
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Transport { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}
