//! # Error Types
//!
//! Comprehensive error types for the agent using `thiserror`.

/// Custom result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Main error type for the agent
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// Configuration errors (missing file, malformed YAML, unknown auth type)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Credential read errors (client id / client secret)
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// HTTP transport errors
    #[error("HTTP error: {context}")]
    Http {
        #[source]
        source: reqwest::Error,
        context: String,
    },

    /// API-level errors returned by the Infisical service
    #[error("API error: {message} (status: {status})")]
    Api { message: String, status: u16 },

    /// Template rendering errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// Post-render command errors
    #[error("Command error: {message}")]
    Command { message: String },

    /// Malformed duration strings (e.g. polling interval)
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Unrecoverable conditions that must terminate the process
    #[error("{message}")]
    Fatal { message: String },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// YAML parsing errors
    #[error("YAML error: {context}")]
    Yaml {
        #[source]
        source: serde_yaml::Error,
        context: String,
    },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },
}

impl AgentError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a credential error
    pub fn credential<S: Into<String>>(message: S) -> Self {
        Self::Credential { message: message.into() }
    }

    /// Create an API error
    pub fn api<S: Into<String>>(message: S, status: u16) -> Self {
        Self::Api { message: message.into(), status }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template { message: message.into() }
    }

    /// Create a command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command { message: message.into() }
    }

    /// Create an invalid duration error
    pub fn invalid_duration<V: Into<String>, R: Into<String>>(value: V, reason: R) -> Self {
        Self::InvalidDuration { value: value.into(), reason: reason.into() }
    }

    /// Create a fatal error
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Create an I/O error with context
    pub fn io<S: Into<String>>(source: std::io::Error, context: S) -> Self {
        Self::Io { source, context: context.into() }
    }

    /// Check if this error should be retried
    ///
    /// Transport failures and server-side errors are transient; everything
    /// else (auth rejections, malformed templates, config) is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Http { .. } => true,
            AgentError::Api { status, .. } => *status >= 500,
            AgentError::Io { .. } => true,
            _ => false,
        }
    }
}

// Error conversions for common external error types
impl From<std::io::Error> for AgentError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Yaml { source: error, context: "YAML parsing failed".to_string() }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http { source: error, context: "HTTP request failed".to_string() }
    }
}
