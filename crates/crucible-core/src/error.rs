//! Error types shared across the Crucible pipeline.

use thiserror::Error;

/// A shared error type for the entire Crucible workspace.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone)]
pub enum CrucibleError {
    /// IO error (file system or stream operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "JSON", "TOML", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation payload could not be turned into a build request
    #[error("Normalization error: {0}")]
    Normalize(String),

    /// Build tool invocation or artifact handling error
    #[error("Build error: {0}")]
    Build(String),

    /// Executable launch or capture error
    #[error("Execution error: {0}")]
    Execution(String),

    /// A role agent failed to produce a turn
    #[error("Agent error: role '{role}' - {message}")]
    Agent { role: String, message: String },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CrucibleError {
    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a Normalize error
    pub fn normalize(message: impl Into<String>) -> Self {
        Self::Normalize(message.into())
    }

    /// Creates a Build error
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Creates an Execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Creates an Agent error
    pub fn agent(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Agent {
            role: role.into(),
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is a Normalize error
    pub fn is_normalize(&self) -> bool {
        matches!(self, Self::Normalize(_))
    }

    /// Check if this is a Build error
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}

impl From<std::io::Error> for CrucibleError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for CrucibleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CrucibleError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, CrucibleError>`.
pub type Result<T> = std::result::Result<T, CrucibleError>;
