//! Error types for the audit system

use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Support for '{path}' file type hasn't been set up")]
    UnsupportedFileType { path: String },

    #[error("File '{path}' doesn't exist")]
    FileNotFound { path: String },

    #[error("Dependency resolver '{program}' failed: {message}")]
    ResolverError { program: String, message: String },

    #[error("Malformed dependency resolver output: {0}")]
    ResolverOutput(String),

    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),

    #[error("{} criteria not found:\n{}", .0.len(), format_unresolved(.0))]
    UnresolvedCriteria(Vec<String>),

    #[error("Argument '{argument}' of rule '{rule}': {message}")]
    ExtractionError {
        argument: String,
        rule: String,
        message: String,
    },

    #[error("Invalid build label '{0}'")]
    InvalidLabel(String),

    #[error("Build engine error: {0}")]
    EngineError(String),

    #[error("Audit task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

fn format_unresolved(criteria: &[String]) -> String {
    criteria
        .iter()
        .map(|c| format!("  - {}", c))
        .collect::<Vec<_>>()
        .join("\n")
}

impl AuditError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a resolver error
    pub fn resolver(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResolverError {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create an invalid criterion error
    pub fn criterion(msg: impl Into<String>) -> Self {
        Self::InvalidCriterion(msg.into())
    }

    /// Create an argument extraction error
    pub fn extraction(
        argument: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ExtractionError {
            argument: argument.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a build engine error
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::EngineError(msg.into())
    }
}
