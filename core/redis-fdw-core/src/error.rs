//! Error types for the Redis table translation layer.
//!
//! All public APIs return `FdwResult<T>`, no panics in library code.

use thiserror::Error;

/// Unified error type for all scan and modify operations.
#[derive(Debug, Error)]
pub enum FdwError {
    /// Conflicting or invalid table options, wrong column count for a kind
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure to connect, authenticate or select the logical database
    #[error("connection error: {0}")]
    Connection(String),

    /// Transport failure or a reply whose shape does not match the command
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error-typed reply reported by the store itself
    #[error("redis error: {message}\nContext: {context}")]
    Store { message: String, context: String },

    /// Insert (or key-changing update) of a member that already exists
    #[error("duplicate key value violates unique constraint: {member} in '{key}'")]
    UniqueViolation { key: String, member: String },

    /// Reply shape or kind/layout combination that is not supported
    #[error("not supported: {feature}\nHint: {hint}")]
    Unsupported { feature: String, hint: String },

    /// Reply text that is not valid UTF-8
    #[error("invalid byte sequence in reply: {0}")]
    InvalidEncoding(String),

    /// Restriction expression could not be parsed
    #[error("SQL parse error: {message}\nSQL: {sql}")]
    SqlParse { message: String, sql: String },

    /// Operation issued after the session released its connection
    #[error("session is closed")]
    SessionClosed,

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for all scan and modify operations.
pub type FdwResult<T> = Result<T, FdwError>;

impl FdwError {
    /// Shorthand for an error-typed reply raised while running `context`.
    pub fn store(message: impl Into<String>, context: impl Into<String>) -> Self {
        FdwError::Store {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Whether this error ends the session that raised it.
    ///
    /// A uniqueness violation aborts only the single operation, and a
    /// configuration error is raised before any command is issued.
    /// Everything else tears the connection down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, FdwError::UniqueViolation { .. } | FdwError::Config(_))
    }
}

impl From<redis::RedisError> for FdwError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() {
            FdwError::Connection(err.to_string())
        } else {
            FdwError::Protocol(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FdwError {
    fn from(err: serde_json::Error) -> Self {
        FdwError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_config() {
        let err = FdwError::Config("conflicting options".to_string());
        assert_eq!(err.to_string(), "configuration error: conflicting options");
    }

    #[test]
    fn error_display_store() {
        let err = FdwError::store("WRONGTYPE Operation against a key", "HGETALL users");
        assert!(err.to_string().contains("WRONGTYPE"));
        assert!(err.to_string().contains("HGETALL users"));
    }

    #[test]
    fn error_display_unique_violation() {
        let err = FdwError::UniqueViolation {
            key: "colors".to_string(),
            member: "red".to_string(),
        };
        assert!(err.to_string().contains("unique constraint"));
        assert!(err.to_string().contains("red"));
        assert!(err.to_string().contains("colors"));
    }

    #[test]
    fn error_display_unsupported() {
        let err = FdwError::Unsupported {
            feature: "nested array replies".to_string(),
            hint: "use a flat collection".to_string(),
        };
        assert!(err.to_string().contains("not supported"));
        assert!(err.to_string().contains("nested array"));
    }

    #[test]
    fn unique_violation_is_not_fatal() {
        let err = FdwError::UniqueViolation {
            key: "k".to_string(),
            member: "m".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(FdwError::Protocol("null reply".to_string()).is_fatal());
        assert!(FdwError::store("ERR", "GET k").is_fatal());
    }

    #[test]
    fn serde_error_converts() {
        let err: FdwError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, FdwError::Serialization(_)));
    }
}
