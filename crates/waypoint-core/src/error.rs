//! Error types shared across every waypoint crate.

use thiserror::Error;

/// Result type alias using waypoint's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for waypoint operations.
///
/// Domain crates do not define their own error enums; they raise variants
/// of this one, so every crate gets consistent JSON-RPC/HTTP mapping via
/// [`Error::rpc_code`] and [`Error::http_status`] for free.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Request parameters failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON-RPC protocol-level error, carrying the wire error code directly
    #[error("Protocol error {code}: {message}")]
    Protocol { code: i32, message: String },

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Idempotency key derivation or lookup failed
    #[error("Idempotency error: {0}")]
    Idempotency(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

impl Error {
    /// Maps this error to a JSON-RPC 2.0 error code.
    ///
    /// `Protocol` carries its own wire code through unchanged; every other
    /// variant is assigned the closest standard or server-reserved code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::Protocol { code, .. } => *code,
            Error::Validation(_) => -32602,
            Error::NotFound(_) | Error::JobNotFound(_) | Error::SessionNotFound(_) => -32001,
            Error::Unauthorized(_) => -32002,
            Error::Forbidden(_) => -32003,
            Error::Idempotency(_) => -32004,
            Error::Database(_)
            | Error::Embedding(_)
            | Error::Inference(_)
            | Error::Search(_)
            | Error::Job(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Request(_)
            | Error::Internal(_)
            | Error::Io(_) => -32603,
        }
    }

    /// Maps this error to an HTTP status code for the REST/SSE surface.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::JobNotFound(_) | Error::SessionNotFound(_) => 404,
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Idempotency(_) => 409,
            Error::Protocol { .. } => 400,
            Error::Database(_)
            | Error::Embedding(_)
            | Error::Inference(_)
            | Error::Search(_)
            | Error::Job(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Request(_)
            | Error::Internal(_)
            | Error::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Job not found: {}", id));
    }

    #[test]
    fn test_error_display_session_not_found() {
        let err = Error::SessionNotFound("sess-123".to_string());
        assert_eq!(err.to_string(), "Session not found: sess-123");
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("query must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: query must not be empty"
        );
    }

    #[test]
    fn test_error_display_protocol() {
        let err = Error::Protocol {
            code: -32700,
            message: "parse error".to_string(),
        };
        assert_eq!(err.to_string(), "Protocol error -32700: parse error");
    }

    #[test]
    fn test_error_display_embedding() {
        let err = Error::Embedding("failed to generate".to_string());
        assert_eq!(err.to_string(), "Embedding error: failed to generate");
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model timeout".to_string());
        assert_eq!(err.to_string(), "Inference error: model timeout");
    }

    #[test]
    fn test_error_display_search() {
        let err = Error::Search("index unavailable".to_string());
        assert_eq!(err.to_string(), "Search error: index unavailable");
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("queue full".to_string());
        assert_eq!(err.to_string(), "Job error: queue full");
    }

    #[test]
    fn test_error_display_idempotency() {
        let err = Error::Idempotency("key collision with mismatched params".to_string());
        assert_eq!(
            err.to_string(),
            "Idempotency error: key collision with mismatched params"
        );
    }

    #[test]
    fn test_error_display_serialization() {
        let err = Error::Serialization("invalid JSON".to_string());
        assert_eq!(err.to_string(), "Serialization error: invalid JSON");
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_display_request() {
        let err = Error::Request("network unreachable".to_string());
        assert_eq!(err.to_string(), "Request error: network unreachable");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid token".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid token");
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = Error::Forbidden("insufficient permissions".to_string());
        assert_eq!(err.to_string(), "Forbidden: insufficient permissions");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        let result = get_result();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_result_type_err() {
        let result: Result<i32> = Err(Error::Internal("test".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_rpc_code_validation_is_invalid_params() {
        let err = Error::Validation("bad".to_string());
        assert_eq!(err.rpc_code(), -32602);
    }

    #[test]
    fn test_rpc_code_protocol_passes_through() {
        let err = Error::Protocol {
            code: -32601,
            message: "method not found".to_string(),
        };
        assert_eq!(err.rpc_code(), -32601);
    }

    #[test]
    fn test_http_status_not_found_is_404() {
        assert_eq!(Error::JobNotFound(Uuid::nil()).http_status(), 404);
        assert_eq!(Error::SessionNotFound("x".to_string()).http_status(), 404);
    }

    #[test]
    fn test_http_status_unauthorized_is_401() {
        assert_eq!(Error::Unauthorized("x".to_string()).http_status(), 401);
    }

    #[test]
    fn test_http_status_internal_is_500() {
        assert_eq!(Error::Internal("x".to_string()).http_status(), 500);
    }

    #[test]
    fn test_job_not_found_with_random_uuid() {
        let id = Uuid::new_v4();
        let err = Error::JobNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {} // Success
            _ => panic!("Expected Io error"),
        }
    }
}
