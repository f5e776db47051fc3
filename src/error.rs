//! Structured error taxonomy shared by every subsystem.
//!
//! Every fallible path in this crate returns [`Error`]. The variants map onto
//! the categories the agent protocol layer needs to turn into JSON-RPC error
//! responses (`category()` / `http_status()`), so there is exactly one error
//! type instead of a parallel hierarchy per subsystem.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Backend-originated failure subcategories (see `client::backend`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// HTTP 409/412 from a save: never retried.
    Conflict,
    /// HTTP 429 after retries are exhausted.
    RateLimit,
    /// HTTP 400 from a save.
    ValidationError,
    /// Backend reachable but reporting itself unavailable.
    Unavailable,
    /// No response at all (connect/read failure).
    Timeout,
    /// Any other non-2xx status.
    Unknown,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Conflict => "conflict",
            Self::RateLimit => "rate_limit",
            Self::ValidationError => "validation_error",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The crate-wide error type.
///
/// Each variant carries a user-facing message already formatted; tool
/// handlers and the JSON-RPC layer attach no additional English text, they
/// only attach structured `data` (see [`Error::http_status`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Credential failure or missing auth configuration. Never retried.
    #[error("{0}")]
    Auth(String),

    /// Payload fails schema validation or a documented invariant.
    #[error("validation error at `{field}`: {message}")]
    Validation {
        /// Dotted path to the offending field, e.g. `text_patch[0].line_number`.
        field: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A note, version, or other named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote HTTP-originated failure.
    #[error("backend error ({kind}): {message}")]
    Backend {
        /// Which interceptor rule produced this error.
        kind: BackendErrorKind,
        /// Raw HTTP status, when one was received.
        http_status: Option<u16>,
        /// Message surfaced to the caller.
        message: String,
    },

    /// Transport-level timeout (no response received).
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Local cache store failure (integrity, I/O, schema).
    #[error("cache store error: {0}")]
    Db(String),

    /// Startup configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An invariant the rest of the code assumes was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for an internal-error variant from a `Display`-able value.
    pub fn internal(msg: impl std::fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Shorthand for a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a conflict backend error carrying the standard hint.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Backend {
            kind: BackendErrorKind::Conflict,
            http_status: Some(409),
            message: format!("{}; resolution: re-fetch and re-apply", message.into()),
        }
    }

    /// Broad error category, used by the JSON-RPC layer to pick a `code`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::Backend { .. } => "backend",
            Self::Timeout(_) => "timeout",
            Self::Db(_) => "db",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP-style status used to derive a JSON-RPC error code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::Validation { .. } => 400,
            Self::NotFound(_) => 404,
            Self::Backend {
                kind: BackendErrorKind::Conflict,
                ..
            } => 409,
            Self::Backend {
                kind: BackendErrorKind::RateLimit,
                ..
            } => 429,
            Self::Backend {
                kind: BackendErrorKind::ValidationError,
                ..
            } => 400,
            Self::Backend {
                http_status: Some(s),
                ..
            } => *s,
            Self::Backend { .. } => 502,
            Self::Timeout(_) => 504,
            Self::Db(_) => 500,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Resolution hint surfaced alongside conflict errors (§4.1, §7).
    pub fn resolution_hint(&self) -> Option<&'static str> {
        match self {
            Self::Backend {
                kind: BackendErrorKind::Conflict,
                ..
            } => Some("re-fetch and re-apply"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json error: {err}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Self::Timeout(err.to_string())
        } else {
            Self::Backend {
                kind: BackendErrorKind::Unknown,
                http_status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_resolution_hint() {
        let err = Error::conflict("base version mismatch");
        assert_eq!(err.http_status(), 409);
        assert_eq!(err.resolution_hint(), Some("re-fetch and re-apply"));
        assert!(err.to_string().contains("re-fetch and re-apply"));
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(Error::NotFound("x".into()).category(), "not_found");
        assert_eq!(Error::internal("x").category(), "internal");
        assert_eq!(Error::validation("f", "m").http_status(), 400);
    }
}
