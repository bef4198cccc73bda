//! The closed error taxonomy.
//!
//! Every error that leaves this workspace carries a [`ErrorKind`] from the
//! closed set plus a stable symbolic id (e.g. `COMMAND-3f8ka`) so operators
//! can trace a report back to the exact raise site without depending on the
//! free-text message.

use std::collections::BTreeMap;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Closed set of error classes with a fixed HTTP mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Internal,
    Unknown,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PreconditionFailed,
    Unavailable,
    DeadlineExceeded,
    Unauthenticated,
    Unauthorized,
    PermissionDenied,
    QuotaExceeded,
    /// Optimistic concurrency failure in the event log. Retryable end-to-end.
    ConcurrencyConflict,
}

impl ErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            Self::Internal | Self::Unknown => 500,
            Self::InvalidArgument => 400,
            Self::NotFound => 404,
            Self::AlreadyExists | Self::ConcurrencyConflict => 409,
            Self::PreconditionFailed => 412,
            Self::Unavailable => 503,
            Self::DeadlineExceeded => 504,
            Self::Unauthenticated => 401,
            Self::Unauthorized | Self::PermissionDenied => 403,
            Self::QuotaExceeded => 429,
        }
    }

    /// Whether an internal retry (bounded, backed off) is worthwhile.
    ///
    /// Concurrency conflicts are deliberately excluded: they must surface to
    /// the caller, who owns the reload-and-retry loop.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// An error with a stable symbolic id and an optional details map.
#[derive(Debug, Clone, Error)]
#[error("{id}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    /// Stable raise-site id, unique across the codebase.
    pub id: &'static str,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl Error {
    pub fn new(kind: ErrorKind, id: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn internal(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, id, message)
    }

    pub fn invalid_argument(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, id, message)
    }

    pub fn not_found(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, id, message)
    }

    pub fn already_exists(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, id, message)
    }

    pub fn precondition_failed(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, id, message)
    }

    pub fn unavailable(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, id, message)
    }

    pub fn deadline_exceeded(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, id, message)
    }

    pub fn unauthenticated(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, id, message)
    }

    pub fn permission_denied(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, id, message)
    }

    pub fn concurrency_conflict(id: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrencyConflict, id, message)
    }

    /// Attach a key/value pair to the details map.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_mapping_matches_contract() {
        assert_eq!(ErrorKind::Internal.http_status(), 500);
        assert_eq!(ErrorKind::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 409);
        assert_eq!(ErrorKind::PreconditionFailed.http_status(), 412);
        assert_eq!(ErrorKind::Unavailable.http_status(), 503);
        assert_eq!(ErrorKind::DeadlineExceeded.http_status(), 504);
        assert_eq!(ErrorKind::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorKind::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorKind::QuotaExceeded.http_status(), 429);
    }

    #[test]
    fn only_unavailable_is_internally_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::ConcurrencyConflict.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }

    #[test]
    fn details_are_carried() {
        let err = Error::not_found("CORE-t01", "user not found").with_detail("user_id", "u1");
        assert_eq!(err.details.get("user_id").map(String::as_str), Some("u1"));
        assert_eq!(err.to_string(), "CORE-t01: user not found");
    }
}
