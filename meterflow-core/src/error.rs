//! Error taxonomy shared by every Meterflow component.
//!
//! The source system this crate is modeled on distinguished retriable from
//! non-retriable broker errors by pattern-matching the error *message*
//! (`contains("unmarshal" | "parse" | "invalid")`). That is fragile: a
//! downstream library rewording a message silently flips retry behavior. We
//! classify by [`ErrorKind`] instead, so retriability is a property of the
//! error's construction site, not its prose.

use std::collections::HashMap;
use std::fmt;

/// Coarse error classification. Kinds, not types: every component wraps its
/// own failures into one of these so callers can make a single retry/surface
/// decision without matching on component-specific error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-supplied input failed validation. Never retriable.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// An entity with the given identity already exists.
    AlreadyExists,
    /// The operation is not legal given the entity's current state.
    InvalidOperation,
    /// The relational or analytical store failed or timed out.
    Database,
    /// An external system (broker, orchestrator) failed or timed out.
    System,
    /// A programmer error: an invariant the codebase itself promised was
    /// violated. Never expected to occur; never retriable.
    Internal,
}

impl ErrorKind {
    /// Whether a broker handler should return this error to the broker for
    /// redelivery (`true`) or route the message to a dead-letter sink and
    /// move on (`false`).
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::Database | ErrorKind::System)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::Database => "database",
            ErrorKind::System => "system",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The error type threaded through every Meterflow operation.
///
/// Carries an optional user-facing `hint` (safe to surface to an API caller)
/// and a `details` map for structured context (e.g. `subscription_id`) that
/// gets logged but not necessarily shown to the end user.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
    pub details: HashMap<String, String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            hint: None,
            details: HashMap::new(),
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::AlreadyExists, message)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidOperation, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Database, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::System, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, message)
    }

    /// Attach a user-visible hint, e.g. "retry after resolving the duplicate
    /// price filter".
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a structured detail, reportable to an error-tracking sink.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Wrap this error with additional context, preserving kind and details.
    /// Mirrors the "errors are wrapped with context at each layer" rule.
    pub fn context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        Error {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
            hint: self.hint,
            details: self.details,
            source: self.source,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for wrapping arbitrary errors with a [`meterflow_core::Error`] kind,
/// used at the seams where we call into sqlx, serde_json, or other external
/// crates whose error types we don't want leaking past our boundary.
pub trait ResultExt<T> {
    fn map_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn map_kind(self, kind: ErrorKind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::new(kind, message).with_source(e))
    }
}
