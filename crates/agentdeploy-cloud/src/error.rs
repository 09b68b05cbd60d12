//! Error taxonomy shared by every adapter and engine stage
//!
//! Adapters classify provider failures into [`CloudError`] at the boundary so
//! nothing downstream ever inspects free-form error text.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// The resource does not exist. Expected during discovery, not a failure.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Throttling or a transient network/service failure. Retryable.
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// An adapter call did not finish within the caller-supplied bound.
    #[error("Timed out after {after:?}: {operation}")]
    Timeout { operation: String, after: Duration },

    /// Idempotent-create race: the entity already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The requested name collides with something the provider already owns.
    #[error("Naming conflict: {0}")]
    NamingConflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    /// Permission or configuration problem. Aborts the current stage.
    #[error("Provider error: {0}")]
    Fatal(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a [`CloudError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    Transient,
    AlreadyExists,
    NamingConflict,
    Validation,
    Fatal,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::AlreadyExists => write!(f, "already-exists"),
            ErrorKind::NamingConflict => write!(f, "naming-conflict"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Fatal => write!(f, "fatal"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl CloudError {
    /// Error of the given classification carrying `message`
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::NotFound => CloudError::NotFound(message),
            ErrorKind::Transient => CloudError::Transient(message),
            ErrorKind::AlreadyExists => CloudError::AlreadyExists(message),
            ErrorKind::NamingConflict => CloudError::NamingConflict(message),
            ErrorKind::Validation => CloudError::Validation(message),
            ErrorKind::Fatal => CloudError::Fatal(message),
            ErrorKind::Cancelled => CloudError::Cancelled(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::Transient(_) | CloudError::Timeout { .. } => ErrorKind::Transient,
            CloudError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CloudError::NamingConflict(_) => ErrorKind::NamingConflict,
            CloudError::Validation(_) => ErrorKind::Validation,
            CloudError::Cancelled(_) => ErrorKind::Cancelled,
            CloudError::Fatal(_) | CloudError::Io(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub fn is_naming_conflict(&self) -> bool {
        self.kind() == ErrorKind::NamingConflict
    }

    /// Next action to suggest to the user, if there is an obvious one.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Transient => {
                Some("The provider was throttled or unreachable. Retry the same command.")
            }
            ErrorKind::NamingConflict | ErrorKind::AlreadyExists => Some(
                "Rerun with --auto-update or --force-recreate, pick another --agent-name, \
                 or remove the old resources with `agentdeploy cleanup --execute`.",
            ),
            ErrorKind::Validation => Some("Check the supplied names and URLs."),
            ErrorKind::Fatal => Some("Check your AWS credentials, region and IAM permissions."),
            ErrorKind::NotFound | ErrorKind::Cancelled => None,
        }
    }

    /// Same failure, reclassified as an idempotent-create race.
    ///
    /// Used for singleton records where a name collision means "someone else
    /// created it first".
    pub fn into_already_exists(self) -> Self {
        match self {
            CloudError::NamingConflict(msg) => CloudError::AlreadyExists(msg),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
