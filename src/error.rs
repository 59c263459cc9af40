//! Error types for mlflow-migrate
//!
//! Errors are handled at the narrowest scope that still makes progress:
//! per-version and per-run failures are recorded as
//! [`FailureDescriptor`](crate::record::FailureDescriptor)s, and only
//! failures of a root entity (model, experiment) escape a task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Kind of tracking-server entity, used in not-found reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An experiment
    Experiment,
    /// A run
    Run,
    /// A registered model
    RegisteredModel,
    /// A model version
    ModelVersion,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Experiment => "Experiment",
            Self::Run => "Run",
            Self::RegisteredModel => "Registered model",
            Self::ModelVersion => "Model version",
        };
        f.write_str(name)
    }
}

/// mlflow-migrate error types
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid or contradictory set of options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced entity does not exist on the server
    #[error("RESOURCE_DOES_NOT_EXIST: {kind} '{id}' not found")]
    NotFound {
        /// Kind of entity that was looked up
        kind: EntityKind,
        /// Identifier used for the lookup
        id: String,
    },

    /// Tracking server rejected a request
    #[error("Tracking server error ({status}) {code}: {message}")]
    Server {
        /// HTTP status code (0 for non-HTTP servers)
        status: u16,
        /// Server error code, e.g. `INVALID_PARAMETER_VALUE`
        code: String,
        /// Server message
        message: String,
    },

    /// Stage name outside {Production, Staging, Archived, None}
    #[error("Invalid stage '{0}': must be one of Production, Staging, Archived, None")]
    InvalidStage(String),

    /// Model version source URI could not be rewritten
    #[error("Cannot extract model path from source '{source_uri}' for run '{run_id}'")]
    InvalidSource {
        /// Original source URI
        source_uri: String,
        /// Run id expected inside the URI
        run_id: String,
    },

    /// Export record is missing or malformed
    #[error("Export record error: {0}")]
    Record(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error
    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether this error is the server's "resource does not exist" signal.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is specifically a missing run.
    #[must_use]
    pub const fn is_run_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound {
                kind: EntityKind::Run,
                ..
            }
        )
    }

    /// Classification recorded in failure descriptors.
    #[must_use]
    pub const fn failure_class(&self) -> FailureClass {
        match self {
            Self::NotFound { .. } => FailureClass::NotFound,
            Self::Configuration(_) | Self::InvalidStage(_) => FailureClass::Configuration,
            Self::Io(_) => FailureClass::Io,
            Self::Record(_) | Self::Json(_) | Self::InvalidSource { .. } => FailureClass::Record,
            Self::Server { .. } | Self::Other(_) => FailureClass::Server,
            #[cfg(feature = "rest")]
            Self::Http(_) => FailureClass::Server,
        }
    }
}

/// Coarse classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Entity absent at read time (tolerated for runs behind versions)
    NotFound,
    /// Any other server-side failure
    Server,
    /// Invalid caller input
    Configuration,
    /// Local filesystem failure
    Io,
    /// Malformed export record or source URI
    Record,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_server_signal() {
        let err = Error::not_found(EntityKind::Run, "abc123");
        let msg = err.to_string();
        assert!(msg.contains("RESOURCE_DOES_NOT_EXIST: Run"));
        assert!(msg.contains("abc123"));
        assert!(err.is_not_found());
        assert!(err.is_run_not_found());
    }

    #[test]
    fn test_model_not_found_is_not_run_not_found() {
        let err = Error::not_found(EntityKind::RegisteredModel, "m");
        assert!(err.is_not_found());
        assert!(!err.is_run_not_found());
    }

    #[test]
    fn test_failure_class_mapping() {
        assert_eq!(
            Error::Configuration("x".into()).failure_class(),
            FailureClass::Configuration
        );
        assert_eq!(
            Error::not_found(EntityKind::Run, "r").failure_class(),
            FailureClass::NotFound
        );
        let server = Error::Server {
            status: 500,
            code: "INTERNAL_ERROR".into(),
            message: "boom".into(),
        };
        assert_eq!(server.failure_class(), FailureClass::Server);
        assert_eq!(
            Error::Record("bad".into()).failure_class(),
            FailureClass::Record
        );
    }
}
