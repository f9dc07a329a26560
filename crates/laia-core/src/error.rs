//! Error types shared by the configuration engine, wizard, and host integrations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Every failure the core can surface to an operator surface.
///
/// Normal outcomes such as a declined confirmation or a failed provisioning
/// step are modelled as values elsewhere; only conditions the caller must
/// handle or explain end up here.
#[derive(Debug, Error)]
pub enum LaiaError {
    #[error("settings at {path} are not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("permission denied on {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to persist {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown setting `{0}`")]
    UnknownField(String),

    #[error("invalid value `{value}` for {field}: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("a confirmation for {0} is already pending")]
    ConfirmationPending(String),

    #[error("step `{step}` is incomplete: {reason}")]
    IncompleteStep { step: String, reason: String },

    #[error("cannot {action} from step `{step}`")]
    InvalidTransition { step: String, action: String },

    #[error("unknown provisioning action `{0}`")]
    UnknownAction(String),

    #[error("{what} timed out after {timeout:?}")]
    Timeout { what: String, timeout: Duration },

    #[error("command failed: {0}")]
    Command(String),
}

impl LaiaError {
    /// Classify a write failure against `path`, keeping permission problems distinct.
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            LaiaError::PermissionDenied { path, source }
        } else {
            LaiaError::Storage { path, source }
        }
    }

    /// Classify a read failure against `path`.
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            LaiaError::PermissionDenied { path, source }
        } else {
            LaiaError::Read { path, source }
        }
    }

    /// True for failures caused by missing permission on a path.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, LaiaError::PermissionDenied { .. })
    }
}

pub type LaiaResult<T> = Result<T, LaiaError>;
