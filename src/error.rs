use serde_json::json;
use thiserror::Error;

/// Every failure a handler can surface. `code()` is the stable wire code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("select a workspace first")]
    NoWorkspace,

    #[error("log in first")]
    NotAuthenticated,

    #[error("{0}")]
    BadParams(String),

    #[error("{message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("cannot move entry from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("entry {entry_id} changed (expected version {expected}, found {actual})")]
    VersionConflict {
        entry_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn bad_params(message: impl Into<String>) -> Self {
        AppError::BadParams(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        AppError::PermissionDenied(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NoWorkspace => "no_workspace",
            AppError::NotAuthenticated => "not_authenticated",
            AppError::BadParams(_) => "bad_params",
            AppError::Validation { .. } => "validation_failed",
            AppError::NotFound(_) => "not_found",
            AppError::PermissionDenied(_) => "permission_denied",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::VersionConflict { .. } => "version_conflict",
            AppError::UnsupportedFormat(_) => "unsupported_format",
            AppError::Db(_) => "db_error",
            AppError::Io(_) => "io_failed",
            AppError::Other(_) => "internal",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation { details, .. } => details.clone(),
            AppError::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            AppError::VersionConflict {
                entry_id,
                expected,
                actual,
            } => Some(json!({
                "entryId": entry_id,
                "expectedVersion": expected,
                "actualVersion": actual
            })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AppError::NoWorkspace.code(), "no_workspace");
        assert_eq!(AppError::bad_params("x").code(), "bad_params");
        assert_eq!(AppError::denied("x").code(), "permission_denied");
        assert_eq!(
            AppError::InvalidTransition {
                from: "approved".into(),
                to: "pending".into()
            }
            .code(),
            "invalid_transition"
        );
    }

    #[test]
    fn conflict_carries_versions() {
        let e = AppError::VersionConflict {
            entry_id: "e1".into(),
            expected: 2,
            actual: 3,
        };
        let d = e.details().expect("details");
        assert_eq!(d["expectedVersion"], 2);
        assert_eq!(d["actualVersion"], 3);
    }
}
