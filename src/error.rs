use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::db::StoreError;
use crate::pagination::PageError;
use crate::policy::Denied;

/// Request outcome taxonomy. Each variant carries the one message shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Validation(m)
            | ApiError::Unauthorized(m)
            | ApiError::NotFound(m)
            | ApiError::Internal(m) => m,
        }
    }

    /// Map a store failure on a precondition read: the no-rows sentinel is a
    /// 404 naming `what`, anything else is a 500.
    pub fn from_store(err: StoreError, what: &str) -> ApiError {
        match err {
            StoreError::NotFound => ApiError::NotFound(format!("{} not found", what)),
            other => ApiError::internal(other),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> ApiError {
        error!(error = %err, "internal error");
        ApiError::Internal(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<Denied> for ApiError {
    fn from(err: Denied) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<PageError> for ApiError {
    fn from(err: PageError) -> Self {
        ApiError::Validation(err.to_string())
    }
}
