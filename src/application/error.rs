use serde::Serialize;
use thiserror::Error;

use crate::{
    application::{pagination::PaginationError, repos::RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Stable, machine-readable classification attached to every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    NoPermission,
    Conflict,
    OperationFailed,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoPermission => "no_permission",
            ErrorKind::Conflict => "conflict",
            ErrorKind::OperationFailed => "operation_failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<PaginationError> for AppError {
    fn from(error: PaginationError) -> Self {
        AppError::Validation(error.to_string())
    }
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Domain(DomainError::IndexOutOfRange { .. })
            | AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Domain(DomainError::AlreadyInSeries { .. })
            | AppError::Validation(_) => ErrorKind::BadRequest,
            AppError::Domain(DomainError::Invariant { .. }) => ErrorKind::OperationFailed,
            AppError::Repo(RepoError::NotFound) => ErrorKind::NotFound,
            AppError::Repo(RepoError::InvalidInput { .. })
            | AppError::Repo(RepoError::Pagination(_)) => ErrorKind::BadRequest,
            AppError::Repo(RepoError::Conflict { .. })
            | AppError::Repo(RepoError::Duplicate { .. })
            | AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Repo(_) => ErrorKind::OperationFailed,
            AppError::Permission(_) => ErrorKind::NoPermission,
            AppError::Infra(_) | AppError::Unexpected(_) => ErrorKind::OperationFailed,
        }
    }

    /// Message safe to show to callers; storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::OperationFailed => "Operation did not take effect".to_string(),
            ErrorKind::Conflict if matches!(self, AppError::Repo(_)) => {
                "Concurrent update, please retry".to_string()
            }
            ErrorKind::NotFound if matches!(self, AppError::Repo(_)) => {
                "Resource not found".to_string()
            }
            _ => self.to_string(),
        }
    }
}
