//! Dispatch error taxonomy.

use axum::http::StatusCode;
use std::error::Error as _;
use thiserror::Error;

use crate::backend::BackendError;
use crate::datasource::DatasourceError;

/// Broad class of a dispatch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    AccessDenied,
    NotFound,
    Server,
}

/// A failure that aborts the whole batch.
///
/// Per-sub-query failures are not represented here; they travel inside the
/// response envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No queries found in query")]
    EmptyBatch,

    #[error("{message}")]
    MissingDatasourceId { message: &'static str, index: usize },

    #[error("{message}")]
    AccessDenied {
        message: &'static str,
        #[source]
        source: DatasourceError,
    },

    #[error("{message}")]
    DatasourceNotFound {
        message: &'static str,
        #[source]
        source: DatasourceError,
    },

    #[error("Expressions feature toggle is not enabled")]
    ExpressionsDisabled,

    #[error("{message}")]
    DatasourceUnavailable {
        message: &'static str,
        #[source]
        source: DatasourceError,
    },

    #[error("{message}")]
    Backend {
        message: &'static str,
        #[source]
        source: BackendError,
    },
}

impl DispatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DispatchError::EmptyBatch | DispatchError::MissingDatasourceId { .. } => {
                ErrorClass::Validation
            }
            DispatchError::AccessDenied { .. } => ErrorClass::AccessDenied,
            DispatchError::DatasourceNotFound { .. } | DispatchError::ExpressionsDisabled => {
                ErrorClass::NotFound
            }
            DispatchError::DatasourceUnavailable { .. } | DispatchError::Backend { .. } => {
                ErrorClass::Server
            }
        }
    }

    /// HTTP status for this failure.
    ///
    /// A missing data source is the caller's bad identifier (400); a disabled
    /// feature is 404.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::EmptyBatch
            | DispatchError::MissingDatasourceId { .. }
            | DispatchError::DatasourceNotFound { .. } => StatusCode::BAD_REQUEST,
            DispatchError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            DispatchError::ExpressionsDisabled => StatusCode::NOT_FOUND,
            DispatchError::DatasourceUnavailable { .. } | DispatchError::Backend { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.class() != ErrorClass::Server
    }

    /// The underlying collaborator error, rendered for diagnostics.
    pub fn cause(&self) -> Option<String> {
        self.source().map(ToString::to_string)
    }
}
