use crate::db::errors::DbError;
use async_graphql::ErrorExtensions;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

/// Failure taxonomy shared by resolvers, collaborators and the HTTP surface.
///
/// Every variant maps to a stable `code` (surfaced as a GraphQL error extension) and an HTTP status
/// for the non-GraphQL routes. [`Error::user_message`] never leaks collaborator or database details;
/// those only reach the logs.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided or not valid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Contradictory or malformed caller input: pagination arguments, cursors, dates, identifiers
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// A downstream collaborator (teams backend, hookd, cluster API, dependencytrack) failed
    #[error("{collaborator} request failed")]
    Unavailable {
        collaborator: &'static str,
        details: anyhow::Error,
    },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// The caller went away or the server is shutting down
    #[error("Request cancelled")]
    Cancelled,

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn unavailable(collaborator: &'static str, details: impl Into<anyhow::Error>) -> Self {
        Error::Unavailable {
            collaborator,
            details: details.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::Database(DbError::NotFound) => StatusCode::NOT_FOUND,
            Error::Unavailable { .. } => StatusCode::BAD_GATEWAY,
            // nginx's "client closed request"
            Error::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
            Error::Database(_) | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable classification, exposed as the `code` GraphQL extension.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "UNAUTHENTICATED",
            Error::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Error::NotFound { .. } | Error::Database(DbError::NotFound) => "NOT_FOUND",
            Error::Unavailable { .. } => "UNAVAILABLE",
            Error::Database(_) => "DATABASE",
            Error::Cancelled => "CANCELLED",
            Error::Other(_) => "INTERNAL",
        }
    }

    /// Get a user-facing error message that doesn't leak internal details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InvalidArgument { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::Database(DbError::NotFound) => "Resource not found".to_string(),
            Error::Unavailable { .. } => "An upstream service is unavailable, please try again later".to_string(),
            Error::Database(_) => "Database error occurred".to_string(),
            Error::Cancelled => "Request cancelled".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// Log full error details at a level matching the severity of the failure.
    pub fn log(&self) {
        match self {
            Error::Unavailable { collaborator, details } => {
                tracing::error!(collaborator, "Collaborator request failed: {details:#}");
            }
            Error::Database(DbError::NotFound) => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Database(_) | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authentication error: {}", self);
            }
            Error::InvalidArgument { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Cancelled => {
                tracing::debug!("Request cancelled");
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), self.user_message()).into_response()
    }
}

impl ErrorExtensions for Error {
    fn extend(&self) -> async_graphql::Error {
        self.log();
        let code = self.code();
        async_graphql::Error::new(self.user_message()).extend_with(|_, e| e.set("code", code))
    }
}

/// Shorthand for converting a resolver result into a GraphQL result with extensions attached.
pub fn gql<T>(result: Result<T>) -> async_graphql::Result<T> {
    result.map_err(|e| e.extend())
}

pub type Result<T> = std::result::Result<T, Error>;
