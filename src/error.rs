use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Canvas API error: {status} {message}")]
    Api { status: u16, message: String },

    #[error("Canvas request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected Canvas payload: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid timestamp '{input}': {message}")]
    Timestamp { input: String, message: String },

    #[error("Invalid URL: {0}")]
    UrlParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid username or password")]
    Unauthorized,

    #[error("Canvas token is not configured for user {0}")]
    MissingToken(String),

    #[error("A sync is already running for user {0}")]
    SyncInProgress(i64),
}

/// Coarse classification used by callers to pick a response for the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The LMS rejected the stored token.
    VendorAuth,
    /// The LMS answered with another failure, or could not be reached.
    VendorUnavailable,
    BadRequest,
    NotFound,
    Unauthorized,
    Conflict,
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Api { status: 401, .. } => ErrorCategory::VendorAuth,
            Error::Api { .. } | Error::Http(_) | Error::Decode(_) => {
                ErrorCategory::VendorUnavailable
            }
            Error::InvalidInput(_) | Error::Timestamp { .. } | Error::MissingToken(_) => {
                ErrorCategory::BadRequest
            }
            Error::NotFound(_) => ErrorCategory::NotFound,
            Error::Unauthorized => ErrorCategory::Unauthorized,
            Error::SyncInProgress(_) => ErrorCategory::Conflict,
            Error::Database(_)
            | Error::Migration(_)
            | Error::UrlParse(_)
            | Error::Config(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status an inbound layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::VendorAuth | ErrorCategory::Unauthorized => 401,
            ErrorCategory::VendorUnavailable => 502,
            ErrorCategory::BadRequest => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Internal => 500,
        }
    }

    /// Message safe to show to the end user.
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::VendorAuth => {
                "Canvas API token is invalid or expired. Please update your token.".to_string()
            }
            ErrorCategory::VendorUnavailable => {
                "Unable to connect to Canvas. Please try again later.".to_string()
            }
            ErrorCategory::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_errors_are_distinguishable() {
        let auth = Error::Api {
            status: 401,
            message: "Unauthorized".into(),
        };
        let down = Error::Api {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert_eq!(auth.category(), ErrorCategory::VendorAuth);
        assert_eq!(auth.status_code(), 401);
        assert!(auth.user_message().contains("update your token"));

        assert_eq!(down.category(), ErrorCategory::VendorUnavailable);
        assert_eq!(down.status_code(), 502);
        assert!(down.user_message().contains("try again later"));
    }

    #[test]
    fn test_input_and_ownership_errors() {
        assert_eq!(Error::InvalidInput("bad type".into()).status_code(), 400);
        assert_eq!(Error::NotFound("task 3".into()).status_code(), 404);
        assert_eq!(Error::SyncInProgress(1).status_code(), 409);
        assert_eq!(
            Error::Database("disk I/O error".into()).user_message(),
            "Internal server error"
        );
    }
}
