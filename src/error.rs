//! Error handling for the CRM client

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Error body returned by PostgREST on a failed request
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
}

impl fmt::Display for ApiErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("Code: {}", code));
        }
        if let Some(message) = &self.message {
            parts.push(format!("Message: {}", message));
        }
        if let Some(details) = &self.details {
            parts.push(format!("Details: {}", details));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("Hint: {}", hint));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Unified error type for the CRM client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The backend answered with a structured error body
    #[error("API error: {details} (Status: {status})")]
    Api {
        status: reqwest::StatusCode,
        details: ApiErrorDetails,
    },

    /// The backend answered with an error body that was not JSON
    #[error("API error (unparsed): {message} (Status: {status})")]
    UnparsedApi {
        status: reqwest::StatusCode,
        message: String,
    },

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// A lookup that expected a row found none
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before any request was sent
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new not-found error
    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    /// Create a new validation error
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Build an API error from a status code and raw response text
    pub fn from_response(status: reqwest::StatusCode, body: String) -> Self {
        match serde_json::from_str::<ApiErrorDetails>(&body) {
            Ok(details) => Error::Api { status, details },
            Err(_) => Error::UnparsedApi {
                status,
                message: body,
            },
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Error::Api { status, .. } | Error::UnparsedApi { status, .. } => Some(*status),
            Error::Http(e) => e.status(),
            _ => None,
        }
    }

    /// Whether a read that failed this way may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Api { status, .. } | Error::UnparsedApi { status, .. } => {
                status.is_server_error()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
