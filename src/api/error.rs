//! Unified error handling for backend calls.
//!
//! Every endpoint surfaces exactly one of these variants. Each carries a
//! human-readable message so callers can always show something to the user.

use thiserror::Error;

use crate::store::StoreError;

/// Message used when a failed call gives us nothing better to show.
pub const GENERIC_FAILURE: &str = "An unexpected error occurred.";

/// Errors returned by the API client and the domain endpoints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No token is stored; the request never left the device.
    #[error("User is not authenticated")]
    Unauthenticated,

    /// Transport failure or a body we could not make sense of.
    #[error("{0}")]
    Network(String),

    /// The backend reported failure in-band.
    #[error("{0}")]
    Application(String),

    /// Login failed: bad credentials, no token, or unreachable server.
    #[error("{0}")]
    Auth(String),
}

impl ApiError {
    /// Human-readable message for this error. Never empty.
    pub fn message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            message
        }
    }

    /// Build a network error, falling back to `fallback` when `message` is blank.
    pub fn network(message: Option<String>, fallback: &str) -> Self {
        ApiError::Network(non_blank(message, fallback))
    }

    /// Build an application error, falling back to `fallback` when `message` is blank.
    pub fn application(message: Option<String>, fallback: &str) -> Self {
        ApiError::Application(non_blank(message, fallback))
    }

    /// Re-label any failure as an authentication failure, keeping its message.
    pub fn into_auth(self) -> Self {
        match self {
            ApiError::Auth(_) => self,
            other => ApiError::Auth(other.message()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Network(format!("Failed to access local storage: {}", err))
    }
}

fn non_blank(message: Option<String>, fallback: &str) -> String {
    match message {
        Some(m) if !m.trim().is_empty() => m,
        _ => fallback.to_string(),
    }
}

/// Result alias used across the API layer.
pub type ApiResult<T> = Result<T, ApiError>;
