use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failures during session negotiation. All of them are fatal for the
/// session instance: callers must construct a new session to retry.
#[derive(Debug, ThisError)]
pub enum HandshakeError {
    #[error("Handshake HTTP Error: {message} {location}")]
    Http {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Malformed Session Response: {message} {location}")]
    MalformedSession {
        message: String,
        location: ErrorLocation,
    },

    #[error("Anonymous Access Denied: server answered {body:?} instead of \"OK\" {location}")]
    AnonymousAccessDenied {
        body: String,
        location: ErrorLocation,
    },

    #[error("Login Error: {message} {location}")]
    Login {
        message: String,
        location: ErrorLocation,
    },
}

impl From<reqwest::Error> for HandshakeError {
    #[track_caller]
    fn from(error: reqwest::Error) -> Self {
        HandshakeError::Http {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(error),
        }
    }
}

impl From<url::ParseError> for HandshakeError {
    #[track_caller]
    fn from(error: url::ParseError) -> Self {
        HandshakeError::Http {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
            source: Box::new(error),
        }
    }
}
