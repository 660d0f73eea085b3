use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;
use tokio_tungstenite::tungstenite::Error as WsError;

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("Connect Error: {message} {location}")]
    Connect {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Connected Error: {message} {location}")]
    NotConnected {
        message: String,
        location: ErrorLocation,
    },

    #[error("Connect Timeout: connection not ready within {waited_secs}s {location}")]
    Timeout {
        waited_secs: u64,
        location: ErrorLocation,
    },
}

impl From<WsError> for TransportError {
    #[track_caller]
    fn from(error: WsError) -> Self {
        TransportError::Connect {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
