use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Query-level failures raised before any network I/O.
///
/// Timeouts and empty results are NOT errors: they come back as sentinel
/// result values so the session stays usable after a failed query.
#[derive(Debug, ThisError)]
pub enum QueryError {
    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    #[error("Concurrent Request Error: a query is already in flight {location}")]
    ConcurrentRequest { location: ErrorLocation },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },
}
