//! Negotiated session identity.

pub mod store;

pub use store::SessionStore;

use common::CookieSet;

use uuid::Uuid;

/// Identity of one negotiated transport session.
///
/// Created once per process by the handshake. Immutable afterwards except
/// for the cookie refresh written out at close.
#[derive(Debug, Clone)]
pub struct Session {
    /// Transport session identifier assigned by the handshake.
    pub sid: String,

    /// Rotating transaction token used on the polling endpoint.
    pub transaction_token: String,

    /// Per-session frontend identifier carried in every query envelope.
    pub frontend_session_id: Uuid,

    /// Cookies accumulated across the handshake; readers copy, never mutate.
    pub cookies: CookieSet,

    /// Whether the anonymous-access acknowledgment was granted.
    pub anonymous_access: bool,
}
