pub mod handshake;
pub mod query;
pub mod store;
pub mod transport;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Handshake(#[from] handshake::HandshakeError),

    #[error(transparent)]
    Query(#[from] query::QueryError),

    #[error(transparent)]
    Transport(#[from] transport::TransportError),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}
