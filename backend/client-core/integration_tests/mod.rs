mod helpers;

mod handshake;
mod search;
