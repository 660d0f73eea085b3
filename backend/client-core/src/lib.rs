pub mod client;
pub mod coordinator;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod query;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{AskClient, ClientConfig};
pub use query::{Mode, QueryRequest, SearchFocus};

pub const ASK_HOST: &str = "www.perplexity.ai";
pub const ASK_HTTP_BASE_URL: &str = const_format::concatcp!("https://", ASK_HOST);
pub const ASK_WS_BASE_URL: &str = const_format::concatcp!("wss://", ASK_HOST);

/// Client identification header trio expected by the ask endpoint.
pub const USER_AGENT: &str = "Ask/2.9.1/2406 (iOS; iPhone; Version 17.1) isiOSOnMac/false";
pub const CLIENT_NAME_HEADER: (&str, &str) = ("X-Client-Name", "Perplexity-iOS");
pub const API_CLIENT_HEADER: (&str, &str) = ("X-App-ApiClient", "ios");
