//! End-to-end client wiring.
//!
//! `AskClient::connect` runs the whole startup sequence: cookie recovery or
//! sign-in, the polling handshake, the socket upgrade, and the bounded wait
//! for transport readiness. Afterwards `search`/`search_sync` are the only
//! caller-facing operations; both validate the request before any I/O.

use crate::coordinator::{RequestCoordinator, ResultStream};
use crate::error::CoreError;
use crate::frame;
use crate::handshake::{LinkSource, SessionNegotiator};
use crate::query::QueryRequest;
use crate::session::{Session, SessionStore};
use crate::transport::{DEFAULT_CONNECT_BOUND, TransportConnection};
use crate::{ASK_HTTP_BASE_URL, ASK_WS_BASE_URL};

use common::CookieSet;

use std::time::Duration;

use log::warn;
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

/// Per-query timeout when the caller does not pick one.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection parameters.
///
/// The defaults target the production host; tests point both bases at local
/// doubles.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub http_base: Url,
    pub ws_base: Url,

    /// Account identifier for the authenticated path. `None` stays
    /// anonymous.
    pub account: Option<String>,

    /// Where authentication cookies persist across restarts.
    pub store: SessionStore,

    pub query_timeout: Duration,
    pub connect_bound: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_base: Url::parse(ASK_HTTP_BASE_URL).expect("valid base url"),
            ws_base: Url::parse(ASK_WS_BASE_URL).expect("valid base url"),
            account: None,
            store: SessionStore::default_location(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            connect_bound: DEFAULT_CONNECT_BOUND,
        }
    }
}

/// Client for the realtime ask protocol.
///
/// One outstanding query at a time; a second submit while one is in flight
/// fails with [`QueryError::ConcurrentRequest`](crate::error::query::QueryError).
pub struct AskClient {
    session: Session,
    transport: TransportConnection,
    coordinator: RequestCoordinator,
    store: SessionStore,
    account: Option<String>,
    query_timeout: Duration,
}

impl AskClient {
    /// Connect anonymously (or with previously persisted cookies).
    pub async fn connect(config: ClientConfig) -> Result<Self, CoreError> {
        Self::connect_with(config, None).await
    }

    /// Connect, signing in through `link_source` when the configured account
    /// has no persisted cookies.
    pub async fn connect_with(
        config: ClientConfig,
        link_source: Option<&dyn LinkSource>,
    ) -> Result<Self, CoreError> {
        let negotiator = SessionNegotiator::new(config.http_base.clone())?;

        let mut cookies = CookieSet::new();
        if let Some(account) = &config.account {
            match config.store.recover(account)? {
                Some(saved) => cookies = saved,
                None => {
                    negotiator.warm_up(&mut cookies).await?;
                    match link_source {
                        Some(source) => {
                            negotiator.login(account, source, &mut cookies).await?;
                            config.store.persist(account, &cookies)?;
                        }
                        None => {
                            warn!("account configured without a link source, staying anonymous");
                        }
                    }
                }
            }
        } else {
            negotiator.warm_up(&mut cookies).await?;
        }

        let session = negotiator.negotiate(cookies).await?;

        let coordinator = RequestCoordinator::new();
        let transport =
            TransportConnection::open(&session, &config.ws_base, coordinator.clone()).await?;

        // No query may be sent before the transport reports connected.
        transport.wait_connected(config.connect_bound).await?;

        Ok(Self {
            session,
            transport,
            coordinator,
            store: config.store,
            account: config.account,
            query_timeout: config.query_timeout,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    /// Submit a query and stream its results as they arrive.
    ///
    /// The returned sequence is finite and not restartable; on timeout it
    /// yields the `{"error":"timeout"}` sentinel once and ends.
    pub async fn search(&self, request: QueryRequest) -> Result<ResultStream, CoreError> {
        self.search_with_timeout(request, self.query_timeout).await
    }

    pub async fn search_with_timeout(
        &self,
        request: QueryRequest,
        timeout: Duration,
    ) -> Result<ResultStream, CoreError> {
        let deadline = self.start_query(&request, timeout).await?;
        Ok(self.coordinator.pull_streaming(deadline))
    }

    /// Submit a query and block until its terminal result.
    ///
    /// Returns the final content map, or the `timeout` / `no_result`
    /// sentinel values — never an error once the query is on the wire, so
    /// the session stays usable.
    pub async fn search_sync(&self, request: QueryRequest) -> Result<Value, CoreError> {
        self.search_sync_with_timeout(request, self.query_timeout).await
    }

    pub async fn search_sync_with_timeout(
        &self,
        request: QueryRequest,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let deadline = self.start_query(&request, timeout).await?;
        Ok(self.coordinator.pull_sync(deadline).await)
    }

    /// Validate, open the cycle, encode and hand the envelope to the
    /// transport. The timeout clock starts at submission.
    async fn start_query(
        &self,
        request: &QueryRequest,
        timeout: Duration,
    ) -> Result<Instant, CoreError> {
        request.validate()?;

        let prefix = self.coordinator.submit().await?;
        let deadline = Instant::now() + timeout;

        let envelope =
            match frame::encode_query(request, prefix, &self.session.frontend_session_id) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.coordinator.force_idle().await;
                    return Err(e.into());
                }
            };

        if let Err(e) = self.transport.send(envelope).await {
            self.coordinator.force_idle().await;
            return Err(e.into());
        }

        Ok(deadline)
    }

    /// Close the transport and persist cookies for the configured account.
    pub async fn close(&self) -> Result<(), CoreError> {
        self.transport.close().await;

        if let Some(account) = &self.account {
            self.store.persist(account, &self.session.cookies)?;
        }

        Ok(())
    }
}
