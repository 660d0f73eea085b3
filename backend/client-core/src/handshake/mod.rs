//! HTTP handshake that yields the transport session.
//!
//! The polling transport endpoint is used exactly twice: once to obtain the
//! session id and once to present the anonymous-access acknowledgment. The
//! negotiation succeeds only if the server answers the acknowledgment with
//! the literal body `OK` — nothing can proceed without anonymous access, so
//! any other body is fatal.
//!
//! Cookies are collected by hand from `Set-Cookie` headers instead of a
//! client-managed jar: the accumulated set must be readable afterwards, both
//! for the WebSocket upgrade header and for persistence across restarts.

pub mod login;

pub use login::LinkSource;

use crate::error::handshake::HandshakeError;
use crate::session::Session;
use crate::{API_CLIENT_HEADER, CLIENT_NAME_HEADER, USER_AGENT};

use common::{CookieSet, ErrorLocation};

use std::panic::Location;
use std::time::Duration;

use log::{debug, info};
use once_cell::sync::Lazy;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const POLLING_PATH: &str = "socket.io/";
const AUTH_SESSION_PATH: &str = "api/auth/session";
const WARMUP_PATH_PREFIX: &str = "search/";

const PROTOCOL_REVISION_PARAM: (&str, &str) = ("EIO", "4");
const POLLING_TRANSPORT_PARAM: (&str, &str) = ("transport", "polling");
const TOKEN_PARAM: &str = "t";
const SID_PARAM: &str = "sid";

const SESSION_ID_FIELD: &str = "sid";
// The polling response body starts with a fixed-length packet-type prefix.
const FRAMING_PREFIX_LEN: usize = 1;

const ANONYMOUS_ACK_PAYLOAD: &str = "40{\"jwt\":\"anonymous-ask-user\"}";
const ANONYMOUS_ACK_RESPONSE: &str = "OK";

static DEFAULT_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(USER_AGENT),
    );
    headers.insert(
        CLIENT_NAME_HEADER.0,
        HeaderValue::from_static(CLIENT_NAME_HEADER.1),
    );
    headers.insert(
        API_CLIENT_HEADER.0,
        HeaderValue::from_static(API_CLIENT_HEADER.1),
    );
    headers
});

/// Performs the handshake against the polling transport endpoint.
pub struct SessionNegotiator {
    http: Client,
    base: Url,
}

impl SessionNegotiator {
    pub fn new(base: Url) -> Result<Self, HandshakeError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .default_headers(DEFAULT_HEADERS.clone())
            .build()?;

        Ok(Self { http, base })
    }

    /// Seed cookies for a fresh anonymous session by browsing one search
    /// page. Failures here are not fatal; the handshake proper decides.
    pub async fn warm_up(&self, cookies: &mut CookieSet) -> Result<(), HandshakeError> {
        let url = self
            .base
            .join(&format!("{WARMUP_PATH_PREFIX}{}", Uuid::new_v4()))?;

        let response = self.with_cookies(self.http.get(url), cookies).send().await?;
        absorb_cookies(cookies, &response);

        debug!("warm-up complete, {} cookies held", cookies.len());
        Ok(())
    }

    /// Run the handshake: transaction token → session id → anonymous-access
    /// acknowledgment → cookie finalization.
    pub async fn negotiate(&self, mut cookies: CookieSet) -> Result<Session, HandshakeError> {
        let transaction_token = random_transaction_token();

        let sid = self.fetch_session_id(&transaction_token, &mut cookies).await?;
        info!("negotiated transport session {sid}");

        self.acknowledge_anonymous(&transaction_token, &sid, &mut cookies)
            .await?;
        self.finalize_auth_session(&mut cookies).await?;

        Ok(Session {
            sid,
            transaction_token,
            frontend_session_id: Uuid::new_v4(),
            cookies,
            anonymous_access: true,
        })
    }

    async fn fetch_session_id(
        &self,
        transaction_token: &str,
        cookies: &mut CookieSet,
    ) -> Result<String, HandshakeError> {
        let url = self.polling_url(transaction_token, None)?;

        let response = self.with_cookies(self.http.get(url), cookies).send().await?;
        absorb_cookies(cookies, &response);

        let body = response.text().await?;
        if body.len() <= FRAMING_PREFIX_LEN {
            return Err(HandshakeError::MalformedSession {
                message: format!("polling response too short: {body:?}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let payload: Value =
            serde_json::from_str(&body[FRAMING_PREFIX_LEN..]).map_err(|e| {
                HandshakeError::MalformedSession {
                    message: format!("polling response is not JSON: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                }
            })?;

        payload
            .get(SESSION_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| HandshakeError::MalformedSession {
                message: "polling response carries no session id".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    async fn acknowledge_anonymous(
        &self,
        transaction_token: &str,
        sid: &str,
        cookies: &mut CookieSet,
    ) -> Result<(), HandshakeError> {
        let url = self.polling_url(transaction_token, Some(sid))?;

        let response = self
            .with_cookies(self.http.post(url), cookies)
            .body(ANONYMOUS_ACK_PAYLOAD)
            .send()
            .await?;
        absorb_cookies(cookies, &response);

        let body = response.text().await?;
        if body != ANONYMOUS_ACK_RESPONSE {
            return Err(HandshakeError::AnonymousAccessDenied {
                body,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        debug!("anonymous access acknowledged for session {sid}");
        Ok(())
    }

    async fn finalize_auth_session(&self, cookies: &mut CookieSet) -> Result<(), HandshakeError> {
        let url = self.base.join(AUTH_SESSION_PATH)?;

        let response = self.with_cookies(self.http.get(url), cookies).send().await?;
        absorb_cookies(cookies, &response);
        Ok(())
    }

    fn polling_url(
        &self,
        transaction_token: &str,
        sid: Option<&str>,
    ) -> Result<Url, HandshakeError> {
        let mut url = self.base.join(POLLING_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(PROTOCOL_REVISION_PARAM.0, PROTOCOL_REVISION_PARAM.1)
                .append_pair(POLLING_TRANSPORT_PARAM.0, POLLING_TRANSPORT_PARAM.1)
                .append_pair(TOKEN_PARAM, transaction_token);
            if let Some(sid) = sid {
                pairs.append_pair(SID_PARAM, sid);
            }
        }
        Ok(url)
    }

    fn with_cookies(&self, request: RequestBuilder, cookies: &CookieSet) -> RequestBuilder {
        if cookies.is_empty() {
            request
        } else {
            request.header(COOKIE, cookies.header_value())
        }
    }
}

/// Generate the random 32-bit hex transaction token for this negotiation.
fn random_transaction_token() -> String {
    format!("{:08x}", rand::random::<u32>())
}

fn absorb_cookies(cookies: &mut CookieSet, response: &Response) {
    for value in response.headers().get_all(SET_COOKIE) {
        if let Ok(header) = value.to_str() {
            cookies.absorb_set_cookie(header);
        }
    }
}
