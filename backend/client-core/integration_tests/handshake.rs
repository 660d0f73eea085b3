use crate::helpers::{TEST_SID, mock_handshake_server};

use client_core::error::handshake::HandshakeError;
use client_core::handshake::SessionNegotiator;

use common::CookieSet;

use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn negotiator_for(server: &MockServer) -> SessionNegotiator {
    let base = Url::parse(&server.uri()).expect("mock server uri");
    SessionNegotiator::new(base).expect("negotiator builds")
}

/// **VALUE**: Verifies the full three-leg handshake against an HTTP double.
///
/// **WHY THIS MATTERS**: The handshake is the only way to obtain a transport
/// session; every field of the resulting `Session` feeds the upgrade. If sid
/// extraction or cookie accumulation breaks, no query ever runs.
///
/// **BUG THIS CATCHES**: Would catch mis-stripping the framing prefix,
/// reading the wrong JSON field, or dropping response cookies between legs.
#[tokio::test]
async fn given_handshake_double_when_negotiated_then_session_with_cookies() {
    let server = mock_handshake_server().await;
    let negotiator = negotiator_for(&server);

    let session = negotiator
        .negotiate(CookieSet::new())
        .await
        .expect("handshake succeeds");

    assert_eq!(session.sid, TEST_SID);
    assert!(session.anonymous_access);
    assert_eq!(session.transaction_token.len(), 8, "32-bit hex token");
    assert_eq!(session.cookies.get("handshake"), Some("ok"));
}

#[tokio::test]
async fn given_warmup_when_browsed_then_cookies_accumulate() {
    let server = mock_handshake_server().await;
    let negotiator = negotiator_for(&server);

    let mut cookies = CookieSet::new();
    negotiator.warm_up(&mut cookies).await.expect("warm-up succeeds");

    assert_eq!(cookies.get("warmup"), Some("1"));
}

/// **VALUE**: Verifies that any acknowledgment body other than `OK` is fatal.
///
/// **WHY THIS MATTERS**: Without anonymous access the session cannot issue
/// queries at all; continuing past a refused acknowledgment would produce a
/// client that connects and then times out on every query.
///
/// **BUG THIS CATCHES**: Would catch treating the check as a warning, or
/// comparing against a trimmed/case-folded body instead of the literal.
#[tokio::test]
async fn given_non_ok_acknowledgment_when_negotiated_then_fatal_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("0{{\"sid\":\"{TEST_SID}\"}}")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
        .mount(&server)
        .await;

    let negotiator = negotiator_for(&server);
    let result = negotiator.negotiate(CookieSet::new()).await;

    match result {
        Err(HandshakeError::AnonymousAccessDenied { body, .. }) => assert_eq!(body, "nope"),
        other => panic!("expected AnonymousAccessDenied, got {other:?}"),
    }
}

#[tokio::test]
async fn given_body_without_sid_when_negotiated_then_malformed_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0{\"unrelated\":true}"))
        .mount(&server)
        .await;

    let negotiator = negotiator_for(&server);
    let result = negotiator.negotiate(CookieSet::new()).await;
    assert!(matches!(result, Err(HandshakeError::MalformedSession { .. })));
}

#[tokio::test]
async fn given_truncated_body_when_negotiated_then_malformed_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("0"))
        .mount(&server)
        .await;

    let negotiator = negotiator_for(&server);
    let result = negotiator.negotiate(CookieSet::new()).await;
    assert!(matches!(result, Err(HandshakeError::MalformedSession { .. })));
}

/// **VALUE**: Verifies the sign-in flow drives the injectable link seam and
/// accumulates cookies from both legs.
///
/// **WHY THIS MATTERS**: The confirmation link only ever exists in a human's
/// inbox; the crate must take it through the seam and still end up with the
/// authenticated cookie set.
///
/// **BUG THIS CATCHES**: Would catch skipping the confirmation fetch, or
/// losing the sign-in cookies when following the link.
#[tokio::test]
async fn given_link_source_when_logged_in_then_cookies_from_both_legs() {
    let server = mock_handshake_server().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signin-email"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "signin=sent"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/confirm"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "auth-token=tok123"))
        .mount(&server)
        .await;

    let negotiator = negotiator_for(&server);
    let link = format!("{}/confirm", server.uri());
    let link_source =
        move |_account: &str| -> Result<String, HandshakeError> { Ok(link.clone()) };

    let mut cookies = CookieSet::new();
    negotiator
        .login("user@example.org", &link_source, &mut cookies)
        .await
        .expect("login succeeds");

    assert_eq!(cookies.get("signin"), Some("sent"));
    assert_eq!(cookies.get("auth-token"), Some("tok123"));
}
