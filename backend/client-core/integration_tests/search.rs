use crate::helpers::{ScriptedSocketServer, mock_handshake_server, test_config};

use client_core::client::AskClient;
use client_core::error::CoreError;
use client_core::error::query::QueryError;
use client_core::query::QueryRequest;
use client_core::session::SessionStore;

use common::CookieSet;

use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::MockServer;

async fn connect_client() -> (MockServer, ScriptedSocketServer, TempDir, AskClient) {
    let http = mock_handshake_server().await;
    let socket = ScriptedSocketServer::start().await;
    let store_dir = TempDir::new().expect("temp dir");

    let config = test_config(&http, &socket, &store_dir);
    let client = AskClient::connect(config).await.expect("client connects");

    (http, socket, store_dir, client)
}

/// **VALUE**: Verifies the full scripted answer sequence: keepalive answered,
/// partial decoded, completion decoded and returned synchronously.
///
/// **WHY THIS MATTERS**: This is the product's one job. Everything between
/// the upgrade probe and the decoded `answer` field has to line up for a
/// single query to work end to end.
///
/// **BUG THIS CATCHES**: Would catch a broken envelope (server would never
/// have answered), an unanswered keepalive, the nested `text` left encoded,
/// or `search_sync` returning a partial instead of the completion.
#[tokio::test]
async fn given_scripted_answer_sequence_when_search_sync_then_final_answer_decoded() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let request = QueryRequest::new("What is the capital of France?");

    let drive = async {
        let (prefix, body) = socket.recv_query_envelope().await;
        assert_eq!(prefix, 422, "first envelope prefix of a fresh session");
        assert_eq!(body[0], "perplexity_ask");
        assert_eq!(body[1], "What is the capital of France?");

        // Keepalive in the middle of the query cycle.
        socket.send("2");
        socket.send(
            r#"42["message",{"mode":"concise","final":false,"text":"{\"answer\":\"Paris is\"}"}]"#,
        );
        socket.send(
            r#"42["message",{"mode":"concise","status":"completed","uuid":"u-1","text":"{\"answer\":\"Paris is the capital of France.\"}"}]"#,
        );

        assert_eq!(socket.recv_frame().await, "3", "keepalive answered with pong");
    };

    let (result, _) = tokio::join!(client.search_sync(request), drive);
    let result = result.expect("search_sync succeeds");

    assert_eq!(result["answer"], "Paris is the capital of France.");
    assert!(client.connected());
}

/// **VALUE**: Verifies stale acknowledgments for a completed query never
/// surface in a later query's stream.
///
/// **WHY THIS MATTERS**: The server acknowledges completions after the fact.
/// Without uuid suppression the next query would terminate instantly with
/// the previous answer's leftovers.
///
/// **BUG THIS CATCHES**: Would catch losing `last_completed_uuid` across
/// cycles or appending suppressed payloads anyway.
#[tokio::test]
async fn given_stale_ack_when_next_search_streams_then_suppressed() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let drive_first = async {
        socket.recv_query_envelope().await;
        socket.send(
            r#"42["message",{"mode":"concise","status":"completed","uuid":"u-1","text":"{\"answer\":\"first\"}"}]"#,
        );
    };
    let (first, _) = tokio::join!(client.search_sync(QueryRequest::new("first")), drive_first);
    assert_eq!(first.expect("first query")["answer"], "first");

    // Second cycle: the stale ack for u-1 lands before the real completion.
    let drive_second = async {
        let (prefix, _body) = socket.recv_query_envelope().await;
        assert_eq!(prefix, 423);
        socket.send(r#"430[{"uuid":"u-1","leftover":true}]"#);
        socket.send(
            r#"42["message",{"mode":"concise","status":"completed","uuid":"u-2","text":"{\"answer\":\"second\"}"}]"#,
        );
    };
    let (stream, _) = tokio::join!(client.search(QueryRequest::new("second")), drive_second);
    let items = stream.expect("second query").collect().await;

    assert_eq!(items.len(), 1, "stale ack must not appear: {items:?}");
    assert_eq!(items[0]["answer"], "second");
}

#[tokio::test]
async fn given_query_in_flight_when_second_submitted_then_concurrent_request_error() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let _stream = client
        .search(QueryRequest::new("first"))
        .await
        .expect("first query submits");
    socket.recv_query_envelope().await;

    let second = client.search_sync(QueryRequest::new("second")).await;
    assert!(matches!(
        second,
        Err(CoreError::Query(QueryError::ConcurrentRequest { .. }))
    ));
}

/// **VALUE**: Verifies a timed-out query yields the sentinel and leaves the
/// session immediately usable.
///
/// **WHY THIS MATTERS**: Timeouts are routine (the server simply never
/// completes some queries); they must degrade to a sentinel value, not an
/// error or a wedged coordinator.
///
/// **BUG THIS CATCHES**: Would catch timeout surfacing as `Err`, or the
/// next submit failing with a concurrent-request error.
#[tokio::test]
async fn given_silent_server_when_timed_out_then_sentinel_and_next_query_succeeds() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let result = client
        .search_sync_with_timeout(QueryRequest::new("slow"), Duration::from_millis(100))
        .await
        .expect("timeout is not an error");
    assert_eq!(result, json!({"error": "timeout"}));

    socket.recv_query_envelope().await;

    let drive = async {
        socket.recv_query_envelope().await;
        socket.send(
            r#"42["message",{"mode":"concise","status":"completed","uuid":"u-9","text":"{\"answer\":\"recovered\"}"}]"#,
        );
    };
    let (result, _) = tokio::join!(client.search_sync(QueryRequest::new("next")), drive);
    assert_eq!(result.expect("next query")["answer"], "recovered");
}

/// **VALUE**: Verifies validation failures never reach the socket.
///
/// **WHY THIS MATTERS**: The caller contract promises fail-fast with no
/// network access on invalid parameters; the double proves the "no network"
/// half, not just the error type.
///
/// **BUG THIS CATCHES**: Would catch validating after submit/encode, which
/// would leak a doomed envelope or wedge the coordinator.
#[tokio::test]
async fn given_too_many_attachments_when_searched_then_no_socket_traffic() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let mut request = QueryRequest::new("q");
    request.attachments = (0..5).map(|i| format!("https://example.org/{i}")).collect();

    let result = client.search_sync(request).await;
    assert!(matches!(
        result,
        Err(CoreError::Query(QueryError::Validation { .. }))
    ));

    socket.expect_silence(Duration::from_millis(200)).await;

    // The failed validation left the coordinator idle.
    let drive = async {
        socket.recv_query_envelope().await;
        socket.send(
            r#"42["message",{"mode":"concise","status":"completed","uuid":"u-3","text":"{\"answer\":\"ok\"}"}]"#,
        );
    };
    let (result, _) = tokio::join!(client.search_sync(QueryRequest::new("valid")), drive);
    assert_eq!(result.expect("valid query")["answer"], "ok");
}

#[tokio::test]
async fn given_partial_results_when_streamed_then_arrival_order_preserved() {
    let (_http, mut socket, _store_dir, client) = connect_client().await;
    socket.expect_upgrade_probe().await;

    let drive = async {
        socket.recv_query_envelope().await;
        socket.send(r#"42["message",{"chunk":1,"final":false}]"#);
        socket.send(r#"42["message",{"chunk":2,"final":false}]"#);
        socket.send(r#"42["message",{"chunk":3,"status":"completed","uuid":"u-4"}]"#);
    };
    let (stream, _) = tokio::join!(client.search(QueryRequest::new("stream")), drive);
    let items = stream.expect("query submits").collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["chunk"], 1);
    assert_eq!(items[1]["chunk"], 2);
    assert_eq!(items[2]["chunk"], 3);
}

/// **VALUE**: Verifies the authenticated path recovers persisted cookies and
/// refreshes them at close.
///
/// **WHY THIS MATTERS**: Cookie recovery is what spares a restarted process
/// the manual email-link login; the close-time refresh is what keeps the
/// stored set current.
///
/// **BUG THIS CATCHES**: Would catch skipping recovery, or close forgetting
/// to write the session's accumulated cookies back.
#[tokio::test]
async fn given_persisted_account_when_connected_and_closed_then_cookies_refreshed() {
    let http = mock_handshake_server().await;
    let socket = ScriptedSocketServer::start().await;
    let store_dir = TempDir::new().expect("temp dir");

    let store_path = store_dir.path().join("session.json");
    let mut saved = CookieSet::new();
    saved.insert("auth-token", "tok123");
    SessionStore::new(&store_path)
        .persist("user@example.org", &saved)
        .expect("seed store");

    let mut config = test_config(&http, &socket, &store_dir);
    config.account = Some("user@example.org".to_string());

    // No link source needed: the seeded store satisfies the account path.
    let client = AskClient::connect(config).await.expect("client connects");
    assert_eq!(client.session().cookies.get("auth-token"), Some("tok123"));

    client.close().await.expect("close persists");

    let refreshed = SessionStore::new(&store_path)
        .recover("user@example.org")
        .expect("store readable")
        .expect("entry exists");
    assert_eq!(refreshed.get("auth-token"), Some("tok123"));
    assert_eq!(
        refreshed.get("handshake"),
        Some("ok"),
        "handshake cookies join the persisted set"
    );
}
