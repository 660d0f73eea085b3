// Unit tests for query validation
// Everything here is pure: a rejected request never had a socket to touch

use crate::error::query::QueryError;
use crate::query::{MAX_ATTACHMENTS, Mode, QueryRequest, SearchFocus};

use std::str::FromStr;

// ============================================
// ENUMERATION PARSING
// ============================================

/// **VALUE**: Verifies unknown modes are rejected at parse time.
///
/// **WHY THIS MATTERS**: Mode validation is the contract's fail-fast gate:
/// an invalid mode must fail before any network I/O. Parsing is where
/// text-driven callers (a chat relay forwarding user input) hit it.
///
/// **BUG THIS CATCHES**: Would catch accepting arbitrary mode strings and
/// shipping them to the server, which answers with silence, not an error.
#[test]
fn given_unknown_mode_when_parsed_then_validation_error() {
    let result = Mode::from_str("detailed");
    assert!(matches!(result, Err(QueryError::Validation { .. })));

    assert_eq!(Mode::from_str("concise").unwrap(), Mode::Concise);
    assert_eq!(Mode::from_str("copilot").unwrap(), Mode::Copilot);
}

#[test]
fn given_unknown_focus_when_parsed_then_validation_error() {
    assert!(matches!(
        SearchFocus::from_str("darkweb"),
        Err(QueryError::Validation { .. })
    ));

    assert_eq!(SearchFocus::from_str("wolfram").unwrap(), SearchFocus::Wolfram);
    assert_eq!(SearchFocus::from_str("reddit").unwrap(), SearchFocus::Reddit);
}

#[test]
fn given_target_only_focus_when_parsed_then_rejected() {
    // in_page/in_domain are resolved from targets, never caller-selected.
    assert!(SearchFocus::from_str("in_page").is_err());
    assert!(SearchFocus::from_str("in_domain").is_err());
}

#[test]
fn given_enums_when_serialized_then_wire_names_match_protocol() {
    assert_eq!(serde_json::to_value(Mode::Copilot).unwrap(), "copilot");
    assert_eq!(serde_json::to_value(SearchFocus::InPage).unwrap(), "in_page");
    assert_eq!(serde_json::to_value(SearchFocus::Youtube).unwrap(), "youtube");
}

// ============================================
// ATTACHMENT BOUND
// ============================================

/// **VALUE**: Verifies the attachment bound is enforced at build time.
///
/// **WHY THIS MATTERS**: The server caps attachments at four; a fifth must
/// fail locally with no I/O rather than poison the query on the wire.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one in the bound or a
/// builder path that skips validation.
#[test]
fn given_five_attachments_when_built_then_validation_error() {
    let attachments: Vec<String> = (0..MAX_ATTACHMENTS + 1)
        .map(|i| format!("https://example.org/{i}"))
        .collect();

    let result = QueryRequest::builder("q").with_attachments(attachments).build();
    assert!(matches!(result, Err(QueryError::Validation { .. })));
}

#[test]
fn given_exactly_four_attachments_when_built_then_ok() {
    let attachments: Vec<String> = (0..MAX_ATTACHMENTS)
        .map(|i| format!("https://example.org/{i}"))
        .collect();

    let request = QueryRequest::builder("q")
        .with_attachments(attachments)
        .build()
        .expect("four attachments are allowed");
    assert_eq!(request.attachments.len(), MAX_ATTACHMENTS);
}

// ============================================
// FOCUS RESOLUTION & DEFAULTS
// ============================================

#[test]
fn given_page_and_domain_targets_when_resolved_then_domain_wins() {
    let page_only = QueryRequest::builder("q")
        .with_in_page("https://example.org/a")
        .build()
        .unwrap();
    assert_eq!(page_only.resolved_focus(), SearchFocus::InPage);

    let both = QueryRequest::builder("q")
        .with_in_page("https://example.org/a")
        .with_in_domain("example.org")
        .build()
        .unwrap();
    assert_eq!(both.resolved_focus(), SearchFocus::InDomain);
}

#[test]
fn given_plain_request_when_created_then_defaults_apply() {
    let request = QueryRequest::new("q");

    assert_eq!(request.mode, Mode::Concise);
    assert_eq!(request.search_focus, SearchFocus::Internet);
    assert_eq!(request.resolved_focus(), SearchFocus::Internet);
    assert_eq!(request.language, "en-GB");
    assert!(request.attachments.is_empty());
}

#[test]
fn given_two_requests_when_created_then_request_ids_differ() {
    assert_ne!(QueryRequest::new("a").request_id, QueryRequest::new("b").request_id);
}
