//! Wire framing for the multiplexed text protocol.
//!
//! Pure functions: no I/O, no shared state. The transport hands every raw
//! frame to [`decode`] and the client hands outgoing queries to
//! [`encode_query`]; everything here operates on strings and
//! `serde_json::Value`.
//!
//! Frame prefixes on the socket:
//! - `"2"` — server keepalive ping (the transport answers `"3"`)
//! - `"42" + json` — event frame; the second array element is the content
//! - `"43" + digit + json` — acknowledgment frame; a single ack-id digit
//!   follows the tag, then the array whose first element is the payload
//! - client → server query envelopes carry a numeric prefix issued by
//!   [`SequenceCounter`]

use crate::error::query::QueryError;
use crate::query::{Mode, QueryRequest, SearchFocus};

use common::ErrorLocation;

use std::panic::Location;

use log::{trace, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Event name carried by every query envelope.
pub const QUERY_EVENT: &str = "perplexity_ask";

/// Keepalive ping as it appears on the wire.
pub const KEEPALIVE_FRAME: &str = "2";

/// Pong the client must answer a keepalive with.
pub const KEEPALIVE_REPLY: &str = "3";

const PROTOCOL_VERSION: &str = "2.1";
const SOURCE_TAG: &str = "default";
const TIMEZONE: &str = "CET";
const EVENT_TAG: &str = "42";
const ACK_TAG: &str = "43";
// Tag plus the single ack-id digit.
const ACK_HEADER_LEN: usize = 3;

const MODE_FIELD: &str = "mode";
const TEXT_FIELD: &str = "text";
const COPILOT_ANSWER_FIELD: &str = "copilot_answer";
const FINAL_FIELD: &str = "final";
const STATUS_FIELD: &str = "status";
const UUID_FIELD: &str = "uuid";
const STATUS_COMPLETED: &str = "completed";

/// Generator for the numeric envelope prefixes of a session.
///
/// The counter walks 1..9 and rolls the multiplier by ten when it would pass
/// nine. Treat the output as an opaque per-session identifier sequence, not a
/// count of completed queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    n: u64,
    base: u64,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { n: 1, base: 420 }
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next query and return its envelope prefix.
    pub fn advance(&mut self) -> u64 {
        if self.n == 9 {
            self.n = 0;
            self.base *= 10;
        } else {
            self.n += 1;
        }
        self.base + self.n
    }
}

/// A decoded inbound frame the coordinator can act on.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    /// Server ping; answered by the transport, never queued.
    Keepalive,

    /// Intermediate result for the in-flight query.
    Partial { content: Value },

    /// Terminal, fully-assembled answer for the in-flight query.
    Final {
        content: Value,
        uuid: Option<String>,
    },

    /// Server acknowledgment; a terminal signal unless it duplicates the
    /// previous cycle's completion uuid (the coordinator decides).
    Ack {
        payload: Value,
        uuid: Option<String>,
    },
}

#[derive(Serialize)]
struct EnvelopeParams<'a> {
    version: &'static str,
    source: &'static str,
    frontend_session_id: &'a Uuid,
    language: &'a str,
    timezone: &'static str,
    attachments: &'a [String],
    search_focus: SearchFocus,
    frontend_uuid: &'a Uuid,
    mode: Mode,
    in_page: Option<&'a str>,
    in_domain: Option<&'a str>,
}

/// Encode a query into its wire envelope.
///
/// The envelope is the numeric prefix followed by the JSON array
/// `[event, query, params]`.
#[track_caller]
pub fn encode_query(
    request: &QueryRequest,
    prefix: u64,
    frontend_session_id: &Uuid,
) -> Result<String, QueryError> {
    let params = EnvelopeParams {
        version: PROTOCOL_VERSION,
        source: SOURCE_TAG,
        frontend_session_id,
        language: &request.language,
        timezone: TIMEZONE,
        attachments: &request.attachments,
        search_focus: request.resolved_focus(),
        frontend_uuid: &request.request_id,
        mode: request.mode,
        in_page: request.in_page.as_deref(),
        in_domain: request.in_domain.as_deref(),
    };

    let body = serde_json::to_string(&(QUERY_EVENT, &request.query, params)).map_err(|e| {
        QueryError::Encode {
            message: format!("failed to encode query envelope: {e}"),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    Ok(format!("{prefix}{body}"))
}

/// Decode one raw inbound frame.
///
/// Returns `None` for frames that carry nothing deliverable: foreign
/// prefixes (including the `3probe` upgrade ack), terminal markers without a
/// payload, and malformed frames (logged at warn, never fatal — one bad
/// server frame must not kill the session).
pub fn decode(raw: &str) -> Option<IncomingEvent> {
    if raw == KEEPALIVE_FRAME {
        return Some(IncomingEvent::Keepalive);
    }

    if let Some(body) = raw.strip_prefix(EVENT_TAG) {
        // Guard against the ack tag also matching "42"-prefixed checks: the
        // tags are distinct, so order here is just dispatch.
        return decode_event(body);
    }

    if raw.starts_with(ACK_TAG) && raw.len() > ACK_HEADER_LEN {
        return decode_ack(&raw[ACK_HEADER_LEN..]);
    }

    trace!("ignoring frame with foreign prefix: {:.8}...", raw);
    None
}

fn decode_event(body: &str) -> Option<IncomingEvent> {
    let frame: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed event frame: {e}");
            return None;
        }
    };

    let mut content = match frame.as_array().and_then(|a| a.get(1)) {
        Some(c) => c.clone(),
        None => {
            warn!("event frame without content element");
            return None;
        }
    };

    expand_text_field(&mut content);

    let completed =
        content.get(STATUS_FIELD).and_then(Value::as_str) == Some(STATUS_COMPLETED);
    let is_final = content
        .get(FINAL_FIELD)
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if completed {
        let uuid = content
            .get(UUID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(IncomingEvent::Final { content, uuid })
    } else if !is_final {
        Some(IncomingEvent::Partial { content })
    } else {
        // Intermediate terminal marker with no payload value.
        trace!("discarding final frame without completed status");
        None
    }
}

/// Expand the nested JSON carried in the content's `text` field.
///
/// Copilot answers land under `copilot_answer`; for any other mode the
/// decoded fields are merged into the content and the raw `text` dropped.
/// Content without a `mode` field passes through untouched.
fn expand_text_field(content: &mut Value) {
    let Some(mode) = content.get(MODE_FIELD).and_then(Value::as_str) else {
        return;
    };

    let Some(text) = content.get(TEXT_FIELD).and_then(Value::as_str) else {
        return;
    };

    let decoded: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("content text is not valid JSON, delivering unmodified: {e}");
            return;
        }
    };

    if mode == Mode::Copilot.as_str() {
        content[COPILOT_ANSWER_FIELD] = decoded;
        return;
    }

    if let (Some(object), Some(fields)) = (content.as_object_mut(), decoded.as_object()) {
        for (key, value) in fields {
            object.insert(key.clone(), value.clone());
        }
        object.remove(TEXT_FIELD);
    }
}

fn decode_ack(body: &str) -> Option<IncomingEvent> {
    let frame: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed acknowledgment frame: {e}");
            return None;
        }
    };

    let payload = match frame.as_array().and_then(|a| a.first()) {
        Some(p) => p.clone(),
        None => {
            warn!("acknowledgment frame without payload element");
            return None;
        }
    };

    let uuid = payload
        .get(UUID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(IncomingEvent::Ack { payload, uuid })
}
