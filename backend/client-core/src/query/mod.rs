//! Query parameters and pre-flight validation.
//!
//! Every field is validated before any network I/O happens: the enumerations
//! reject unknown members at parse time and the builder enforces the
//! attachment bound, so an invalid request can never reach the socket.

use crate::error::query::QueryError;

use common::ErrorLocation;

use std::fmt;
use std::panic::Location;
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

/// Upper bound on attachment references per query.
pub const MAX_ATTACHMENTS: usize = 4;

/// Language tag sent when the caller does not pick one.
pub const DEFAULT_LANGUAGE: &str = "en-GB";

/// Answer mode requested from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Concise,
    Copilot,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Concise => "concise",
            Mode::Copilot => "copilot",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concise" => Ok(Mode::Concise),
            "copilot" => Ok(Mode::Copilot),
            other => Err(QueryError::Validation {
                message: format!("invalid mode: {other:?} (expected concise or copilot)"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// Search focus requested from the server.
///
/// Callers may select the first six members. `InPage` and `InDomain` are not
/// caller-selectable: they are resolved from the optional page/domain targets
/// on the request (see [`QueryRequest::resolved_focus`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFocus {
    #[default]
    Internet,
    Scholar,
    Writing,
    Wolfram,
    Youtube,
    Reddit,
    InPage,
    InDomain,
}

impl SearchFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchFocus::Internet => "internet",
            SearchFocus::Scholar => "scholar",
            SearchFocus::Writing => "writing",
            SearchFocus::Wolfram => "wolfram",
            SearchFocus::Youtube => "youtube",
            SearchFocus::Reddit => "reddit",
            SearchFocus::InPage => "in_page",
            SearchFocus::InDomain => "in_domain",
        }
    }
}

impl fmt::Display for SearchFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchFocus {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internet" => Ok(SearchFocus::Internet),
            "scholar" => Ok(SearchFocus::Scholar),
            "writing" => Ok(SearchFocus::Writing),
            "wolfram" => Ok(SearchFocus::Wolfram),
            "youtube" => Ok(SearchFocus::Youtube),
            "reddit" => Ok(SearchFocus::Reddit),
            other => Err(QueryError::Validation {
                message: format!(
                    "invalid search focus: {other:?} (expected one of internet, scholar, \
                     writing, wolfram, youtube, reddit)"
                ),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// A single validated query.
///
/// `request_id` is the client-generated frontend UUID carried in the wire
/// envelope; it is minted once per request at construction time.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub mode: Mode,
    pub search_focus: SearchFocus,
    pub attachments: Vec<String>,
    pub language: String,
    pub in_page: Option<String>,
    pub in_domain: Option<String>,
    pub request_id: Uuid,
}

impl QueryRequest {
    /// Create a request with default parameters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: Mode::default(),
            search_focus: SearchFocus::default(),
            attachments: Vec::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            in_page: None,
            in_domain: None,
            request_id: Uuid::new_v4(),
        }
    }

    /// Start building a request with non-default parameters.
    pub fn builder(query: impl Into<String>) -> QueryRequestBuilder {
        QueryRequestBuilder {
            request: Self::new(query),
        }
    }

    /// The search focus actually sent on the wire.
    ///
    /// A page target narrows the focus to `in_page`; a domain target narrows
    /// it to `in_domain` and wins when both targets are set.
    pub fn resolved_focus(&self) -> SearchFocus {
        if self.in_domain.is_some() {
            SearchFocus::InDomain
        } else if self.in_page.is_some() {
            SearchFocus::InPage
        } else {
            self.search_focus
        }
    }

    /// Validate field bounds. Called by the client before any I/O.
    #[track_caller]
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.attachments.len() > MAX_ATTACHMENTS {
            return Err(QueryError::Validation {
                message: format!(
                    "too many attachments: {} (maximum {MAX_ATTACHMENTS})",
                    self.attachments.len()
                ),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(())
    }
}

/// Builder for [`QueryRequest`] with validation at `build` time.
#[derive(Debug)]
pub struct QueryRequestBuilder {
    request: QueryRequest,
}

impl QueryRequestBuilder {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.request.mode = mode;
        self
    }

    pub fn with_search_focus(mut self, focus: SearchFocus) -> Self {
        self.request.search_focus = focus;
        self
    }

    pub fn with_attachment(mut self, reference: impl Into<String>) -> Self {
        self.request.attachments.push(reference.into());
        self
    }

    pub fn with_attachments(mut self, references: Vec<String>) -> Self {
        self.request.attachments = references;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.request.language = language.into();
        self
    }

    pub fn with_in_page(mut self, page: impl Into<String>) -> Self {
        self.request.in_page = Some(page.into());
        self
    }

    pub fn with_in_domain(mut self, domain: impl Into<String>) -> Self {
        self.request.in_domain = Some(domain.into());
        self
    }

    /// Build the request, enforcing the attachment bound.
    #[track_caller]
    pub fn build(self) -> Result<QueryRequest, QueryError> {
        self.request.validate()?;
        Ok(self.request)
    }
}
