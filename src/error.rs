// =============================================================================
// error.rs - EVERYTHING THAT CAN GO WRONG (AND MOSTLY DOESN'T MATTER)
// =============================================================================
//
// There are exactly two hard errors in this crate:
//
// 1. Somebody handed the parser an empty string.
// 2. Somebody asked the fetcher to fetch nothing.
//
// Everything else (dead servers, 404s, lines that look like nothing we've
// ever seen) degrades to "less data" instead of "no data". A publisher whose
// ads.txt won't load still gets a document in the results, it's just an
// empty one.
// =============================================================================

use thiserror::Error;

use crate::models::AdsTxt;

/// Errors returned by [`crate::parser::parse`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text blob was empty. The document is still handed back (source
    /// set, no records) because callers are allowed to keep using it.
    #[error("given an empty string for {}; nothing to parse", .document.source())]
    EmptyInput { document: Box<AdsTxt> },
}

impl ParseError {
    /// Recover the (unpopulated) document that came along with the error.
    pub fn into_document(self) -> AdsTxt {
        match self {
            ParseError::EmptyInput { document } => *document,
        }
    }
}

/// Errors returned by [`crate::fetcher::fetch_all`]. Only pre-flight
/// validation lives here; per-source failures never surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("no sources supplied; nothing to do")]
    NoSources,
}

/// Failure reported by a [`crate::retriever::Retriever`]. The orchestrator
/// treats every variant the same way: no content for that source.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("non-success HTTP status {status}")]
    Status { status: u16 },

    #[error("failed to read response body: {0}")]
    Body(reqwest::Error),
}
