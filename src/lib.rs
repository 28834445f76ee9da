// =============================================================================
// ADSTXT ENGINE
// =============================================================================
//
// Parses ads.txt files and fetches lots of them at once under a deadline.
//
//   parser   - line-by-line classifier: variables first, buyers second
//   fetcher  - one task per source, bounded channel, deadline-raced collection
//   retriever - the thing that actually does HTTP (swap it out in tests)
// =============================================================================

pub mod config;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod retriever;

pub use error::{FetchError, ParseError, RetrieveError};
pub use fetcher::{fetch_all, missing_sources, FetchContext};
pub use metrics::{FetchMetrics, FetchMetricsSnapshot};
pub use models::{AccountType, AdsTxt, Buyer, Variable};
pub use parser::parse;
pub use retriever::{HttpRetriever, Retriever};
