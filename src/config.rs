// =============================================================================
// config.rs - THE KNOBS
// =============================================================================
//
// Fewer knobs than you'd expect. Where to look, how long to wait, what to
// call ourselves, and how loud to be about it.
//
// All values can be overridden via environment variables prefixed with
// ADSTXT_, and a .env file is honored if one is lying around.
// =============================================================================

use std::env;
use std::time::Duration;

/// Every tunable parameter for a batch fetch.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sources to fetch. URLs are kept verbatim; bare domains become
    /// `http://<domain>/ads.txt`.
    pub sources: Vec<String>,

    /// Overall deadline for the whole batch. Whatever has arrived by then
    /// is what you get. Default: 5000ms.
    pub deadline: Duration,

    /// Per-request timeout inside the HTTP retriever. The orchestrator never
    /// looks at this; it exists so abandoned tasks eventually give up too.
    /// Default: 30s.
    pub request_timeout: Duration,

    /// User-Agent sent with every request. Be honest, ad ops people read logs.
    pub user_agent: String,

    /// `pretty` or `json`.
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        // Fail silently if there's no .env; not everyone has one.
        let _ = dotenvy::dotenv();

        Config {
            sources: parse_sources(&env_or_default("ADSTXT_SOURCES", "")),
            deadline: Duration::from_millis(
                env_or_default("ADSTXT_DEADLINE_MS", "5000").parse().unwrap_or(5000),
            ),
            request_timeout: Duration::from_secs(
                env_or_default("ADSTXT_REQUEST_TIMEOUT_SECS", "30").parse().unwrap_or(30),
            ),
            user_agent: env_or_default(
                "ADSTXT_USER_AGENT",
                concat!("adstxt-engine/", env!("CARGO_PKG_VERSION")),
            ),
            log_format: LogFormat::parse(&env_or_default("ADSTXT_LOG_FORMAT", "pretty")),
        }
    }

    /// Append extra sources (e.g. from the command line), normalized the
    /// same way as `ADSTXT_SOURCES`.
    pub fn with_extra_sources<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sources.extend(
            extra
                .into_iter()
                .filter_map(|s| normalize_source(s.as_ref())),
        );
        self
    }
}

/// Split a comma-separated source list, dropping blanks.
fn parse_sources(raw: &str) -> Vec<String> {
    raw.split(',').filter_map(normalize_source).collect()
}

/// Anything with a scheme is left alone. Anything else is treated as a
/// publisher domain and pointed at its root ads.txt.
fn normalize_source(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        return Some(trimmed.to_string());
    }
    Some(format!("http://{}/ads.txt", trimmed.trim_end_matches('/')))
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources_normalizes_bare_domains() {
        let sources = parse_sources(" avclub.com , https://www.ayan.net/ads.txt,, rtl.be/ ");
        assert_eq!(
            sources,
            vec![
                "http://avclub.com/ads.txt".to_string(),
                "https://www.ayan.net/ads.txt".to_string(),
                "http://rtl.be/ads.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_empty_source_list() {
        assert!(parse_sources("").is_empty());
        assert!(parse_sources(" , ,").is_empty());
    }

    #[test]
    fn test_log_format_defaults_to_pretty() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Pretty);
    }

    #[test]
    fn test_extra_sources_are_appended() {
        let config = Config {
            sources: vec!["http://a.com/ads.txt".to_string()],
            deadline: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
            user_agent: "test".to_string(),
            log_format: LogFormat::Pretty,
        }
        .with_extra_sources(["b.com", "  "]);
        assert_eq!(
            config.sources,
            vec!["http://a.com/ads.txt".to_string(), "http://b.com/ads.txt".to_string()]
        );
    }
}
