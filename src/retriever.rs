// =============================================================================
// retriever.rs - THE ONE WHO ACTUALLY TALKS TO THE INTERNET
// =============================================================================
//
// The fetch orchestrator doesn't know what HTTP is, and it likes it that
// way. It asks a Retriever for the contents of a source and gets back either
// a string or a failure. Which failure doesn't matter: DNS, TLS, 404, 503,
// a server that answers in Morse code, all of it means "no content".
//
// The HTTP implementation is reqwest with a timeout and an honest
// User-Agent. That timeout belongs to the retriever, not the orchestrator;
// the orchestrator only knows about its own deadline.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::RetrieveError;

/// Something that can turn a source identifier into raw ads.txt text.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, source: &str) -> Result<String, RetrieveError>;
}

/// reqwest-backed [`Retriever`]. Plain GET, any non-2xx is a failure.
#[derive(Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, RetrieveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(RetrieveError::Client)?;
        Ok(Self { client })
    }

    pub fn from_config(config: &Config) -> Result<Self, RetrieveError> {
        Self::new(config.request_timeout, &config.user_agent)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, source: &str) -> Result<String, RetrieveError> {
        let url = url::Url::parse(source).map_err(|e| RetrieveError::InvalidUrl {
            url: source.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!(source = source, status = status.as_u16(), "Non-success HTTP status");
            return Err(RetrieveError::Status {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(RetrieveError::Body)
    }
}
