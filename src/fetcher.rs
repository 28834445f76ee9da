// =============================================================================
// fetcher.rs - THE FAN-OUT, FAN-IN, GIVE-UP-ON-TIME MACHINE
// =============================================================================
//
// Given N publisher URLs and a deadline, we:
//
// 1. Spawn one tokio task per source. No throttling, no pool. If you hand us
//    ten thousand URLs you get ten thousand tasks, so maybe don't.
// 2. Each task asks the Retriever for the body and runs the parser over it.
//    A failed retrieval still produces a document: the source identifier
//    and nothing else.
// 3. Every task drops its document into an mpsc channel with exactly N
//    slots. N slots, at most N sends: try_send can never find it full.
// 4. We collect until we have N documents or the context fires, whichever
//    comes first. A fired deadline isn't an error, you just get fewer
//    documents.
//
// Tasks still running when we stop are not cancelled. They finish (or hit
// the retriever's own timeout), find the receiver gone, count themselves
// as late in the metrics, and quietly die. Nothing blocks, nothing leaks.
//
// Results come back in the order the tasks finished, not the order you
// asked. Use missing_sources() to find out who didn't make it.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, ParseError};
use crate::metrics::FetchMetrics;
use crate::models::AdsTxt;
use crate::parser;
use crate::retriever::Retriever;

/// Deadline and cancellation for one batch fetch. Cloning shares the same
/// cancellation token.
#[derive(Debug, Clone)]
pub struct FetchContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::background()
    }
}

impl FetchContext {
    /// No deadline. Only an explicit [`cancel`](Self::cancel) ends collection early.
    pub fn background() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A token that cancels this context when cancelled, e.g. from a ctrl-c handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// A token that is cancelled along with this context, but whose own
    /// cancellation leaves the context alone.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the deadline passes or the context is cancelled.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Retrieve and parse a single source. Never fails: retrieval errors become
/// an identifier-only document, and parse errors (empty body) hand back the
/// document they carry.
async fn fetch_one<R>(retriever: &R, source: &str, metrics: &FetchMetrics) -> AdsTxt
where
    R: Retriever + ?Sized,
{
    match retriever.retrieve(source).await {
        Ok(body) => parser::parse(source, &body).unwrap_or_else(ParseError::into_document),
        Err(e) => {
            metrics.increment_retrieval_failures();
            warn!(source = source, error = %e, "Retrieval failed; returning empty document");
            AdsTxt::new(source)
        }
    }
}

/// Fetch and parse every source concurrently, collecting until all of them
/// report or `ctx` fires.
///
/// Returns [`FetchError::NoSources`] immediately, without spawning anything,
/// when `sources` is empty. Otherwise always returns `Ok`, possibly with
/// fewer documents than sources. Output order is completion order.
pub async fn fetch_all<R, S>(
    ctx: &FetchContext,
    retriever: Arc<R>,
    sources: &[S],
    metrics: Arc<FetchMetrics>,
) -> Result<Vec<AdsTxt>, FetchError>
where
    R: Retriever + ?Sized + 'static,
    S: AsRef<str>,
{
    if sources.is_empty() {
        return Err(FetchError::NoSources);
    }

    let expected = sources.len();
    let started = Instant::now();
    metrics.add_requested(expected as u64);

    info!(sources = expected, "Dispatching ads.txt retrievals");

    // One slot per source so no producer ever waits on the consumer.
    let (tx, mut rx) = mpsc::channel::<AdsTxt>(expected);

    for source in sources {
        let source = source.as_ref().to_string();
        let tx = tx.clone();
        let retriever = Arc::clone(&retriever);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let doc = fetch_one(retriever.as_ref(), &source, &metrics).await;
            if tx.try_send(doc).is_err() {
                metrics.increment_late_results();
                debug!(source = %source, "Collector already returned; discarding late result");
            }
        });
    }

    // Only the tasks hold senders now, so recv() ends if every task dies.
    drop(tx);

    let mut results = Vec::with_capacity(expected);

    while results.len() < expected {
        tokio::select! {
            _ = ctx.done() => {
                metrics.increment_deadline_hits();

                // Anything already queued arrived in time. Close first so a
                // send racing this drain fails and counts as late.
                rx.close();
                while let Ok(doc) = rx.try_recv() {
                    metrics.increment_collected();
                    debug!(document = %doc, "Collected queued document at deadline");
                    results.push(doc);
                }

                info!(
                    collected = results.len(),
                    expected = expected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Deadline reached; returning partial results"
                );
                break;
            }
            received = rx.recv() => match received {
                Some(doc) => {
                    metrics.increment_collected();
                    debug!(document = %doc, "Collected document");
                    results.push(doc);
                }
                None => break,
            },
        }
    }

    info!(
        collected = results.len(),
        expected = expected,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "ads.txt fetch complete"
    );

    Ok(results)
}

/// The requested sources that have no document in `results`, in request order.
pub fn missing_sources<'a, S>(requested: &'a [S], results: &[AdsTxt]) -> Vec<&'a str>
where
    S: AsRef<str>,
{
    let present: HashSet<&str> = results.iter().map(AdsTxt::source).collect();
    requested
        .iter()
        .map(|source| source.as_ref())
        .filter(|source| !present.contains(source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetrieveError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Canned responses with a per-source delay. Unknown sources fail.
    #[derive(Default)]
    struct MockRetriever {
        responses: HashMap<String, (Duration, Option<String>)>,
    }

    impl MockRetriever {
        fn ok(mut self, source: &str, delay_ms: u64, body: &str) -> Self {
            self.responses.insert(
                source.to_string(),
                (Duration::from_millis(delay_ms), Some(body.to_string())),
            );
            self
        }

        fn failing(mut self, source: &str, delay_ms: u64) -> Self {
            self.responses
                .insert(source.to_string(), (Duration::from_millis(delay_ms), None));
            self
        }
    }

    #[async_trait]
    impl Retriever for MockRetriever {
        async fn retrieve(&self, source: &str) -> Result<String, RetrieveError> {
            let (delay, body) = self
                .responses
                .get(source)
                .cloned()
                .unwrap_or((Duration::ZERO, None));
            tokio::time::sleep(delay).await;
            body.ok_or(RetrieveError::Status { status: 503 })
        }
    }

    fn find<'a>(docs: &'a [AdsTxt], source: &str) -> &'a AdsTxt {
        docs.iter()
            .find(|d| d.source() == source)
            .unwrap_or_else(|| panic!("no document for {source}"))
    }

    #[tokio::test]
    async fn test_no_sources_fails_fast() {
        let metrics = Arc::new(FetchMetrics::new());
        let sources: Vec<String> = Vec::new();
        let result = fetch_all(
            &FetchContext::with_timeout(Duration::from_secs(5)),
            Arc::new(MockRetriever::default()),
            &sources,
            Arc::clone(&metrics),
        )
        .await;

        assert_eq!(result.unwrap_err(), FetchError::NoSources);
        assert_eq!(metrics.snapshot().sources_requested, 0);
    }

    #[tokio::test]
    async fn test_failed_source_still_yields_empty_document() {
        let retriever = MockRetriever::default()
            .ok("http://a.com/ads.txt", 0, "exchange.com, 1, DIRECT")
            .failing("http://b.com/ads.txt", 0)
            .ok("http://c.com/ads.txt", 0, "CONTACT=ads@c.com\nexchange.com, 2, RESELLER, abc");
        let sources = ["http://a.com/ads.txt", "http://b.com/ads.txt", "http://c.com/ads.txt"];
        let metrics = Arc::new(FetchMetrics::new());

        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_secs(5)),
            Arc::new(retriever),
            &sources,
            Arc::clone(&metrics),
        )
        .await
        .unwrap();

        assert_eq!(docs.len(), 3);
        assert!(find(&docs, "http://b.com/ads.txt").is_empty());
        assert_eq!(find(&docs, "http://a.com/ads.txt").buyers().len(), 1);
        assert_eq!(find(&docs, "http://c.com/ads.txt").contacts(), &["ads@c.com".to_string()]);
        assert!(missing_sources(&sources, &docs).is_empty());

        let snap = metrics.snapshot();
        assert_eq!(snap.documents_collected, 3);
        assert_eq!(snap.retrieval_failures, 1);
        assert_eq!(snap.deadline_hits, 0);
    }

    #[tokio::test]
    async fn test_empty_body_yields_identifier_only_document() {
        let retriever = MockRetriever::default().ok("http://empty.com/ads.txt", 0, "");
        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_secs(5)),
            Arc::new(retriever),
            &["http://empty.com/ads.txt"],
            Arc::new(FetchMetrics::new()),
        )
        .await
        .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), "http://empty.com/ads.txt");
        assert!(docs[0].is_empty());
    }

    #[tokio::test]
    async fn test_short_deadline_returns_promptly_without_error() {
        let retriever = MockRetriever::default()
            .ok("http://slow1.com/ads.txt", 10_000, "exchange.com, 1, DIRECT")
            .ok("http://slow2.com/ads.txt", 10_000, "exchange.com, 2, DIRECT");
        let sources = ["http://slow1.com/ads.txt", "http://slow2.com/ads.txt"];
        let metrics = Arc::new(FetchMetrics::new());

        let started = Instant::now();
        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_millis(50)),
            Arc::new(retriever),
            &sources,
            Arc::clone(&metrics),
        )
        .await
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(docs.is_empty());
        assert_eq!(missing_sources(&sources, &docs), sources.to_vec());
        assert_eq!(metrics.snapshot().deadline_hits, 1);
    }

    #[tokio::test]
    async fn test_deadline_truncates_to_partial_results() {
        let retriever = MockRetriever::default()
            .ok("http://fast.com/ads.txt", 0, "exchange.com, 1, DIRECT")
            .ok("http://slow.com/ads.txt", 10_000, "exchange.com, 2, DIRECT");
        let sources = ["http://fast.com/ads.txt", "http://slow.com/ads.txt"];

        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_millis(300)),
            Arc::new(retriever),
            &sources,
            Arc::new(FetchMetrics::new()),
        )
        .await
        .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), "http://fast.com/ads.txt");
        assert_eq!(missing_sources(&sources, &docs), vec!["http://slow.com/ads.txt"]);
    }

    #[tokio::test]
    async fn test_abandoned_task_result_is_discarded_not_blocked() {
        let retriever = MockRetriever::default().ok("http://late.com/ads.txt", 100, "x.com, 1, DIRECT");
        let metrics = Arc::new(FetchMetrics::new());

        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_millis(10)),
            Arc::new(retriever),
            &["http://late.com/ads.txt"],
            Arc::clone(&metrics),
        )
        .await
        .unwrap();
        assert!(docs.is_empty());

        // Give the abandoned task time to finish and try its send.
        tokio::time::sleep(Duration::from_millis(400)).await;
        let snap = metrics.snapshot();
        assert_eq!(snap.late_results, 1);
        assert_eq!(snap.documents_collected, 0);
    }

    #[tokio::test]
    async fn test_explicit_cancel_stops_collection() {
        let retriever = MockRetriever::default().ok("http://slow.com/ads.txt", 10_000, "x.com, 1, DIRECT");
        let ctx = FetchContext::background();
        let token = ctx.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let started = Instant::now();
        let docs = fetch_all(
            &ctx,
            Arc::new(retriever),
            &["http://slow.com/ads.txt"],
            Arc::new(FetchMetrics::new()),
        )
        .await
        .unwrap();

        assert!(docs.is_empty());
        assert!(ctx.is_done());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_results_arrive_in_completion_order() {
        let retriever = MockRetriever::default()
            .ok("http://first.com/ads.txt", 300, "a.com, 1, DIRECT")
            .ok("http://second.com/ads.txt", 0, "b.com, 2, DIRECT");

        let docs = fetch_all(
            &FetchContext::with_timeout(Duration::from_secs(5)),
            Arc::new(retriever),
            &["http://first.com/ads.txt", "http://second.com/ads.txt"],
            Arc::new(FetchMetrics::new()),
        )
        .await
        .unwrap();

        let order: Vec<&str> = docs.iter().map(AdsTxt::source).collect();
        assert_eq!(order, vec!["http://second.com/ads.txt", "http://first.com/ads.txt"]);
    }

    #[test]
    fn test_missing_sources_diffs_in_request_order() {
        let requested = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let results = vec![AdsTxt::new("c")];
        assert_eq!(missing_sources(&requested, &results), vec!["a", "b"]);
    }

    /// Blocks the runtime thread on the first matching source, then never answers.
    struct StallingRetriever {
        stall: &'static str,
        block: Duration,
    }

    #[async_trait]
    impl Retriever for StallingRetriever {
        async fn retrieve(&self, source: &str) -> Result<String, RetrieveError> {
            if source == self.stall {
                std::thread::sleep(self.block);
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok("exchange.com, 1, DIRECT".to_string())
        }
    }

    #[tokio::test]
    async fn test_result_queued_before_deadline_is_kept() {
        // Single-threaded runtime: "fast" is sent, then the stall holds the
        // thread past the deadline, so the collector wakes up with both the
        // deadline fired and a document waiting.
        for _ in 0..20 {
            let retriever = StallingRetriever {
                stall: "http://slow.com/ads.txt",
                block: Duration::from_millis(60),
            };
            let sources = ["http://fast.com/ads.txt", "http://slow.com/ads.txt"];
            let metrics = Arc::new(FetchMetrics::new());

            let docs = fetch_all(
                &FetchContext::with_timeout(Duration::from_millis(30)),
                Arc::new(retriever),
                &sources,
                Arc::clone(&metrics),
            )
            .await
            .unwrap();

            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].source(), "http://fast.com/ads.txt");
            assert_eq!(missing_sources(&sources, &docs), vec!["http://slow.com/ads.txt"]);
            let snap = metrics.snapshot();
            assert_eq!(snap.documents_collected, 1);
            assert_eq!(snap.deadline_hits, 1);
        }
    }

    #[test]
    fn test_child_token_follows_parent_but_not_back() {
        let ctx = FetchContext::background();
        let child = ctx.child_token();
        child.cancel();
        assert!(!ctx.is_done());

        let child = ctx.child_token();
        ctx.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_context_without_deadline_is_not_done_until_cancelled() {
        let ctx = FetchContext::background();
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_done());
        ctx.cancel();
        assert!(ctx.is_done());
    }
}
