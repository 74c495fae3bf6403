//! The conversation engine: one query turn end-to-end.
//!
//! A turn moves through prompt building, fetching, classification, and
//! acceptance or retry. Retries are an explicit bounded loop over the
//! mutable pair (query text, attempt); every exhausted failure mode exits
//! through a tagged `TurnOutcome`, and only user interruption escapes as
//! an error.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::classify::{Classification, classify};
use crate::error::{Error, Result};
use crate::events::{EngineEvent, RetryReason};
use crate::handle::EngineHandle;
use crate::memory::MemoryStore;
use crate::prompt;
use crate::relevance;
use crate::render::render_blocks;
use crate::surface::{AnswerSurface, is_challenge_page};

/// Appended to the query when an attempt came back empty or useless.
/// Compounds across retries.
const ANSWER_ANYWAY_SUFFIX: &str = ", answer it anyway";
/// Characters of the rendered answer captured as the turn summary in
/// short mode, where no summarization side query runs.
const SHORT_CAPTURE_CHARS: usize = 200;
/// Word cap asked of the summarization side query.
const SUMMARY_REQUEST_WORDS: usize = 150;
/// Rendered-answer prefix handed to the summarization side query. The
/// query travels in a URL, so it cannot carry the whole answer.
const SUMMARY_INPUT_CHARS: usize = 1500;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay for linear backoff: attempt n waits (n + 1) times this.
    pub retry_delay: Duration,
    /// Probability the relevance verdict must clear for context to ride
    /// along with the next query.
    pub follow_up_threshold: f64,
    /// Cap answers to one short paragraph and skip summarization.
    pub short_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(3),
            follow_up_threshold: 0.5,
            short_mode: false,
        }
    }
}

/// Why a turn produced no answer. Reported as a value, never a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Every attempt hit a bot-challenge page.
    ChallengeBlocked,
    /// Every attempt classified empty or useless.
    NoUsableAnswer,
    /// The fetch session kept dying; carries the last error text.
    SessionLost(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ChallengeBlocked => write!(
                f,
                "the answer surface flagged this client as automated traffic; try again in a few minutes"
            ),
            FailureReason::NoUsableAnswer => {
                write!(f, "no usable answer was found; try rephrasing the query")
            }
            FailureReason::SessionLost(e) => write!(f, "the page session kept failing: {e}"),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Rendered answer text, blocks in document order.
    Accepted(String),
    /// All attempts exhausted.
    Failed(FailureReason),
}

/// One strictly sequential conversation against one answer surface.
pub struct ConversationEngine {
    config: EngineConfig,
    surface: Arc<AnswerSurface>,
    memory: MemoryStore,
    handle: EngineHandle,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl ConversationEngine {
    pub fn new(config: EngineConfig, surface: Arc<AnswerSurface>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            surface,
            memory: MemoryStore::new(),
            handle: EngineHandle::new(),
            event_tx,
        }
    }

    /// Subscribe to turn lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for interrupting turns.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn short_mode(&self) -> bool {
        self.config.short_mode
    }

    pub fn set_short_mode(&mut self, on: bool) {
        self.config.short_mode = on;
    }

    /// Wipe memory back to a brand-new conversation.
    pub fn reset_conversation(&mut self) {
        self.memory.reset();
    }

    /// Close the underlying fetch session. Call before process exit.
    pub async fn shutdown(&self) {
        self.surface.shutdown().await;
    }

    /// Run one turn for a raw user query. Only interruption escapes as an
    /// error; every other failure is reported through the outcome.
    pub async fn query(&mut self, raw_query: &str) -> Result<TurnOutcome> {
        *self.handle.cancel.lock() = CancellationToken::new();
        self.handle.is_running.store(true, Ordering::Release);
        let result = self.run_turn(raw_query).await;
        self.handle.is_running.store(false, Ordering::Release);
        if result.is_err() {
            let _ = self.event_tx.send(EngineEvent::TurnEnd { accepted: false });
        }
        result
    }

    async fn run_turn(&mut self, raw_query: &str) -> Result<TurnOutcome> {
        let _ = self.event_tx.send(EngineEvent::TurnStart {
            query: raw_query.to_string(),
        });

        // One relevance consult per turn; retries reuse the verdict.
        let has_context = self.decide_context(raw_query).await?;

        let mut attempt: u32 = 0;
        let mut query_text = raw_query.to_string();

        let outcome = loop {
            let prompt_text = self.compose_prompt(&query_text, has_context);
            let _ = self.event_tx.send(EngineEvent::Fetching { attempt });

            let cancel = self.handle.cancel.lock().clone();
            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                result = self.surface.fetch_raw(&prompt_text) => result,
            };

            let html = match fetched {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(attempt, "fetch failed: {e}");
                    if attempt >= self.config.max_retries {
                        break TurnOutcome::Failed(FailureReason::SessionLost(e.to_string()));
                    }
                    if e.is_session_lost() {
                        self.surface.reset_session().await;
                    }
                    self.retry(&mut attempt, RetryReason::SessionLost).await?;
                    continue;
                }
            };

            if is_challenge_page(&html) {
                let _ = self
                    .event_tx
                    .send(EngineEvent::ChallengeDetected { attempt });
                if attempt >= self.config.max_retries {
                    break TurnOutcome::Failed(FailureReason::ChallengeBlocked);
                }
                self.retry(&mut attempt, RetryReason::Challenge).await?;
                continue;
            }

            let blocks = self.surface.extract(&html);
            match classify(blocks.as_deref()) {
                Classification::Usable => {
                    let rendered = render_blocks(blocks.as_deref().unwrap_or_default());
                    self.finish_turn(raw_query, &rendered).await?;
                    break TurnOutcome::Accepted(rendered);
                }
                Classification::Empty | Classification::Useless => {
                    tracing::debug!(attempt, "answer classified as empty or useless");
                    if attempt >= self.config.max_retries {
                        break TurnOutcome::Failed(FailureReason::NoUsableAnswer);
                    }
                    query_text.push_str(ANSWER_ANYWAY_SUFFIX);
                    self.retry(&mut attempt, RetryReason::EmptyAnswer).await?;
                    continue;
                }
            }
        };

        let _ = self.event_tx.send(EngineEvent::TurnEnd {
            accepted: matches!(outcome, TurnOutcome::Accepted(_)),
        });
        Ok(outcome)
    }

    /// Decide whether prior context rides along with this turn. An
    /// unrelated verdict clears memory so stale context cannot leak into
    /// a new subject.
    async fn decide_context(&mut self, raw_query: &str) -> Result<bool> {
        if self.memory.is_first_turn() || self.memory.is_empty() {
            return Ok(false);
        }
        let cancel = self.handle.cancel.lock().clone();
        let decision = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Interrupted),
            decision = relevance::is_follow_up(&self.surface, raw_query, &self.memory) => decision,
        };
        let accepted = decision.accepted(self.config.follow_up_threshold);
        tracing::debug!(
            is_follow_up = decision.is_follow_up,
            probability = decision.probability,
            accepted,
            "relevance verdict"
        );
        if !accepted {
            self.memory.clear();
        }
        Ok(accepted)
    }

    fn compose_prompt(&self, query_text: &str, has_context: bool) -> String {
        let built = prompt::build(query_text, has_context, self.config.short_mode);
        if has_context && !self.memory.is_empty() {
            format!(
                "Previous conversation:\n{}\nReferring to the conversation above, answer: {}",
                self.memory.context_snapshot(),
                built
            )
        } else {
            built
        }
    }

    /// Linear backoff, then bump the attempt counter. Interruptible.
    async fn retry(&self, attempt: &mut u32, reason: RetryReason) -> Result<()> {
        let _ = self.event_tx.send(EngineEvent::Retrying {
            attempt: *attempt,
            reason,
        });
        let delay = self.config.retry_delay * (*attempt + 1);
        if !delay.is_zero() {
            let cancel = self.handle.cancel.lock().clone();
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        *attempt += 1;
        Ok(())
    }

    /// Fold an accepted answer into memory. The update is atomic with
    /// respect to interruption: either the whole update runs or memory
    /// stays in its pre-turn state. Summarization trouble is non-fatal
    /// and leaves memory entirely unchanged.
    async fn finish_turn(&mut self, raw_query: &str, rendered: &str) -> Result<()> {
        let cancel = self.handle.cancel.lock().clone();
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        if self.config.short_mode {
            let capture: String = rendered.chars().take(SHORT_CAPTURE_CHARS).collect();
            self.memory.record_turn(raw_query, capture);
            return Ok(());
        }

        let _ = self.event_tx.send(EngineEvent::Summarizing);
        let input: String = rendered.chars().take(SUMMARY_INPUT_CHARS).collect();
        let summary_query = format!(
            "Summarize the following answer in at most {SUMMARY_REQUEST_WORDS} words: {input}"
        );
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Interrupted),
            result = self.surface.ask(&summary_query) => result,
        };
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        match fetched {
            Ok(Some(blocks)) => {
                let text = blocks
                    .iter()
                    .filter_map(confab_page::ContentBlock::as_text)
                    .collect::<Vec<_>>()
                    .join("\n\n");
                if text.trim().is_empty() {
                    tracing::warn!("summarization returned no text, memory left unchanged");
                } else {
                    self.memory.update_rolling_summary(&text);
                    let summary = self.memory.rolling_summary().to_string();
                    self.memory.record_turn(raw_query, summary);
                }
            }
            Ok(None) => {
                tracing::warn!("summarization returned no content, memory left unchanged");
            }
            Err(e) => {
                tracing::warn!("summarization failed ({e}), memory left unchanged");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use confab_page::{ContentBlock, ContentExtractor, PageFetcher};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    /// Scripted fetcher: pops queued responses and records every URL.
    #[derive(Default)]
    struct MockFetcher {
        responses: Mutex<VecDeque<confab_page::Result<String>>>,
        visited: Mutex<Vec<String>>,
        resets: AtomicU32,
        abort_on_call: Mutex<Option<(usize, EngineHandle)>>,
    }

    impl MockFetcher {
        fn push(&self, response: confab_page::Result<String>) {
            self.responses.lock().push_back(response);
        }

        fn visited(&self) -> Vec<String> {
            self.visited.lock().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for MockFetcher {
        async fn navigate(&self, url: &str) -> confab_page::Result<String> {
            let call = {
                let mut visited = self.visited.lock();
                visited.push(url.to_string());
                visited.len() - 1
            };
            if let Some((at, handle)) = &*self.abort_on_call.lock() {
                if call == *at {
                    handle.abort();
                }
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("<html></html>".to_string()))
        }

        async fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        async fn shutdown(&self) {}
    }

    /// Marker-protocol extractor: "TEXT:<body>" becomes one text block,
    /// anything else extracts nothing.
    struct MarkerExtractor;

    impl ContentExtractor for MarkerExtractor {
        fn extract(&self, html: &str) -> Option<Vec<ContentBlock>> {
            html.strip_prefix("TEXT:")
                .map(|body| vec![ContentBlock::text(body)])
        }
    }

    const USELESS: &str = "TEXT:Top web results are shown. Try exploring this topic further.";

    fn engine_with(fetcher: Arc<MockFetcher>, config: EngineConfig) -> ConversationEngine {
        let surface = Arc::new(AnswerSurface::new(
            fetcher,
            Arc::new(MarkerExtractor),
            "https://answers.example/q=",
        ));
        ConversationEngine::new(config, surface)
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            retry_delay: Duration::from_millis(0),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_first_turn_accepts_and_records_memory() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:A B-tree is a balanced search tree.".to_string()));
        fetcher.push(Ok("TEXT:B-trees keep keys sorted in wide nodes.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());
        let mut events = engine.subscribe();

        let outcome = engine.query("what is a b-tree").await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Accepted("A B-tree is a balanced search tree.\n\n".to_string())
        );
        assert!(!engine.memory().is_first_turn());
        let turns: Vec<_> = engine.memory().history().collect();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].query, "what is a b-tree");
        assert_eq!(turns[0].summary, "B-trees keep keys sorted in wide nodes.");
        assert_eq!(engine.memory().last_query(), "what is a b-tree");

        // first turn makes no relevance call: main fetch + summary only
        let visited = fetcher.visited();
        assert_eq!(visited.len(), 2);
        assert!(visited[0].contains("what%20is%20a%20b-tree"));
        assert!(visited[1].contains("Summarize"));

        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::TurnStart { .. }
        ));
    }

    #[tokio::test]
    async fn test_follow_up_verdict_injects_context() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:FOLLOW_UP: YES\nPROBABILITY: 90".to_string()));
        fetcher.push(Ok("TEXT:Insertion is logarithmic.".to_string()));
        fetcher.push(Ok("TEXT:Insertion costs O(log n).".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());
        engine.memory.record_turn("what is a b-tree", "a balanced tree");

        let outcome = engine.query("how fast is insertion").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Accepted(_)));
        let visited = fetcher.visited();
        assert_eq!(visited.len(), 3);
        // relevance consult carries the snapshot, main fetch carries context
        assert!(visited[0].contains("User%20asked"));
        assert!(visited[1].contains("Previous%20conversation"));
        assert!(visited[1].contains("what%20is%20a%20b-tree"));
        // both turns retained
        assert_eq!(engine.memory().history().count(), 2);
    }

    #[tokio::test]
    async fn test_unrelated_verdict_clears_memory() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:FOLLOW_UP: NO\nPROBABILITY: 10".to_string()));
        fetcher.push(Ok("TEXT:Sourdough needs a starter.".to_string()));
        fetcher.push(Ok("TEXT:Bread summary.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());
        engine.memory.record_turn("what is a b-tree", "a balanced tree");

        engine.query("how do I bake sourdough").await.unwrap();

        let visited = fetcher.visited();
        assert!(!visited[1].contains("Previous%20conversation"));
        let turns: Vec<_> = engine.memory().history().collect();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].query, "how do I bake sourdough");
    }

    #[tokio::test]
    async fn test_relevance_failure_falls_back_to_fresh_context() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Err(confab_page::Error::Browser("boom".to_string())));
        fetcher.push(Ok("TEXT:An answer.".to_string()));
        fetcher.push(Ok("TEXT:A summary.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());
        engine.memory.record_turn("earlier", "stuff");

        let outcome = engine.query("something new").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Accepted(_)));
        assert!(!fetcher.visited()[1].contains("Previous%20conversation"));
    }

    #[tokio::test]
    async fn test_useless_answers_exhaust_retries_with_mutated_query() {
        let fetcher = Arc::new(MockFetcher::default());
        for _ in 0..3 {
            fetcher.push(Ok(USELESS.to_string()));
        }
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("obscure question").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Failed(FailureReason::NoUsableAnswer));
        let visited = fetcher.visited();
        assert_eq!(visited.len(), 3);
        let suffix = "%2C%20answer%20it%20anyway";
        assert!(!visited[0].contains(suffix));
        assert_eq!(visited[1].matches(suffix).count(), 1);
        // the mutation compounds across retries
        assert_eq!(visited[2].matches(suffix).count(), 2);
        // failed turn leaves memory in its pre-turn state
        assert!(engine.memory().is_empty());
        assert!(engine.memory().is_first_turn());
    }

    #[tokio::test]
    async fn test_challenge_then_usable_answer() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("<html>please solve this captcha</html>".to_string()));
        fetcher.push(Ok("TEXT:The real answer.".to_string()));
        fetcher.push(Ok("TEXT:Summary.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("anything").await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Accepted("The real answer.\n\n".to_string())
        );
        assert_eq!(fetcher.visited().len(), 3);
    }

    #[tokio::test]
    async fn test_challenge_on_every_attempt_blocks_the_turn() {
        let fetcher = Arc::new(MockFetcher::default());
        for _ in 0..3 {
            fetcher.push(Ok("<html>unusual traffic detected</html>".to_string()));
        }
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("anything").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Failed(FailureReason::ChallengeBlocked));
        assert_eq!(fetcher.visited().len(), 3);
    }

    #[tokio::test]
    async fn test_session_lost_resets_and_retries() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Err(confab_page::Error::SessionLost(
            "websocket closed".to_string(),
        )));
        fetcher.push(Ok("TEXT:Recovered answer.".to_string()));
        fetcher.push(Ok("TEXT:Summary.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("anything").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Accepted(_)));
        assert_eq!(fetcher.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_lost_on_every_attempt_fails_the_turn() {
        let fetcher = Arc::new(MockFetcher::default());
        for _ in 0..3 {
            fetcher.push(Err(confab_page::Error::SessionLost("gone".to_string())));
        }
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("anything").await.unwrap();

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(FailureReason::SessionLost(_))
        ));
        assert_eq!(fetcher.resets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_relevance_makes_no_network_call_with_empty_memory() {
        let fetcher = Arc::new(MockFetcher::default());
        let surface = AnswerSurface::new(
            fetcher.clone(),
            Arc::new(MarkerExtractor),
            "https://answers.example/q=",
        );
        let memory = MemoryStore::new();

        let decision = relevance::is_follow_up(&surface, "anything", &memory).await;

        assert_eq!(decision, crate::relevance::RelevanceDecision::UNRELATED);
        assert!(fetcher.visited().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_during_summarization_skips_memory_update() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:An answer.".to_string()));
        fetcher.push(Ok("TEXT:A summary that must not land.".to_string()));
        let mut engine = engine_with(fetcher.clone(), fast_config());
        // abort fires while the summarization side query is in flight
        *fetcher.abort_on_call.lock() = Some((1, engine.handle()));

        let result = engine.query("anything").await;

        assert!(matches!(result, Err(Error::Interrupted)));
        assert!(engine.memory().is_empty());
        assert_eq!(engine.memory().rolling_summary(), "");
    }

    #[tokio::test]
    async fn test_short_mode_captures_prefix_without_summary_query() {
        let fetcher = Arc::new(MockFetcher::default());
        let long_answer = "x".repeat(500);
        fetcher.push(Ok(format!("TEXT:{long_answer}")));
        let mut engine = engine_with(
            fetcher.clone(),
            EngineConfig {
                short_mode: true,
                ..fast_config()
            },
        );

        let outcome = engine.query("anything").await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Accepted(_)));
        // no summarization side query in short mode
        assert_eq!(fetcher.visited().len(), 1);
        let turns: Vec<_> = engine.memory().history().collect();
        assert_eq!(turns[0].summary.chars().count(), SHORT_CAPTURE_CHARS);
    }

    #[tokio::test]
    async fn test_summarization_failure_leaves_memory_unchanged() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:An answer.".to_string()));
        fetcher.push(Err(confab_page::Error::Browser("died".to_string())));
        let mut engine = engine_with(fetcher.clone(), fast_config());

        let outcome = engine.query("anything").await.unwrap();

        // the answer is still delivered, memory just records nothing
        assert!(matches!(outcome, TurnOutcome::Accepted(_)));
        assert!(engine.memory().is_empty());
    }

    #[tokio::test]
    async fn test_turn_events_bracket_the_turn() {
        let fetcher = Arc::new(MockFetcher::default());
        fetcher.push(Ok("TEXT:ok".to_string()));
        fetcher.push(Ok("TEXT:sum".to_string()));
        let mut engine = engine_with(fetcher, fast_config());
        let mut events = engine.subscribe();

        engine.query("q").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen.first(), Some(EngineEvent::TurnStart { .. })));
        assert!(matches!(
            seen.last(),
            Some(EngineEvent::TurnEnd { accepted: true })
        ));
    }
}
