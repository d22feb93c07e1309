//! Retrieval orchestration: question in, grounded answer out.
//!
//! A query moves through a fixed set of phases. Transient embedding or
//! search failures get one retry with backoff; an LLM failure gets one
//! attempt against the fallback backend. A question with no visible
//! matches short-circuits to a fixed reply without ever invoking the
//! model.

pub mod prompt;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::config::settings::RetrievalSettings;
use crate::core::errors::{CoreError, Result};
use crate::core::retry::{exhausted, retry_transient_once};
use crate::embedding::EmbeddingProvider;
use crate::history::ChatTurn;
use crate::index::VectorIndex;
use crate::llm::provider::LlmProvider;
use crate::llm::types::CompletionRequest;
use crate::scope::{RequesterScope, ScopeFilter};

use self::prompt::{order_by_answer_alignment, Citation, PromptBuilder};

/// Fixed reply when no in-scope context clears the score floor.
pub const NO_CONTEXT_ANSWER: &str = "I could not find anything in the internal knowledge base \
that answers this. The relevant documents may not have been uploaded yet, or they may not be \
shared with you.";

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Lifecycle of a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Received,
    EmbeddingQuery,
    Searching,
    ContextAssembled,
    Generating,
    Answered,
    NoContext,
    Failed,
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueryPhase::Received => "received",
            QueryPhase::EmbeddingQuery => "embedding_query",
            QueryPhase::Searching => "searching",
            QueryPhase::ContextAssembled => "context_assembled",
            QueryPhase::Generating => "generating",
            QueryPhase::Answered => "answered",
            QueryPhase::NoContext => "no_context",
            QueryPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One question with everything needed to answer it.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub requester: RequesterScope,
    pub document_filter: Option<Vec<String>>,
    pub history: Vec<ChatTurn>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>, requester: RequesterScope) -> Self {
        Self {
            question: question.into(),
            requester,
            document_filter: None,
            history: Vec::new(),
        }
    }

    pub fn with_document_filter(mut self, document_ids: Vec<String>) -> Self {
        self.document_filter = Some(document_ids);
        self
    }

    pub fn with_history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }
}

/// The terminal state of a query: either an answer with its citations
/// or the fixed no-context reply.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub answer_text: String,
    pub citations: Vec<Citation>,
    pub phase: QueryPhase,
}

impl AnswerOutcome {
    pub fn found_context(&self) -> bool {
        self.phase == QueryPhase::Answered
    }
}

pub struct Orchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    llm: Arc<dyn LlmProvider>,
    fallback_llm: Option<Arc<dyn LlmProvider>>,
    settings: RetrievalSettings,
    max_tokens: u32,
    temperature: f32,
}

impl Orchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn LlmProvider>,
        fallback_llm: Option<Arc<dyn LlmProvider>>,
        settings: RetrievalSettings,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            llm,
            fallback_llm,
            settings,
            max_tokens,
            temperature,
        }
    }

    /// Answer a question over the requester's visible slice of the index.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerOutcome> {
        match self.run(request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(phase = %QueryPhase::Failed, error = %err, "query failed");
                Err(err)
            }
        }
    }

    async fn run(&self, request: AnswerRequest) -> Result<AnswerOutcome> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(CoreError::Validation("question must not be empty".to_string()));
        }
        debug!(phase = %QueryPhase::Received, requester = %request.requester.user_id, "query accepted");

        debug!(phase = %QueryPhase::EmbeddingQuery, "embedding question");
        let query_vector = retry_transient_once(RETRY_BASE_DELAY, || self.embedder.embed(question))
            .await
            .map_err(exhausted)?;

        let mut filter = ScopeFilter::new(request.requester.clone());
        if let Some(document_ids) = request.document_filter.clone() {
            filter = filter.with_documents(document_ids);
        }

        debug!(phase = %QueryPhase::Searching, top_k = self.settings.top_k, "searching index");
        let result = retry_transient_once(RETRY_BASE_DELAY, || {
            self.index.search(&query_vector, self.settings.top_k, &filter)
        })
        .await
        .map_err(exhausted)?;

        if result.is_empty() {
            info!(
                phase = %QueryPhase::NoContext,
                scanned = result.scanned,
                index_empty = result.index_was_empty(),
                "no context cleared the score floor"
            );
            return Ok(AnswerOutcome {
                answer_text: NO_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
                phase: QueryPhase::NoContext,
            });
        }

        let builder = PromptBuilder::new(
            self.settings.max_context_chars,
            self.settings.max_history_turns,
        );
        let bundle = builder.build(question, &result.hits, &request.history);
        debug!(
            phase = %QueryPhase::ContextAssembled,
            sources = bundle.citations.len(),
            "context assembled"
        );

        debug!(phase = %QueryPhase::Generating, provider = self.llm.name(), "invoking model");
        let completion = CompletionRequest::new(bundle.prompt.clone())
            .with_system(bundle.system.clone())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let answer_text = self.generate(completion).await?;

        let citations = order_by_answer_alignment(&answer_text, bundle.citations);
        info!(
            phase = %QueryPhase::Answered,
            citations = citations.len(),
            "query answered"
        );
        Ok(AnswerOutcome {
            answer_text,
            citations,
            phase: QueryPhase::Answered,
        })
    }

    /// Run the completion, falling back to the alternate backend once.
    async fn generate(&self, request: CompletionRequest) -> Result<String> {
        match self.llm.complete(request.clone()).await {
            Ok(text) => Ok(text),
            Err(err) => {
                warn!(provider = self.llm.name(), error = %err, "primary model failed");
                let retry_provider = self.fallback_llm.as_ref().unwrap_or(&self.llm);
                retry_provider.complete(request).await.map_err(|second| {
                    warn!(provider = retry_provider.name(), error = %second, "retry failed");
                    CoreError::RetrievalFailed(format!(
                        "answer generation failed on {} and {}: {}",
                        self.llm.name(),
                        retry_provider.name(),
                        second
                    ))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::index::sqlite::SqliteVectorIndex;
    use crate::index::ChunkRecord;
    use crate::scope::AccessScope;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn name(&self) -> &str {
            "stub-embed"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // Direction keyed off the first word so tests can steer hits.
            let lead = text.split_whitespace().next().unwrap_or("");
            Ok(if lead.starts_with("vacation") {
                vec![1.0, 0.0, 0.0]
            } else {
                vec![0.0, 0.0, 1.0]
            })
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    struct ScriptedLlm {
        reply: std::result::Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(CoreError::internal("scripted failure")),
            }
        }
    }

    async fn seeded_index(dir: &std::path::Path) -> Arc<SqliteVectorIndex> {
        let index = SqliteVectorIndex::open(dir.join("index.db"), 0.3)
            .await
            .unwrap();
        let chunk = ChunkRecord {
            chunk_id: "leave#0000".to_string(),
            document_id: "leave".to_string(),
            document_name: "leave-policy.pdf".to_string(),
            ordinal: 0,
            text: "Employees accrue vacation days monthly.".to_string(),
            start_offset: 0,
            scope: AccessScope::Company,
            ingested_at: "2025-01-01T00:00:00Z".to_string(),
        };
        index.upsert(chunk, vec![1.0, 0.0, 0.0]).await.unwrap();
        Arc::new(index)
    }

    fn orchestrator(
        index: Arc<SqliteVectorIndex>,
        llm: Arc<ScriptedLlm>,
        fallback: Option<Arc<ScriptedLlm>>,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(StubEmbedder),
            index,
            llm as Arc<dyn LlmProvider>,
            fallback.map(|f| f as Arc<dyn LlmProvider>),
            RetrievalSettings::default(),
            512,
            0.2,
        )
    }

    fn requester() -> RequesterScope {
        RequesterScope::new("u-1", vec!["engineer".to_string()])
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded_index(dir.path()).await;
        let llm = Arc::new(ScriptedLlm::answering("hi"));
        let orchestrator = orchestrator(index, llm.clone(), None);

        let err = orchestrator
            .answer(AnswerRequest::new("   ", requester()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn answered_query_cites_only_retrieved_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded_index(dir.path()).await;
        let llm = Arc::new(ScriptedLlm::answering("Vacation days accrue monthly."));
        let orchestrator = orchestrator(index, llm.clone(), None);

        let outcome = orchestrator
            .answer(AnswerRequest::new("vacation accrual?", requester()))
            .await
            .unwrap();

        assert_eq!(outcome.phase, QueryPhase::Answered);
        assert_eq!(outcome.citations.len(), 1);
        assert_eq!(outcome.citations[0].document_id, "leave");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn no_match_returns_fixed_reply_without_model_call() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded_index(dir.path()).await;
        let llm = Arc::new(ScriptedLlm::answering("should never run"));
        let orchestrator = orchestrator(index, llm.clone(), None);

        let outcome = orchestrator
            .answer(AnswerRequest::new("unrelated topic entirely", requester()))
            .await
            .unwrap();

        assert_eq!(outcome.phase, QueryPhase::NoContext);
        assert_eq!(outcome.answer_text, NO_CONTEXT_ANSWER);
        assert!(outcome.citations.is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_alternate_provider() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded_index(dir.path()).await;
        let primary = Arc::new(ScriptedLlm::failing());
        let fallback = Arc::new(ScriptedLlm::answering("fallback answer"));
        let orchestrator = orchestrator(index, primary.clone(), Some(fallback.clone()));

        let outcome = orchestrator
            .answer(AnswerRequest::new("vacation accrual?", requester()))
            .await
            .unwrap();

        assert_eq!(outcome.answer_text, "fallback answer");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(fallback.call_count(), 1);
    }

    #[tokio::test]
    async fn both_providers_failing_surfaces_retrieval_failure() {
        let dir = tempfile::tempdir().unwrap();
        let index = seeded_index(dir.path()).await;
        let primary = Arc::new(ScriptedLlm::failing());
        let orchestrator = orchestrator(index, primary.clone(), None);

        let err = orchestrator
            .answer(AnswerRequest::new("vacation accrual?", requester()))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::RetrievalFailed(_)));
        assert_eq!(primary.call_count(), 2);
    }
}
