//! Role-scoped technical news: feed refresh, article caching, and the
//! staged summarization chain.
//!
//! Summaries degrade instead of failing: a usable article gets a model
//! summary, unusable or unreachable content falls through to a
//! heuristic brief and finally to a metadata blurb. Every summary is
//! tagged with the tier that produced it.

pub mod content;
pub mod feed;
pub mod quality;
pub mod store;
pub mod summarize;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::settings::{NewsSettings, NewsSource};
use crate::core::errors::{CoreError, Result};
use crate::ingest::IngestService;
use crate::llm::provider::LlmProvider;
use crate::scope::AccessScope;

use self::content::ContentFetcher;
use self::feed::{parse_feed, FeedClient};
use self::quality::{word_count, ContentQuality, QualityGate};
use self::store::{Article, ArticleDraft, NewsStore};
use self::summarize::{heuristic_brief, llm_summary_request, metadata_blurb, Provenance, Summary};

pub struct NewsService {
    store: NewsStore,
    feed_client: FeedClient,
    content_fetcher: ContentFetcher,
    llm: Arc<dyn LlmProvider>,
    gate: QualityGate,
    settings: NewsSettings,
    /// In-flight refresh per feed url; a newer refresh aborts the old one.
    refreshes: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl NewsService {
    pub fn new(store: NewsStore, llm: Arc<dyn LlmProvider>, settings: NewsSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.fetch_timeout_secs);
        let gate = QualityGate::new(settings.min_content_words, &settings.placeholder_patterns)?;
        Ok(Self {
            store,
            feed_client: FeedClient::new(timeout)?,
            content_fetcher: ContentFetcher::new(timeout, settings.max_content_chars)?,
            llm,
            gate,
            settings,
            refreshes: Mutex::new(HashMap::new()),
        })
    }

    /// The configured sources serving one role.
    pub fn sources_for_role(&self, role: &str) -> Vec<NewsSource> {
        self.settings
            .sources
            .iter()
            .filter(|source| source.role == role)
            .cloned()
            .collect()
    }

    /// Fetch one feed and cache its newest entries. Returns how many
    /// articles were inserted or refreshed.
    pub async fn refresh_feed(&self, source: &NewsSource) -> Result<usize> {
        debug!(feed = %source.name, url = %source.url, "refreshing feed");
        let xml = self.feed_client.fetch(&source.url).await?;
        let items = parse_feed(&xml)?;

        let mut upserted = 0;
        for item in items.into_iter().take(self.settings.max_articles_per_feed) {
            let draft = ArticleDraft {
                title: item.title,
                url: item.link,
                source: source.name.clone(),
                role: source.role.clone(),
                published_at: item.published,
                description: item.description,
            };
            self.store.upsert_article(&draft).await?;
            upserted += 1;
        }

        info!(feed = %source.name, upserted, "feed refreshed");
        Ok(upserted)
    }

    /// Kick off a background refresh. A refresh already in flight for
    /// the same feed is superseded and aborted.
    pub fn spawn_refresh(self: &Arc<Self>, source: NewsSource) {
        let service = Arc::clone(self);
        let key = source.url.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = service.refresh_feed(&source).await {
                warn!(feed = %source.name, error = %err, "background refresh failed");
            }
        });

        let mut refreshes = match self.refreshes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = refreshes.insert(key, handle) {
            previous.abort();
        }
    }

    /// Feed an article's content into the knowledge index so chat
    /// retrieval can answer from news, scoped to the article's role.
    /// Only content that clears the quality gate is indexed; teaser or
    /// stub pages must not pollute retrieval.
    pub async fn index_article(
        &self,
        ingest: &IngestService,
        article_id: &str,
    ) -> Result<usize> {
        let mut article = self
            .store
            .article(article_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("article {}", article_id)))?;

        if article.content.is_none() {
            let text = self.content_fetcher.fetch_article(&article.url).await?;
            self.store.store_content(&article.article_id, &text).await?;
            article.content = Some(text);
        }
        let content = article
            .content
            .as_deref()
            .ok_or_else(|| CoreError::ContentAcquisition(format!("article {}", article_id)))?;

        match self.gate.assess(content) {
            ContentQuality::Usable { words } => {
                debug!(article = article_id, words, "indexing article content");
                ingest
                    .ingest(
                        &article.article_id,
                        &article.title,
                        content,
                        AccessScope::Role(article.role.clone()),
                    )
                    .await
            }
            ContentQuality::TooShort { words } => Err(CoreError::ContentAcquisition(format!(
                "article {} too short to index ({} words)",
                article_id, words
            ))),
            ContentQuality::Placeholder { pattern } => {
                warn!(article = article_id, pattern = %pattern, "refusing to index placeholder content");
                Err(CoreError::PlaceholderContent)
            }
        }
    }

    /// Summarize an article, serving the cached summary when one
    /// exists. Repeat calls return the same body and provenance.
    pub async fn summarize(&self, article_id: &str) -> Result<Summary> {
        let article = self
            .store
            .article(article_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("article {}", article_id)))?;

        if let Some(cached) = article.summary.clone() {
            debug!(article = article_id, provenance = %cached.provenance, "serving cached summary");
            return Ok(cached);
        }
        self.generate_summary(article).await
    }

    /// Rebuild an article's summary even if one is cached. The new
    /// result overwrites the cache slot.
    pub async fn resummarize(&self, article_id: &str) -> Result<Summary> {
        let article = self
            .store
            .article(article_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("article {}", article_id)))?;
        self.generate_summary(article).await
    }

    async fn generate_summary(&self, mut article: Article) -> Result<Summary> {
        // A cached stub below the word threshold does not count as
        // acquired content; the canonical url gets another chance.
        let needs_fetch = article
            .content
            .as_deref()
            .map(|text| word_count(text) < self.settings.min_content_words)
            .unwrap_or(true);
        if needs_fetch {
            match self.content_fetcher.fetch_article(&article.url).await {
                Ok(text) => {
                    self.store.store_content(&article.article_id, &text).await?;
                    article.content = Some(text);
                }
                Err(err) => {
                    warn!(article = %article.article_id, error = %err, "content unavailable, degrading");
                }
            }
        }

        let summary = self.run_tiers(&article).await;
        self.store.store_summary(&article.article_id, &summary).await?;
        info!(
            article = %article.article_id,
            provenance = %summary.provenance,
            "summary stored"
        );
        Ok(summary)
    }

    async fn run_tiers(&self, article: &Article) -> Summary {
        let content = match &article.content {
            Some(text) => text,
            None => return Summary::now(metadata_blurb(article), Provenance::Metadata),
        };

        match self.gate.assess(content) {
            ContentQuality::Usable { words } => {
                debug!(article = %article.article_id, words, "content usable, trying model summary");
                match self.model_summary(article, content).await {
                    Some(body) => Summary::now(body, Provenance::Llm),
                    None => self.brief_or_blurb(article, content),
                }
            }
            ContentQuality::TooShort { words } => {
                debug!(article = %article.article_id, words, "content below word threshold");
                Summary::now(metadata_blurb(article), Provenance::Metadata)
            }
            ContentQuality::Placeholder { pattern } => {
                debug!(article = %article.article_id, pattern = %pattern, "placeholder content");
                Summary::now(metadata_blurb(article), Provenance::Metadata)
            }
        }
    }

    async fn model_summary(&self, article: &Article, content: &str) -> Option<String> {
        // 0 would mean "no limit" on some backends, never send that.
        let max_tokens = 512;
        let request = llm_summary_request(article, content, max_tokens, 0.3);
        match self.llm.complete(request).await {
            Ok(body) if !body.trim().is_empty() => Some(body.trim().to_string()),
            Ok(_) => {
                warn!(article = %article.article_id, "model returned an empty summary");
                None
            }
            Err(err) => {
                warn!(article = %article.article_id, error = %err, "model summary failed, degrading");
                None
            }
        }
    }

    fn brief_or_blurb(&self, article: &Article, content: &str) -> Summary {
        match heuristic_brief(content, self.settings.summary_max_sentences) {
            Some(body) => Summary::now(body, Provenance::Heuristic),
            None => Summary::now(metadata_blurb(article), Provenance::Metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use httpmock::prelude::*;

    use crate::core::config::ChunkingSettings;
    use crate::embedding::EmbeddingProvider;
    use crate::index::{SqliteVectorIndex, VectorIndex};
    use crate::llm::types::CompletionRequest;
    use crate::scope::{RequesterScope, ScopeFilter};

    struct ScriptedLlm {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedLlm {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
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
                Some(text) => Ok(text.clone()),
                None => Err(CoreError::Internal("scripted failure".to_string())),
            }
        }
    }

    fn usable_article_html() -> String {
        format!(
            "<html><body><p>{}</p></body></html>",
            "The researchers traced the outage to an expired intermediate certificate. "
                .repeat(12)
        )
    }

    async fn service_with(
        dir: &std::path::Path,
        llm: Arc<ScriptedLlm>,
        settings: NewsSettings,
    ) -> (Arc<NewsService>, NewsStore) {
        let store = NewsStore::open(dir.join("news.db")).await.unwrap();
        let service =
            NewsService::new(store.clone(), llm as Arc<dyn LlmProvider>, settings).unwrap();
        (Arc::new(service), store)
    }

    async fn seed_article(store: &NewsStore, url: &str) -> String {
        store
            .upsert_article(&ArticleDraft {
                title: "Certificate outage post-mortem".to_string(),
                url: url.to_string(),
                source: "The Hacker News".to_string(),
                role: "security_engineer".to_string(),
                published_at: Some("2025-03-01T08:00:00Z".to_string()),
                description: "Expired intermediate took down the API.".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn usable_content_gets_a_model_summary() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/story");
                then.status(200).body(usable_article_html());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("An expired certificate caused the outage."));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, &server.url("/story")).await;

        let summary = service.summarize(&id).await.unwrap();
        assert_eq!(summary.provenance, Provenance::Llm);
        assert_eq!(summary.body, "An expired certificate caused the outage.");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_heuristic_brief() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/story");
                then.status(200).body(usable_article_html());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::failing());
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, &server.url("/story")).await;

        let summary = service.summarize(&id).await.unwrap();
        assert_eq!(summary.provenance, Provenance::Heuristic);
        assert!(summary.body.contains("expired intermediate certificate"));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn below_threshold_content_never_reaches_the_model() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/stub");
                then.status(200)
                    .body("<p>Just a one-line stub article body here.</p>");
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("should never run"));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, &server.url("/stub")).await;

        let summary = service.summarize(&id).await.unwrap();
        assert_eq!(summary.provenance, Provenance::Metadata);
        assert!(summary.body.contains("Certificate outage post-mortem"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_metadata_blurb() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("should never run"));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        // Unroutable port, the fetch fails fast.
        let id = seed_article(&store, "http://127.0.0.1:1/unreachable").await;

        let summary = service.summarize(&id).await.unwrap();
        assert_eq!(summary.provenance, Provenance::Metadata);
        assert!(summary.body.contains("Expired intermediate"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn placeholder_content_with_fetch_already_cached_degrades_to_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("should never run"));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, "https://example.com/teaser").await;
        let teaser = format!(
            "{} Subscribe now to keep reading.",
            "padding sentence with plenty of ordinary words in it. ".repeat(12)
        );
        store.store_content(&id, &teaser).await.unwrap();

        let summary = service.summarize(&id).await.unwrap();
        assert_eq!(summary.provenance, Provenance::Metadata);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn repeat_summarize_is_stable_and_serves_the_cache() {
        let server = MockServer::start_async().await;
        let story = server
            .mock_async(|when, then| {
                when.method(GET).path("/story");
                then.status(200).body(usable_article_html());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("An expired certificate caused the outage."));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, &server.url("/story")).await;

        let first = service.summarize(&id).await.unwrap();
        let second = service.summarize(&id).await.unwrap();

        assert_eq!(first.body, second.body);
        assert_eq!(first.provenance, second.provenance);
        assert_eq!(llm.call_count(), 1);
        story.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn refresh_feed_caches_entries_up_to_the_per_feed_cap() {
        let items: String = (0..15)
            .map(|i| {
                format!(
                    "<item><title>Story {i}</title><link>https://example.com/{i}</link>\
                     <description>blurb {i}</description></item>"
                )
            })
            .collect();
        let xml = format!("<rss><channel>{}</channel></rss>", items);

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/feed.xml");
                then.status(200).body(xml);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("unused"));
        let (service, store) = service_with(dir.path(), llm, NewsSettings::default()).await;

        let source = NewsSource {
            name: "Example Feed".to_string(),
            url: server.url("/feed.xml"),
            role: "security_engineer".to_string(),
        };
        let upserted = service.refresh_feed(&source).await.unwrap();
        assert_eq!(upserted, 10);

        let cached = store.recent_for_role("security_engineer", 50).await.unwrap();
        assert_eq!(cached.len(), 10);
    }

    #[tokio::test]
    async fn unknown_article_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("unused"));
        let (service, _store) = service_with(dir.path(), llm, NewsSettings::default()).await;

        let err = service.summarize("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn short_cached_content_triggers_refetch_of_canonical_url() {
        let server = MockServer::start_async().await;
        let story = server
            .mock_async(|when, then| {
                when.method(GET).path("/story");
                then.status(200).body(usable_article_html());
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("An expired certificate caused the outage."));
        let (service, store) = service_with(dir.path(), llm.clone(), NewsSettings::default()).await;
        let id = seed_article(&store, &server.url("/story")).await;
        // A stub well below the word threshold is cached already.
        store.store_content(&id, "Read the full story").await.unwrap();

        let summary = service.summarize(&id).await.unwrap();

        story.assert_hits_async(1).await;
        assert_eq!(summary.provenance, Provenance::Llm);
        assert_eq!(llm.call_count(), 1);
    }

    struct LenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LenEmbedder {
        fn name(&self) -> &str {
            "len-embed"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.chars().count() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn indexed_article_is_retrievable_only_under_its_role_scope() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("unused"));
        let (service, store) = service_with(dir.path(), llm, NewsSettings::default()).await;
        let id = seed_article(&store, "https://example.com/a").await;
        let body = "The incident response team rotated every affected credential. ".repeat(10);
        store.store_content(&id, &body).await.unwrap();

        let index = Arc::new(
            SqliteVectorIndex::open(dir.path().join("index.db"), 0.0)
                .await
                .unwrap(),
        );
        let ingest = IngestService::new(
            index.clone(),
            Arc::new(LenEmbedder),
            ChunkingSettings::default(),
        );
        let count = service.index_article(&ingest, &id).await.unwrap();
        assert!(count >= 1);

        let security = ScopeFilter::new(RequesterScope::new(
            "u1",
            vec!["security_engineer".to_string()],
        ));
        let result = index.search(&[1.0, 1.0], 5, &security).await.unwrap();
        assert_eq!(result.hits[0].chunk.document_id, id);

        let outsider = ScopeFilter::new(RequesterScope::new("u2", vec![]));
        let result = index.search(&[1.0, 1.0], 5, &outsider).await.unwrap();
        assert!(result.index_was_empty());
    }

    #[tokio::test]
    async fn gated_content_is_never_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::answering("unused"));
        let (service, store) = service_with(dir.path(), llm, NewsSettings::default()).await;

        let index = Arc::new(
            SqliteVectorIndex::open(dir.path().join("index.db"), 0.0)
                .await
                .unwrap(),
        );
        let ingest = IngestService::new(
            index.clone(),
            Arc::new(LenEmbedder),
            ChunkingSettings::default(),
        );

        let teaser_id = seed_article(&store, "https://example.com/teaser").await;
        let teaser = format!(
            "{} Subscribe now to keep reading.",
            "padding sentence with plenty of ordinary words in it. ".repeat(12)
        );
        store.store_content(&teaser_id, &teaser).await.unwrap();
        let err = service.index_article(&ingest, &teaser_id).await.unwrap_err();
        assert!(matches!(err, CoreError::PlaceholderContent));

        let stub_id = seed_article(&store, "https://example.com/stub").await;
        store.store_content(&stub_id, "A five word stub only").await.unwrap();
        let err = service.index_article(&ingest, &stub_id).await.unwrap_err();
        assert!(matches!(err, CoreError::ContentAcquisition(_)));

        assert_eq!(index.count(None).await.unwrap(), 0);
    }

    #[test]
    fn sources_are_grouped_by_role() {
        let settings = NewsSettings::default();
        let security: Vec<_> = settings
            .sources
            .iter()
            .filter(|s| s.role == "security_engineer")
            .collect();
        assert!(!security.is_empty());
    }
}
