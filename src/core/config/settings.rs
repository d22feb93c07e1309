//! Typed settings for the knowledge core.
//!
//! Loaded from `knowhub.toml` when present, with environment overrides
//! for provider selection and credentials so deployments can switch
//! backends without editing the file.

use std::env;
use std::fs;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;
use crate::core::errors::{CoreError, Result};

/// Which LLM backend answers generation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderBackend {
    Ollama,
    Gemini,
    Openrouter,
}

impl ProviderBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(ProviderBackend::Ollama),
            "gemini" => Some(ProviderBackend::Gemini),
            "openrouter" => Some(ProviderBackend::Openrouter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk size in characters.
    pub max_chunk_size: usize,
    /// Characters repeated across chunk boundaries.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks requested from the index.
    pub top_k: usize,
    /// Cosine similarity floor; hits below it are dropped entirely.
    pub score_floor: f32,
    /// Most-recent chat turns included in the prompt.
    pub max_history_turns: usize,
    /// Context block budget in characters.
    pub max_context_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_floor: 0.3,
            max_history_turns: 6,
            max_context_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub backend: ProviderBackend,
    /// Tried once when the primary backend fails mid-request.
    pub fallback_backend: Option<ProviderBackend>,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embedding_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    /// Hard deadline for a single completion or embedding call.
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Ollama,
            fallback_backend: None,
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2:3b".to_string(),
            ollama_embedding_model: "nomic-embed-text".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            openrouter_api_key: None,
            openrouter_model: "meta-llama/llama-3.2-3b-instruct".to_string(),
            timeout_secs: 60,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// One feed in the role-keyed source registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub url: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    /// Content below this many words never reaches LLM summarization.
    pub min_content_words: usize,
    /// Extracted article text is capped at this many characters.
    pub max_content_chars: usize,
    pub fetch_timeout_secs: u64,
    pub max_articles_per_feed: usize,
    /// Sentences kept by the heuristic brief (fallback tier B).
    pub summary_max_sentences: usize,
    /// Regex denylist for promotional/teaser content. Replaceable
    /// wholesale; the tiering behavior is the contract, not this list.
    pub placeholder_patterns: Vec<String>,
    pub sources: Vec<NewsSource>,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            min_content_words: 50,
            max_content_chars: 15_000,
            fetch_timeout_secs: 15,
            max_articles_per_feed: 10,
            summary_max_sentences: 5,
            placeholder_patterns: vec![
                r"(?i)^\d+\s+(ways|tips|tricks|reasons|things)\b".to_string(),
                r"(?i)^top\s+\d+\b".to_string(),
                r"(?i)\bread\s+more\b".to_string(),
                r"(?i)\bsubscribe\s+(now|today|to)\b".to_string(),
                r"(?i)\bsign\s+up\s+for\s+our\b".to_string(),
                r"(?i)\bcontinue\s+reading\b".to_string(),
                r"(?i)the\s+post\s+.+\s+appeared\s+first\s+on".to_string(),
            ],
            sources: vec![
                NewsSource {
                    name: "The Hacker News".to_string(),
                    url: "https://feeds.feedburner.com/TheHackersNews".to_string(),
                    role: "security_engineer".to_string(),
                },
                NewsSource {
                    name: "Krebs on Security".to_string(),
                    url: "https://krebsonsecurity.com/feed/".to_string(),
                    role: "security_engineer".to_string(),
                },
                NewsSource {
                    name: "Kubernetes Blog".to_string(),
                    url: "https://kubernetes.io/feed.xml".to_string(),
                    role: "devops_engineer".to_string(),
                },
                NewsSource {
                    name: "AWS News".to_string(),
                    url: "https://aws.amazon.com/blogs/aws/feed/".to_string(),
                    role: "devops_engineer".to_string(),
                },
                NewsSource {
                    name: "Python Insider".to_string(),
                    url: "https://blog.python.org/feeds/posts/default".to_string(),
                    role: "backend_developer".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub provider: ProviderSettings,
    pub news: NewsSettings,
}

impl Settings {
    /// Load settings from `knowhub.toml` if present, then apply
    /// environment overrides.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        let mut settings = if paths.settings_path.exists() {
            let raw = fs::read_to_string(&paths.settings_path).map_err(CoreError::internal)?;
            toml::from_str(&raw)
                .map_err(|e| CoreError::Validation(format!("invalid knowhub.toml: {}", e)))?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(backend) = env::var("KNOWHUB_LLM_PROVIDER") {
            if let Some(parsed) = ProviderBackend::parse(&backend) {
                self.provider.backend = parsed;
            } else {
                tracing::warn!("Unknown KNOWHUB_LLM_PROVIDER value: {}", backend);
            }
        }
        if let Ok(url) = env::var("OLLAMA_BASE_URL") {
            self.provider.ollama_base_url = url;
        }
        if let Ok(key) = env::var("GEMINI_API_KEY") {
            self.provider.gemini_api_key = Some(key);
        }
        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            self.provider.openrouter_api_key = Some(key);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.overlap >= self.chunking.max_chunk_size {
            return Err(CoreError::Validation(format!(
                "chunk overlap ({}) must be smaller than max chunk size ({})",
                self.chunking.overlap, self.chunking.max_chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(CoreError::Validation("retrieval.top_k must be positive".into()));
        }
        match self.provider.backend {
            ProviderBackend::Gemini if self.provider.gemini_api_key.is_none() => Err(
                CoreError::Validation("GEMINI_API_KEY required for the gemini backend".into()),
            ),
            ProviderBackend::Openrouter if self.provider.openrouter_api_key.is_none() => Err(
                CoreError::Validation("OPENROUTER_API_KEY required for the openrouter backend".into()),
            ),
            _ => Ok(()),
        }
    }
}
