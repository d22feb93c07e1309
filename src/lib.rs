//! Retrieval-augmented answering over vetted internal documents, plus
//! role-scoped technical news digests with staged summarization.
//!
//! The crate is a library; HTTP surfaces, session transport, and the
//! document approval workflow live in its callers. What lives here:
//!
//! - [`chunker`]: normalization and overlapping chunking of raw text.
//! - [`embedding`]: the embedding provider seam and its Ollama backend.
//! - [`index`]: the access-scoped SQLite vector index.
//! - [`ingest`]: document ingestion (replace-then-insert) and revocation.
//! - [`retrieval`]: the question-answering orchestrator.
//! - [`llm`]: completion providers (Ollama, Gemini, OpenRouter).
//! - [`history`]: append-only chat sessions backing the prompt window.
//! - [`news`]: feed refresh, article caching, summarization tiers.

pub mod chunker;
pub mod core;
pub mod embedding;
pub mod history;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod news;
pub mod retrieval;
pub mod scope;

pub use crate::core::config::paths::AppPaths;
pub use crate::core::config::settings::Settings;
pub use crate::core::errors::{CoreError, Result};
pub use crate::scope::{AccessScope, RequesterScope, ScopeFilter};
