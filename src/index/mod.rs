//! Vector index — stores (vector, metadata, chunk text) tuples and
//! serves scoped nearest-neighbor search.
//!
//! The scope predicate is evaluated inside the search, before ranking.
//! Filtering a fixed top-k afterwards would let irrelevant-but-
//! accessible chunks crowd out relevant-but-filtered ones and starve a
//! requester of results.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::Result;
use crate::scope::{AccessScope, ScopeFilter};

pub use sqlite::SqliteVectorIndex;

/// A chunk as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    /// Display name of the owning document, carried for citations.
    pub document_name: String,
    /// Position within the document's chunk sequence.
    pub ordinal: i64,
    pub text: String,
    /// Char offset of the chunk start in the normalized document text.
    pub start_offset: i64,
    /// Inherited verbatim from the document at ingestion; never diverges.
    pub scope: AccessScope,
    /// Ingestion timestamp (RFC 3339); ties in search scores break
    /// toward the most recent.
    pub ingested_at: String,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Ordered search hits, bounded by top-k and the score floor.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
    /// In-scope candidates examined. Zero means the index held nothing
    /// visible to this requester; positive with empty `hits` means
    /// nothing cleared the score floor.
    pub scanned: usize,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn index_was_empty(&self) -> bool {
        self.scanned == 0
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for `chunk.chunk_id`.
    async fn upsert(&self, chunk: ChunkRecord, embedding: Vec<f32>) -> Result<()>;

    /// Upsert several chunks atomically.
    async fn upsert_batch(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<()>;

    /// Remove every chunk belonging to a document. Returns how many
    /// entries were deleted.
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// Scoped nearest-neighbor search.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        scope: &ScopeFilter,
    ) -> Result<RetrievalResult>;

    /// Total stored chunks, optionally for one document.
    async fn count(&self, document_id: Option<&str>) -> Result<usize>;
}
