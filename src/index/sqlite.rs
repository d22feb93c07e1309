//! SQLite-backed vector index.
//!
//! In-process store using SQLite for chunk metadata and brute-force
//! cosine similarity for ranking. Embeddings are little-endian f32
//! blobs. Upserts are keyed by chunk id, so repeated ingestion is safe
//! under retry.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{ChunkRecord, RetrievalResult, ScoredChunk, VectorIndex};
use crate::core::errors::{CoreError, Result};
use crate::scope::ScopeFilter;

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    /// Hits scoring below this are excluded entirely.
    score_floor: f32,
}

impl SqliteVectorIndex {
    pub async fn open(db_path: PathBuf, score_floor: f32) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(CoreError::internal)?;

        let index = Self { pool, score_floor };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                document_name TEXT NOT NULL DEFAULT '',
                ordinal INTEGER NOT NULL DEFAULT 0,
                content TEXT NOT NULL,
                start_offset INTEGER NOT NULL DEFAULT 0,
                scope TEXT NOT NULL,
                embedding BLOB,
                ingested_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(CoreError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await
            .map_err(CoreError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_scope ON chunks(scope)")
            .execute(&self.pool)
            .await
            .map_err(CoreError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
        let scope_raw: String = row.get("scope");
        Ok(ChunkRecord {
            chunk_id: row.get("chunk_id"),
            document_id: row.get("document_id"),
            document_name: row.get("document_name"),
            ordinal: row.get("ordinal"),
            text: row.get("content"),
            start_offset: row.get("start_offset"),
            scope: scope_raw.parse()?,
            ingested_at: row.get("ingested_at"),
        })
    }

    async fn upsert_in<'e, E>(executor: E, chunk: &ChunkRecord, embedding: &[f32]) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let blob = Self::serialize_embedding(embedding);

        sqlx::query(
            "INSERT OR REPLACE INTO chunks
                (chunk_id, document_id, document_name, ordinal, content, start_offset, scope, embedding, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.document_id)
        .bind(&chunk.document_name)
        .bind(chunk.ordinal)
        .bind(&chunk.text)
        .bind(chunk.start_offset)
        .bind(chunk.scope.to_string())
        .bind(&blob)
        .bind(&chunk.ingested_at)
        .execute(executor)
        .await
        .map_err(CoreError::internal)?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, chunk: ChunkRecord, embedding: Vec<f32>) -> Result<()> {
        Self::upsert_in(&self.pool, &chunk, &embedding).await
    }

    async fn upsert_batch(&self, items: Vec<(ChunkRecord, Vec<f32>)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(CoreError::internal)?;
        for (chunk, embedding) in &items {
            Self::upsert_in(&mut *tx, chunk, embedding).await?;
        }
        tx.commit().await.map_err(CoreError::internal)?;
        Ok(())
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::internal)?;

        Ok(result.rows_affected() as usize)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        scope: &ScopeFilter,
    ) -> Result<RetrievalResult> {
        if query.is_empty() {
            return Err(CoreError::Validation("query vector must not be empty".into()));
        }

        let permitted = scope.requester.permitted_tags();
        let scope_placeholders = vec!["?"; permitted.len()].join(", ");

        // The scope predicate is part of the candidate selection, not a
        // post-filter on an already-ranked top-k.
        let mut sql = format!(
            "SELECT chunk_id, document_id, document_name, ordinal, content, start_offset, scope, embedding, ingested_at
             FROM chunks
             WHERE scope IN ({})",
            scope_placeholders
        );

        if let Some(documents) = &scope.document_filter {
            if documents.is_empty() {
                return Ok(RetrievalResult::default());
            }
            let doc_placeholders = vec!["?"; documents.len()].join(", ");
            sql.push_str(&format!(" AND document_id IN ({})", doc_placeholders));
        }

        let mut query_builder = sqlx::query(&sql);
        for tag in &permitted {
            query_builder = query_builder.bind(tag);
        }
        if let Some(documents) = &scope.document_filter {
            for document_id in documents {
                query_builder = query_builder.bind(document_id);
            }
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::SearchUnavailable(e.to_string()))?;

        let scanned = rows.len();
        let mut hits = Vec::new();
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            if embedding_bytes.is_empty() {
                continue;
            }
            let stored = Self::deserialize_embedding(&embedding_bytes);
            let score = Self::cosine_similarity(query, &stored);
            if score < self.score_floor {
                continue;
            }
            hits.push(ScoredChunk {
                chunk: Self::row_to_record(row)?,
                score,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.chunk.ingested_at.cmp(&a.chunk.ingested_at))
        });
        hits.truncate(top_k.max(1));

        Ok(RetrievalResult { hits, scanned })
    }

    async fn count(&self, document_id: Option<&str>) -> Result<usize> {
        let count: i64 = if let Some(document_id) = document_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?1")
                .bind(document_id)
                .fetch_one(&self.pool)
                .await
                .map_err(CoreError::internal)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(CoreError::internal)?
        };

        Ok(count as usize)
    }
}
