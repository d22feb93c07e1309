//! SQLite cache of feed articles and their summaries.

use std::path::PathBuf;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::core::errors::{CoreError, Result};

use super::summarize::{Provenance, Summary};

/// One article as discovered from a feed. Full content and the summary
/// are filled in lazily.
#[derive(Debug, Clone)]
pub struct Article {
    pub article_id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub role: String,
    pub published_at: Option<String>,
    pub description: String,
    pub content: Option<String>,
    pub summary: Option<Summary>,
}

/// A feed entry ready to be cached; identity is the canonical url.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub title: String,
    pub url: String,
    pub source: String,
    pub role: String,
    pub published_at: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct NewsStore {
    pool: SqlitePool,
}

impl NewsStore {
    pub async fn open(db_path: PathBuf) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to open article cache: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                article_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                source TEXT NOT NULL,
                role TEXT NOT NULL,
                published_at TEXT,
                description TEXT NOT NULL DEFAULT '',
                content TEXT,
                summary TEXT,
                summary_provenance TEXT,
                summary_at TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(CoreError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_role ON articles(role, published_at DESC)")
            .execute(&pool)
            .await
            .map_err(CoreError::internal)?;

        info!("article cache ready at {:?}", db_path);
        Ok(Self { pool })
    }

    /// Insert or refresh an article keyed by canonical url. Fetched
    /// content and a cached summary survive refreshes; feed-provided
    /// fields are updated in place. Returns the article id.
    pub async fn upsert_article(&self, draft: &ArticleDraft) -> Result<String> {
        let article_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO articles (article_id, title, url, source, role, published_at, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                source = excluded.source,
                role = excluded.role,
                published_at = excluded.published_at,
                description = excluded.description
            "#,
        )
        .bind(&article_id)
        .bind(&draft.title)
        .bind(&draft.url)
        .bind(&draft.source)
        .bind(&draft.role)
        .bind(&draft.published_at)
        .bind(&draft.description)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(CoreError::internal)?;

        let row = sqlx::query("SELECT article_id FROM articles WHERE url = ?")
            .bind(&draft.url)
            .fetch_one(&self.pool)
            .await
            .map_err(CoreError::internal)?;
        Ok(row.get("article_id"))
    }

    pub async fn article(&self, article_id: &str) -> Result<Option<Article>> {
        let row = sqlx::query(
            "SELECT article_id, title, url, source, role, published_at, description, content, \
             summary, summary_provenance, summary_at FROM articles WHERE article_id = ?",
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::internal)?;

        row.map(row_to_article).transpose()
    }

    /// Cache the fetched full content for later summarization passes.
    pub async fn store_content(&self, article_id: &str, content: &str) -> Result<()> {
        let done = sqlx::query("UPDATE articles SET content = ? WHERE article_id = ?")
            .bind(content)
            .bind(article_id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::internal)?;
        if done.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("article {}", article_id)));
        }
        Ok(())
    }

    /// Overwrite the article's summary slot.
    pub async fn store_summary(&self, article_id: &str, summary: &Summary) -> Result<()> {
        let done = sqlx::query(
            "UPDATE articles SET summary = ?, summary_provenance = ?, summary_at = ? WHERE article_id = ?",
        )
        .bind(&summary.body)
        .bind(summary.provenance.as_str())
        .bind(&summary.generated_at)
        .bind(article_id)
        .execute(&self.pool)
        .await
        .map_err(CoreError::internal)?;
        if done.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("article {}", article_id)));
        }
        Ok(())
    }

    /// Newest-first articles for one role's digest.
    pub async fn recent_for_role(&self, role: &str, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            "SELECT article_id, title, url, source, role, published_at, description, content, \
             summary, summary_provenance, summary_at FROM articles WHERE role = ? \
             ORDER BY published_at DESC, created_at DESC LIMIT ?",
        )
        .bind(role)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::internal)?;

        rows.into_iter().map(row_to_article).collect()
    }
}

fn row_to_article(row: sqlx::sqlite::SqliteRow) -> Result<Article> {
    let summary = match (
        row.get::<Option<String>, _>("summary"),
        row.get::<Option<String>, _>("summary_provenance"),
        row.get::<Option<String>, _>("summary_at"),
    ) {
        (Some(body), Some(provenance), generated_at) => Some(Summary {
            body,
            provenance: provenance.parse::<Provenance>()?,
            generated_at: generated_at.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(Article {
        article_id: row.get("article_id"),
        title: row.get("title"),
        url: row.get("url"),
        source: row.get("source"),
        role: row.get("role"),
        published_at: row.get("published_at"),
        description: row.get("description"),
        content: row.get("content"),
        summary,
    })
}
