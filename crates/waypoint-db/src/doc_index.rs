//! BM25 backing store: documents, per-document terms, and the inverted
//! posting list, kept consistent with corpus statistics on every write.

use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use waypoint_core::{DocPosting, DocTerm, DocumentIndexEntry, DocumentIndexRepository, Error, Result};

/// PostgreSQL implementation of `DocumentIndexRepository`.
pub struct PgDocumentIndexRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentIndexRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentIndexRepository for PgDocumentIndexRepository {
    async fn insert_document(&self, entry: &DocumentIndexEntry, terms: &[DocTerm]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO doc_index (id, source_id, title, content, token_count, embedding, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                 source_id = EXCLUDED.source_id, title = EXCLUDED.title,
                 content = EXCLUDED.content, token_count = EXCLUDED.token_count,
                 embedding = EXCLUDED.embedding",
        )
        .bind(entry.id)
        .bind(&entry.source_id)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(entry.token_count)
        .bind(entry.embedding.clone().map(Vector::from))
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        // Re-indexing a document: drop its old terms/postings first so
        // corpus stats never double-count a stale term row.
        sqlx::query("DELETE FROM doc_terms WHERE document_id = $1")
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        sqlx::query("DELETE FROM doc_postings WHERE document_id = $1")
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        for term in terms {
            sqlx::query(
                "INSERT INTO doc_terms (document_id, term, term_frequency) VALUES ($1, $2, $3)",
            )
            .bind(term.document_id)
            .bind(&term.term)
            .bind(term.term_frequency)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            sqlx::query(
                "INSERT INTO doc_postings (term, document_id, term_frequency) VALUES ($1, $2, $3)",
            )
            .bind(&term.term)
            .bind(term.document_id)
            .bind(term.term_frequency)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        // Recompute corpus stats transactionally so they never drift from
        // the postings table they describe.
        sqlx::query(
            "INSERT INTO doc_stats (id, total_docs, avg_doc_length)
             SELECT 1, COUNT(*), COALESCE(AVG(token_count), 0) FROM doc_index
             ON CONFLICT (id) DO UPDATE SET
                 total_docs = EXCLUDED.total_docs, avg_doc_length = EXCLUDED.avg_doc_length",
        )
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<DocumentIndexEntry> {
        let row = sqlx::query(
            "SELECT id, source_id, title, content, token_count, embedding, created_at FROM doc_index WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("document {id}")))?;

        let embedding: Option<Vector> = row.get("embedding");
        Ok(DocumentIndexEntry {
            id: row.get("id"),
            source_id: row.get("source_id"),
            title: row.get("title"),
            content: row.get("content"),
            token_count: row.get("token_count"),
            embedding: embedding.map(|v| v.to_vec()),
            created_at: row.get("created_at"),
        })
    }

    async fn postings_for_term(&self, term: &str) -> Result<Vec<DocPosting>> {
        let rows = sqlx::query(
            "SELECT term, document_id, term_frequency FROM doc_postings WHERE term = $1",
        )
        .bind(term)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| DocPosting {
                term: row.get("term"),
                document_id: row.get("document_id"),
                term_frequency: row.get("term_frequency"),
            })
            .collect())
    }

    async fn corpus_stats(&self) -> Result<(i64, f64)> {
        let row = sqlx::query("SELECT total_docs, avg_doc_length FROM doc_stats WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let total_docs: i64 = row.get("total_docs");
                let avg_doc_length: f64 = row.get("avg_doc_length");
                Ok((total_docs, avg_doc_length))
            }
            None => Ok((0, 0.0)),
        }
    }

    async fn nearest(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<(Uuid, f32)>> {
        let embedding = Vector::from(query_embedding.to_vec());
        let rows = sqlx::query(
            "SELECT id, 1 - (embedding <=> $1) AS similarity FROM doc_index
             WHERE embedding IS NOT NULL AND 1 - (embedding <=> $1) >= $2
             ORDER BY embedding <=> $1
             LIMIT $3",
        )
        .bind(&embedding)
        .bind(threshold as f64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let similarity: f64 = row.get("similarity");
                (row.get("id"), similarity as f32)
            })
            .collect())
    }
}
