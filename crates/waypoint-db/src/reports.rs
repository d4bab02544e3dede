//! Research report repository.

use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};

use waypoint_core::{Error, Report, ReportRepository, Result};

/// PostgreSQL implementation of `ReportRepository`.
pub struct PgReportRepository {
    pool: Pool<Postgres>,
}

impl PgReportRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Report {
        let embedding: Option<Vector> = row.get("embedding");
        Report {
            id: row.get("id"),
            job_id: row.get("job_id"),
            query: row.get("query"),
            content: row.get("content"),
            citations: row.get("citations"),
            parameters: row.get("parameters"),
            usage: row.get("usage"),
            embedding: embedding.map(|v| v.to_vec()),
            rating: row.get("rating"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait::async_trait]
impl ReportRepository for PgReportRepository {
    async fn insert(&self, report: &Report) -> Result<i64> {
        let embedding = report.embedding.clone().map(Vector::from);
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO reports (job_id, query, content, citations, parameters, usage, embedding, rating, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(report.job_id)
        .bind(&report.query)
        .bind(&report.content)
        .bind(&report.citations)
        .bind(&report.parameters)
        .bind(&report.usage)
        .bind(embedding)
        .bind(report.rating)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Report> {
        let row = sqlx::query(
            "SELECT id, job_id, query, content, citations, parameters, usage, embedding, rating, created_at
             FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("report {id}")))?;
        Ok(Self::parse_row(row))
    }

    async fn update_embedding(&self, id: i64, embedding: Vec<f32>) -> Result<()> {
        sqlx::query("UPDATE reports SET embedding = $1 WHERE id = $2")
            .bind(Vector::from(embedding))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn rate(&self, id: i64, rating: i16) -> Result<()> {
        sqlx::query("UPDATE reports SET rating = $1 WHERE id = $2")
            .bind(rating)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
