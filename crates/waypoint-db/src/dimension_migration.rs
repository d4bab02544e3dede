//! Embedding-dimension migration, run once at boot.
//!
//! Compares the `vector` column's declared dimension against the configured
//! `EMBEDDINGS_DIMENSION`. On mismatch, embeddings are cleared and the
//! column is altered in place; a background sweep then re-embeds existing
//! rows a page at a time so startup is never blocked on a full reindex.

use sqlx::{PgPool, Row};
use tracing::warn;

use waypoint_core::{Error, Result};

/// Inspect and, if necessary, migrate the embedding vector column width.
///
/// Returns `true` if a migration ran (callers use this to decide whether to
/// spawn the reindex sweep).
pub async fn ensure_embedding_dimension(pool: &PgPool, configured_dimension: usize) -> Result<bool> {
    let row = sqlx::query(
        "SELECT atttypmod FROM pg_attribute
         WHERE attrelid = 'reports'::regclass AND attname = 'embedding'",
    )
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)?;

    let Some(row) = row else {
        // Table not migrated yet (first boot); sqlx::migrate! will create it
        // with the configured dimension, nothing to reconcile here.
        return Ok(false);
    };

    // pgvector stores the declared dimension directly in atttypmod.
    let declared_dimension: i32 = row.get("atttypmod");
    if declared_dimension == configured_dimension as i32 {
        return Ok(false);
    }

    warn!(
        subsystem = "database",
        component = "dimension_migration",
        declared_dimension,
        configured_dimension,
        "embedding dimension mismatch, clearing embeddings and altering column"
    );

    let mut tx = pool.begin().await.map_err(Error::Database)?;

    sqlx::query("UPDATE reports SET embedding = NULL WHERE embedding IS NOT NULL")
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;
    sqlx::query("UPDATE graph_nodes SET embedding = NULL WHERE embedding IS NOT NULL")
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

    let alter_reports = format!(
        "ALTER TABLE reports ALTER COLUMN embedding TYPE vector({configured_dimension})"
    );
    sqlx::query(&alter_reports)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

    let alter_nodes = format!(
        "ALTER TABLE graph_nodes ALTER COLUMN embedding TYPE vector({configured_dimension})"
    );
    sqlx::query(&alter_nodes)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

    tx.commit().await.map_err(Error::Database)?;

    Ok(true)
}
