//! Session repository: persisted so stateless-HTTP session metadata
//! survives a server restart.

use chrono::Utc;
use sqlx::{Pool, Postgres, Row};

use waypoint_core::{Error, Result, Session, SessionRepository, TransportKind};

/// PostgreSQL implementation of `SessionRepository`.
pub struct PgSessionRepository {
    pool: Pool<Postgres>,
}

impl PgSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, transport, protocol_version, client_info, subscriptions, created_at, last_seen_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&session.id)
        .bind(session.transport.as_str())
        .bind(&session.protocol_version)
        .bind(&session.client_info)
        .bind(serde_json::to_value(&session.subscriptions)?)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn touch(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET last_seen_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Session> {
        let row = sqlx::query(
            "SELECT id, transport, protocol_version, client_info, subscriptions, created_at, last_seen_at
             FROM sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let transport_str: String = row.get("transport");
        let subscriptions: serde_json::Value = row.get("subscriptions");

        Ok(Session {
            id: row.get("id"),
            transport: transport_str.parse::<TransportKind>()?,
            protocol_version: row.get("protocol_version"),
            client_info: row.get("client_info"),
            subscriptions: serde_json::from_value(subscriptions).unwrap_or_default(),
            created_at: row.get("created_at"),
            last_seen_at: row.get("last_seen_at"),
        })
    }

    async fn delete_expired(&self, ttl: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - ttl;
        let result = sqlx::query("DELETE FROM sessions WHERE last_seen_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn subscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions
             SET subscriptions = (
                 SELECT COALESCE(jsonb_agg(DISTINCT value), '[]'::jsonb)
                 FROM jsonb_array_elements_text(subscriptions || to_jsonb($2::text)) AS value
             )
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(resource)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn unsubscribe_resource(&self, session_id: &str, resource: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions
             SET subscriptions = subscriptions - $2
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(resource)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
