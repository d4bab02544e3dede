//! Entity/relationship graph repository backing stage-3 expansion.

use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use waypoint_core::{Error, GraphEdge, GraphNode, GraphRepository, Result};

/// PostgreSQL implementation of `GraphRepository`.
pub struct PgGraphRepository {
    pool: Pool<Postgres>,
}

impl PgGraphRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_node(row: &sqlx::postgres::PgRow) -> GraphNode {
        let embedding: Option<Vector> = row.get("embedding");
        GraphNode {
            id: row.get("id"),
            node_type: row.get("node_type"),
            canonical_name: row.get("canonical_name"),
            embedding: embedding.map(|v| v.to_vec()),
            created_at: row.get("created_at"),
        }
    }

    fn parse_edge(row: &sqlx::postgres::PgRow) -> GraphEdge {
        GraphEdge {
            id: row.get("id"),
            source: row.get("source"),
            target: row.get("target"),
            relation: row.get("relation"),
            weight: row.get("weight"),
            confidence: row.get("confidence"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait::async_trait]
impl GraphRepository for PgGraphRepository {
    async fn upsert_node(&self, node: &GraphNode) -> Result<Uuid> {
        let embedding = node.embedding.clone().map(Vector::from);
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO graph_nodes (id, node_type, canonical_name, embedding, created_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (node_type, canonical_name) DO UPDATE SET embedding = EXCLUDED.embedding
             RETURNING id",
        )
        .bind(node.id)
        .bind(&node.node_type)
        .bind(&node.canonical_name)
        .bind(embedding)
        .bind(node.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO graph_edges (id, source, target, relation, weight, confidence, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (source, target, relation) DO UPDATE SET
                 weight = EXCLUDED.weight, confidence = EXCLUDED.confidence
             RETURNING id",
        )
        .bind(edge.id)
        .bind(edge.source)
        .bind(edge.target)
        .bind(&edge.relation)
        .bind(edge.weight)
        .bind(edge.confidence)
        .bind(edge.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn find_node_by_name(&self, name: &str) -> Result<Option<GraphNode>> {
        let row = sqlx::query(
            "SELECT id, node_type, canonical_name, embedding, created_at
             FROM graph_nodes WHERE canonical_name ILIKE $1 LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.as_ref().map(Self::parse_node))
    }

    async fn neighbors(
        &self,
        node_id: Uuid,
        max_hops: u32,
    ) -> Result<Vec<(GraphEdge, GraphNode)>> {
        // Recursive CTE bounded by hop count; `path` guards against cycles
        // by tracking visited node ids, matching the bounded, cycle-safe
        // traversal the expansion stage requires.
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE expansion AS (
                SELECT e.id AS edge_id, e.source, e.target, e.relation, e.weight,
                       e.confidence, e.created_at, 1 AS hop, ARRAY[e.source] AS path
                FROM graph_edges e
                WHERE e.source = $1

                UNION ALL

                SELECT e.id, e.source, e.target, e.relation, e.weight,
                       e.confidence, e.created_at, x.hop + 1, x.path || e.source
                FROM graph_edges e
                JOIN expansion x ON e.source = x.target
                WHERE x.hop < $2 AND NOT (e.source = ANY(x.path))
            )
            SELECT expansion.edge_id, expansion.source, expansion.target, expansion.relation,
                   expansion.weight, expansion.confidence, expansion.created_at,
                   n.id AS node_id, n.node_type, n.canonical_name, n.embedding, n.created_at AS node_created_at
            FROM expansion
            JOIN graph_nodes n ON n.id = expansion.target
            ORDER BY expansion.weight * expansion.confidence DESC
            "#,
        )
        .bind(node_id)
        .bind(max_hops as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let edge = GraphEdge {
                    id: row.get("edge_id"),
                    source: row.get("source"),
                    target: row.get("target"),
                    relation: row.get("relation"),
                    weight: row.get("weight"),
                    confidence: row.get("confidence"),
                    created_at: row.get("created_at"),
                };
                let embedding: Option<Vector> = row.get("embedding");
                let node = GraphNode {
                    id: row.get("node_id"),
                    node_type: row.get("node_type"),
                    canonical_name: row.get("canonical_name"),
                    embedding: embedding.map(|v| v.to_vec()),
                    created_at: row.get("node_created_at"),
                };
                (edge, node)
            })
            .collect())
    }
}
