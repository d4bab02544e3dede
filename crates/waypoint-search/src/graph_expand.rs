//! Graph expansion stage — spec.md §4.6 stage 3.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use waypoint_core::{GraphRepository, Result};

/// One relationship reached from the matched entity.
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedRelationship {
    pub target: Uuid,
    pub target_name: String,
    pub relation: String,
    pub weight: f32,
    pub confidence: f32,
}

/// The matched entity plus everything reachable within the hop bound,
/// ranked by `weight * confidence` descending.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExpansion {
    pub entity: Uuid,
    pub entity_name: String,
    pub relationships: Vec<ExpandedRelationship>,
}

/// Case-insensitive canonical-name lookup, then a single hop-bounded
/// traversal via `GraphRepository::neighbors` (the recursive CTE behind
/// it is already cycle-safe by tracking visited path ids). This layer
/// additionally de-dupes by target id — the repository can return the
/// same node through more than one path — keeping the highest-ranked
/// occurrence, since the graph is addressed by id throughout and never
/// by a reference-counted pointer that a cycle could leak.
pub async fn expand(
    graph: &Arc<dyn GraphRepository>,
    entity_name: &str,
    max_hops: u32,
) -> Result<Option<GraphExpansion>> {
    let Some(root) = graph.find_node_by_name(entity_name).await? else {
        return Ok(None);
    };

    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut relationships: Vec<ExpandedRelationship> = vec![];

    for (edge, neighbor) in graph.neighbors(root.id, max_hops).await? {
        if neighbor.id == root.id || !seen.insert(neighbor.id) {
            continue;
        }
        relationships.push(ExpandedRelationship {
            target: neighbor.id,
            target_name: neighbor.canonical_name,
            relation: edge.relation,
            weight: edge.weight,
            confidence: edge.confidence,
        });
    }

    relationships.sort_by(|a, b| {
        (b.weight * b.confidence)
            .partial_cmp(&(a.weight * a.confidence))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(Some(GraphExpansion {
        entity: root.id,
        entity_name: root.canonical_name,
        relationships,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use waypoint_core::{GraphEdge, GraphNode};

    #[derive(Default)]
    struct FakeGraph {
        nodes: Mutex<HashMap<Uuid, GraphNode>>,
        // node_id -> the full (edge, neighbor) set the server's
        // recursive CTE would have returned for that root.
        expansions: Mutex<HashMap<Uuid, Vec<(GraphEdge, GraphNode)>>>,
    }

    fn node(name: &str) -> GraphNode {
        GraphNode {
            id: Uuid::new_v4(),
            node_type: "entity".into(),
            canonical_name: name.into(),
            embedding: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn edge(source: Uuid, target: Uuid, relation: &str, weight: f32, confidence: f32) -> GraphEdge {
        GraphEdge {
            id: Uuid::new_v4(),
            source,
            target,
            relation: relation.into(),
            weight,
            confidence,
            created_at: chrono::Utc::now(),
        }
    }

    #[async_trait]
    impl GraphRepository for FakeGraph {
        async fn upsert_node(&self, node: &GraphNode) -> Result<Uuid> {
            self.nodes.lock().unwrap().insert(node.id, node.clone());
            Ok(node.id)
        }
        async fn upsert_edge(&self, edge: &GraphEdge) -> Result<Uuid> {
            Ok(edge.id)
        }
        async fn find_node_by_name(&self, name: &str) -> Result<Option<GraphNode>> {
            Ok(self
                .nodes
                .lock()
                .unwrap()
                .values()
                .find(|n| n.canonical_name.eq_ignore_ascii_case(name))
                .cloned())
        }
        async fn neighbors(&self, node_id: Uuid, _max_hops: u32) -> Result<Vec<(GraphEdge, GraphNode)>> {
            Ok(self.expansions.lock().unwrap().get(&node_id).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn expands_and_ranks_by_weight_times_confidence() {
        let graph = FakeGraph::default();
        let a = node("rust");
        let b = node("tokio");
        let c = node("async-std");
        graph.nodes.lock().unwrap().insert(a.id, a.clone());

        graph.expansions.lock().unwrap().insert(
            a.id,
            vec![
                (edge(a.id, b.id, "uses", 0.5, 0.6), b.clone()),
                (edge(a.id, c.id, "alternative_to", 0.9, 0.8), c.clone()),
            ],
        );

        let graph: Arc<dyn GraphRepository> = Arc::new(graph);
        let result = expand(&graph, "RUST", 2).await.unwrap().unwrap();

        assert_eq!(result.entity_name, "rust");
        assert_eq!(result.relationships.len(), 2);
        assert_eq!(result.relationships[0].target_name, "async-std");
        assert_eq!(result.relationships[1].target_name, "tokio");
    }

    #[tokio::test]
    async fn deduplicates_a_target_reached_through_multiple_paths() {
        let graph = FakeGraph::default();
        let a = node("rust");
        let b = node("tokio");
        graph.nodes.lock().unwrap().insert(a.id, a.clone());

        graph.expansions.lock().unwrap().insert(
            a.id,
            vec![
                (edge(a.id, b.id, "uses", 0.5, 0.6), b.clone()),
                (edge(a.id, b.id, "depends_on", 0.3, 0.9), b.clone()),
            ],
        );

        let graph: Arc<dyn GraphRepository> = Arc::new(graph);
        let result = expand(&graph, "rust", 2).await.unwrap().unwrap();
        assert_eq!(result.relationships.len(), 1);
    }

    #[tokio::test]
    async fn unknown_entity_returns_none() {
        let graph: Arc<dyn GraphRepository> = Arc::new(FakeGraph::default());
        assert!(expand(&graph, "nonexistent", 2).await.unwrap().is_none());
    }
}
