//! `HybridSearch` — orchestrates the BM25 → dense vector → graph →
//! fusion pipeline (spec.md §4.6) and its degraded-mode fallback.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use waypoint_core::{DocumentIndexRepository, EmbeddingProvider, GraphRepository, Reranker, Result};

use crate::bm25::Bm25Index;
use crate::fusion::{fuse, ScoredItem};
use crate::graph_expand::{expand, GraphExpansion};
use crate::vector::VectorIndex;

const CANDIDATE_POOL: usize = 100;

/// A no-op reranker: satisfies the `Reranker` seam without changing
/// ordering. Real reranking is out of scope (spec.md §1 non-goals).
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(&self, _query: &str, items: Vec<(Uuid, f32)>) -> Result<Vec<(Uuid, f32)>> {
        Ok(items)
    }
}

/// Optional entity name to expand stage-3 graph context around. Hybrid
/// search does no entity extraction of its own — callers that already
/// know the entity in question (e.g. from a prior turn) pass it here.
#[derive(Debug, Clone, Default)]
pub struct SearchScope {
    pub entity_name: Option<String>,
    pub max_hops: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredItem>,
    pub graph_context: Option<GraphExpansion>,
    pub degraded: bool,
}

#[async_trait]
pub trait HybridSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        scope: SearchScope,
        rerank: bool,
    ) -> Result<SearchResponse>;
}

/// Wires the four retrieval stages together against the live repositories.
pub struct HybridSearchEngine {
    bm25: Bm25Index,
    vector: VectorIndex,
    graph: Arc<dyn GraphRepository>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    reranker: Arc<dyn Reranker>,
}

impl HybridSearchEngine {
    pub fn new(
        docs: Arc<dyn DocumentIndexRepository>,
        graph: Arc<dyn GraphRepository>,
        embeddings: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        // Fixed for the process lifetime, per spec.md §4.6's "fusion
        // weights never change mid-process" invariant.
        info!(
            bm25_weight = waypoint_core::defaults::FUSION_BM25_WEIGHT,
            dense_weight = waypoint_core::defaults::FUSION_DENSE_WEIGHT,
            "fusion weights fixed for process lifetime"
        );
        Self {
            bm25: Bm25Index::new(docs.clone()),
            vector: VectorIndex::new(docs),
            graph,
            embeddings,
            reranker: Arc::new(NoopReranker),
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }
}

#[async_trait]
impl HybridSearch for HybridSearchEngine {
    async fn search(
        &self,
        query: &str,
        k: usize,
        scope: SearchScope,
        rerank: bool,
    ) -> Result<SearchResponse> {
        let bm25_candidates = self.bm25.candidates(query, CANDIDATE_POOL).await?;

        let (dense_candidates, degraded) = match &self.embeddings {
            Some(embedder) => match embedder.embed(query).await {
                Ok(embedding) => (self.vector.candidates(&embedding, CANDIDATE_POOL).await?, false),
                Err(err) => {
                    warn!(error = %err, "embedding provider failed, falling back to lexical-only search");
                    (vec![], true)
                }
            },
            None => (vec![], true),
        };

        let graph_context = match scope.entity_name.as_deref() {
            Some(name) => expand(&self.graph, name, scope.max_hops.max(1)).await?,
            None => None,
        };
        let graph_matches: Vec<Uuid> = graph_context
            .as_ref()
            .map(|g| g.relationships.iter().map(|r| r.target).collect())
            .unwrap_or_default();

        let mut fused = fuse(&bm25_candidates, &dense_candidates, &graph_matches);
        fused.truncate(k);

        if rerank {
            let pairs: Vec<(Uuid, f32)> = fused.iter().map(|item| (item.id, item.fused_score)).collect();
            let reranked = self.reranker.rerank(query, pairs).await?;
            let order: std::collections::HashMap<Uuid, usize> = reranked
                .into_iter()
                .enumerate()
                .map(|(rank, (id, _))| (id, rank))
                .collect();
            fused.sort_by_key(|item| order.get(&item.id).copied().unwrap_or(usize::MAX));
        }

        Ok(SearchResponse {
            results: fused,
            graph_context,
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{DocPosting, DocTerm, DocumentIndexEntry, Error, GraphEdge, GraphNode};

    struct EmptyDocs;
    #[async_trait]
    impl DocumentIndexRepository for EmptyDocs {
        async fn insert_document(&self, _entry: &DocumentIndexEntry, _terms: &[DocTerm]) -> Result<()> {
            Ok(())
        }
        async fn get_document(&self, id: Uuid) -> Result<DocumentIndexEntry> {
            Err(Error::NotFound(id.to_string()))
        }
        async fn postings_for_term(&self, _term: &str) -> Result<Vec<DocPosting>> {
            Ok(vec![])
        }
        async fn corpus_stats(&self) -> Result<(i64, f64)> {
            Ok((0, 0.0))
        }
        async fn nearest(&self, _q: &[f32], _t: f32, _l: usize) -> Result<Vec<(Uuid, f32)>> {
            Ok(vec![])
        }
    }

    struct EmptyGraph;
    #[async_trait]
    impl GraphRepository for EmptyGraph {
        async fn upsert_node(&self, node: &GraphNode) -> Result<Uuid> {
            Ok(node.id)
        }
        async fn upsert_edge(&self, edge: &GraphEdge) -> Result<Uuid> {
            Ok(edge.id)
        }
        async fn find_node_by_name(&self, _name: &str) -> Result<Option<GraphNode>> {
            Ok(None)
        }
        async fn neighbors(&self, _node_id: Uuid, _max_hops: u32) -> Result<Vec<(GraphEdge, GraphNode)>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn empty_corpus_is_degraded_without_an_embedder_and_yields_no_results() {
        let engine = HybridSearchEngine::new(Arc::new(EmptyDocs), Arc::new(EmptyGraph), None);
        let response = engine
            .search("anything", 10, SearchScope::default(), false)
            .await
            .unwrap();
        assert!(response.degraded);
        assert!(response.results.is_empty());
        assert!(response.graph_context.is_none());
    }
}
