//! Dense-vector retrieval stage — spec.md §4.6 stage 2.

use std::sync::Arc;

use uuid::Uuid;

use waypoint_core::{defaults, DocumentIndexRepository, Result};

/// Dense-vector candidate generation with progressive threshold
/// relaxation: try each tier in `defaults::SIMILARITY_THRESHOLD_TIERS`
/// until at least half of `limit` candidates are found, or the ladder is
/// exhausted.
pub struct VectorIndex {
    docs: Arc<dyn DocumentIndexRepository>,
}

impl VectorIndex {
    pub fn new(docs: Arc<dyn DocumentIndexRepository>) -> Self {
        Self { docs }
    }

    pub async fn candidates(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Uuid, f32)>> {
        self.progressive_search(query_embedding, limit).await
    }

    async fn progressive_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(Uuid, f32)>> {
        let target = limit.div_ceil(2).max(1);
        let mut best: Vec<(Uuid, f32)> = vec![];

        for &threshold in defaults::SIMILARITY_THRESHOLD_TIERS {
            let hits = self.docs.nearest(query_embedding, threshold, limit).await?;
            let found = hits.len();
            best = hits;
            if found >= target {
                break;
            }
        }

        Ok(best)
    }
}
