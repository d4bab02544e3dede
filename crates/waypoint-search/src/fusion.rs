//! Fusion stage — spec.md §4.6 stage 4.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use waypoint_core::defaults;

/// A single fused, ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub id: Uuid,
    pub fused_score: f32,
    pub bm25_score: Option<f32>,
    pub dense_score: Option<f32>,
    pub has_graph_match: bool,
}

/// Min-max normalize a score list to `[0, 1]` independently of any other
/// list. A single-element or all-equal list normalizes to `1.0` for
/// every member rather than dividing by zero.
fn min_max_normalize(scores: &[(Uuid, f32)]) -> HashMap<Uuid, f32> {
    let Some(min) = scores.iter().map(|(_, s)| *s).fold(None, |acc, s| {
        Some(acc.map_or(s, |m: f32| m.min(s)))
    }) else {
        return HashMap::new();
    };
    let max = scores.iter().map(|(_, s)| *s).fold(min, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|(id, s)| {
            let norm = if range > f32::EPSILON { (s - min) / range } else { 1.0 };
            (*id, norm)
        })
        .collect()
}

/// Combine BM25 and dense-vector candidate lists into one ranked list,
/// weighting each list's independently min-max-normalized scores with
/// the fixed weights from `defaults`, and tie-breaking deterministically:
/// higher fused score first, then a graph match, then lower id.
pub fn fuse(
    bm25: &[(Uuid, f32)],
    dense: &[(Uuid, f32)],
    graph_matches: &[Uuid],
) -> Vec<ScoredItem> {
    let norm_bm25 = min_max_normalize(bm25);
    let norm_dense = min_max_normalize(dense);
    let bm25_raw: HashMap<Uuid, f32> = bm25.iter().copied().collect();
    let dense_raw: HashMap<Uuid, f32> = dense.iter().copied().collect();
    let graph_set: std::collections::HashSet<Uuid> = graph_matches.iter().copied().collect();

    let mut ids: Vec<Uuid> = norm_bm25.keys().chain(norm_dense.keys()).copied().collect();
    ids.sort();
    ids.dedup();

    let mut items: Vec<ScoredItem> = ids
        .into_iter()
        .map(|id| {
            let b = norm_bm25.get(&id).copied().unwrap_or(0.0);
            let d = norm_dense.get(&id).copied().unwrap_or(0.0);
            let fused = defaults::FUSION_BM25_WEIGHT * b + defaults::FUSION_DENSE_WEIGHT * d;
            ScoredItem {
                id,
                fused_score: fused,
                bm25_score: bm25_raw.get(&id).copied(),
                dense_score: dense_raw.get(&id).copied(),
                has_graph_match: graph_set.contains(&id),
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.has_graph_match.cmp(&a.has_graph_match))
            .then_with(|| a.id.cmp(&b.id))
    });

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuses_two_lists_weighting_bm25_higher() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let bm25 = vec![(a, 10.0), (b, 5.0)];
        let dense = vec![(a, 0.6), (b, 0.9)];

        let fused = fuse(&bm25, &dense, &[]);
        // a: bm25 norm 1.0, dense norm 0.0 -> 0.7
        // b: bm25 norm 0.0, dense norm 1.0 -> 0.3
        assert_eq!(fused[0].id, a);
        assert_eq!(fused[1].id, b);
    }

    #[test]
    fn graph_match_breaks_ties() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let bm25 = vec![(a, 1.0), (b, 1.0)];
        let dense = vec![];

        let fused = fuse(&bm25, &dense, &[b]);
        assert_eq!(fused[0].id, b);
        assert_eq!(fused[1].id, a);
    }

    #[test]
    fn lower_id_breaks_remaining_ties() {
        let a = Uuid::nil();
        let mut bytes = [0u8; 16];
        bytes[15] = 1;
        let b = Uuid::from_bytes(bytes);
        let bm25 = vec![(b, 1.0), (a, 1.0)];

        let fused = fuse(&bm25, &[], &[]);
        assert_eq!(fused[0].id, a);
        assert_eq!(fused[1].id, b);
    }

    #[test]
    fn identical_inputs_always_yield_an_identical_ordering() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let bm25 = vec![(a, 3.0), (b, 1.0), (c, 2.0)];
        let dense = vec![(a, 0.2), (b, 0.8), (c, 0.5)];

        let first = fuse(&bm25, &dense, &[]);
        let second = fuse(&bm25, &dense, &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_lists_fuse_to_empty() {
        assert!(fuse(&[], &[], &[]).is_empty());
    }
}
