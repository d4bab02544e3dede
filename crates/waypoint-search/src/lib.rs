//! # waypoint-search
//!
//! Hybrid retrieval core: BM25 lexical scoring, dense-vector similarity,
//! knowledge-graph expansion, and their weighted fusion into a single
//! ranked result list (spec.md §4.6).

pub mod bm25;
pub mod fusion;
pub mod graph_expand;
pub mod hybrid;
pub mod vector;

pub use bm25::{score_bm25, tokenize, Bm25Index};
pub use fusion::{fuse, ScoredItem};
pub use graph_expand::{expand, ExpandedRelationship, GraphExpansion};
pub use hybrid::{HybridSearch, HybridSearchEngine, NoopReranker, SearchResponse, SearchScope};
pub use vector::VectorIndex;
