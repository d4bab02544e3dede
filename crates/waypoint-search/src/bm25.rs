//! Lexical (BM25) retrieval stage — spec.md §4.6 stage 1.

use std::collections::HashMap;
use std::sync::Arc;

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use waypoint_core::{defaults, DocumentIndexRepository, Result};

/// A fixed, non-configurable English stopword list. spec.md does not
/// specify per-language stopwords, so this is documented as a deliberate
/// simplification rather than a missing feature.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
    "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
    "these", "they", "this", "to", "was", "will", "with",
];

/// Lowercase, split on Unicode word boundaries, drop stopwords and
/// single-character tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Okapi BM25 score for a single term against a single document, given
/// the term's document frequency across the corpus.
pub fn score_bm25(
    term_frequency: i32,
    doc_length: f64,
    avg_doc_length: f64,
    doc_count: i64,
    doc_frequency: i64,
    k1: f64,
    b: f64,
) -> f32 {
    let tf = term_frequency as f64;
    let idf = (((doc_count as f64 - doc_frequency as f64 + 0.5) / (doc_frequency as f64 + 0.5))
        + 1.0)
        .ln();
    let denom = tf + k1 * (1.0 - b + b * (doc_length / avg_doc_length));
    (idf * (tf * (k1 + 1.0)) / denom) as f32
}

/// BM25 candidate generation over the inverted index.
pub struct Bm25Index {
    docs: Arc<dyn DocumentIndexRepository>,
}

impl Bm25Index {
    pub fn new(docs: Arc<dyn DocumentIndexRepository>) -> Self {
        Self { docs }
    }

    /// Top `limit` documents by summed BM25 score across the query's terms.
    pub async fn candidates(&self, query: &str, limit: usize) -> Result<Vec<(Uuid, f32)>> {
        let terms = tokenize(query);
        let (doc_count, avg_doc_length) = self.docs.corpus_stats().await?;
        if doc_count == 0 {
            return Ok(vec![]);
        }

        let mut scores: HashMap<Uuid, f32> = HashMap::new();
        for term in &terms {
            let postings = self.docs.postings_for_term(term).await?;
            let doc_frequency = postings.len() as i64;
            if doc_frequency == 0 {
                continue;
            }
            for posting in postings {
                let entry = self.docs.get_document(posting.document_id).await?;
                let score = score_bm25(
                    posting.term_frequency,
                    entry.token_count as f64,
                    avg_doc_length,
                    doc_count,
                    doc_frequency,
                    defaults::BM25_K1 as f64,
                    defaults::BM25_B as f64,
                );
                *scores.entry(posting.document_id).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(Uuid, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }
}
