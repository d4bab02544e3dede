//! Integration tests for the BM25 lexical index.

use chrono::Utc;
use uuid::Uuid;
use waypoint_core::{DocTerm, DocumentIndexEntry, DocumentIndexRepository};
use waypoint_db::test_fixtures::TestDatabase;

#[tokio::test]
#[ignore]
async fn test_insert_and_fetch_document() {
    let test_db = TestDatabase::new().await;

    let doc_id = Uuid::new_v4();
    let entry = DocumentIndexEntry {
        id: doc_id,
        source_id: "doc-1".to_string(),
        title: "Rust async runtimes".to_string(),
        content: "tokio is a runtime for async rust".to_string(),
        token_count: 6,
        embedding: None,
        created_at: Utc::now(),
    };
    let terms = vec![
        DocTerm { document_id: doc_id, term: "tokio".to_string(), term_frequency: 1 },
        DocTerm { document_id: doc_id, term: "async".to_string(), term_frequency: 1 },
        DocTerm { document_id: doc_id, term: "rust".to_string(), term_frequency: 1 },
    ];

    test_db.db.doc_index.insert_document(&entry, &terms).await.unwrap();

    let fetched = test_db.db.doc_index.get_document(doc_id).await.unwrap();
    assert_eq!(fetched.source_id, "doc-1");

    let postings = test_db.db.doc_index.postings_for_term("tokio").await.unwrap();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0].document_id, doc_id);

    let (total_docs, avg_len) = test_db.db.doc_index.corpus_stats().await.unwrap();
    assert_eq!(total_docs, 1);
    assert!((avg_len - 6.0).abs() < f64::EPSILON);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn test_reindexing_a_document_drops_stale_postings() {
    let test_db = TestDatabase::new().await;

    let doc_id = Uuid::new_v4();
    let entry = DocumentIndexEntry {
        id: doc_id,
        source_id: "doc-2".to_string(),
        title: "v1".to_string(),
        content: "old content".to_string(),
        token_count: 2,
        embedding: None,
        created_at: Utc::now(),
    };
    test_db
        .db
        .doc_index
        .insert_document(
            &entry,
            &[DocTerm { document_id: doc_id, term: "old".to_string(), term_frequency: 1 }],
        )
        .await
        .unwrap();

    let mut updated = entry.clone();
    updated.content = "new content".to_string();
    test_db
        .db
        .doc_index
        .insert_document(
            &updated,
            &[DocTerm { document_id: doc_id, term: "new".to_string(), term_frequency: 1 }],
        )
        .await
        .unwrap();

    let stale = test_db.db.doc_index.postings_for_term("old").await.unwrap();
    assert!(stale.is_empty(), "reindexing must drop the document's old postings");

    let fresh = test_db.db.doc_index.postings_for_term("new").await.unwrap();
    assert_eq!(fresh.len(), 1);

    test_db.cleanup().await;
}
