use std::collections::HashMap;
use std::fs;

use dbs_vector::config::{SystemConfig, Settings};
use dbs_vector::ingest::IngestionService;
use dbs_vector::models::{EngineConfig, SearchResult};
use dbs_vector::search::SearchService;
use tempfile::tempdir;

fn md_engine() -> EngineConfig {
    EngineConfig {
        model_name: "intfloat/multilingual-e5-small".to_string(),
        vector_dimension: 384,
        max_token_length: 256,
        table_name: "e2e_docs".to_string(),
        mapper_type: "document".to_string(),
        chunker_type: "document".to_string(),
        chunk_max_chars: 500,
        query_prefix: "query: ".to_string(),
        passage_prefix: "passage: ".to_string(),
        workflow: "default".to_string(),
        description: String::new(),
    }
}

fn settings_for(db_path: &std::path::Path) -> Settings {
    let mut engines = HashMap::new();
    engines.insert("md".to_string(), md_engine());
    Settings {
        system: SystemConfig {
            db_path: db_path.to_path_buf(),
            batch_size: 32,
            nprobes: 10,
            log_level: "warn".to_string(),
            log_serialize: false,
        },
        engines,
    }
}

/// Ingests a small markdown corpus into a temporary store and confirms the
/// top hit matches the content we wrote, then confirms a second ingest
/// pass over the same corpus inserts zero new chunks.
#[tokio::test]
async fn ingest_then_search_round_trip() {
    let db_dir = tempdir().unwrap();
    let docs_dir = tempdir().unwrap();
    fs::write(docs_dir.path().join("a.md"), "# Title\n\nhello world, this is a real paragraph.\n").unwrap();

    let settings = settings_for(db_dir.path());

    let ingestion = IngestionService::new(&settings, "md").await.expect("build ingestion service");
    let first = ingestion.run(docs_dir.path(), false).await.expect("first ingest");
    assert!(first.new_chunks >= 1);

    let second = ingestion.run(docs_dir.path(), false).await.expect("second ingest");
    assert_eq!(second.new_chunks, 0, "re-ingesting the same corpus must insert zero new chunks");

    let search = SearchService::new(&settings, "md").await.expect("build search service");
    let results = search.execute_query("hello world", None, 5, None).await.expect("search succeeds");
    assert!(!results.is_empty(), "expected at least one hit");

    let SearchResult::Document(top) = &results[0] else {
        panic!("expected a document result");
    };
    assert!(top.chunk.source.ends_with("a.md"));
    assert!(top.chunk.text.contains("hello world"));
}

/// An empty query must be rejected before it reaches the store.
#[tokio::test]
async fn empty_query_is_rejected() {
    let db_dir = tempdir().unwrap();
    let settings = settings_for(db_dir.path());
    let search = SearchService::new(&settings, "md").await.expect("build search service");
    let err = search.execute_query("   ", None, 5, None).await.unwrap_err();
    assert!(matches!(err, dbs_vector::error::DbsError::Validation(_)));
}
