use crate::config::Settings;
use crate::embedder::Embedder;
use crate::error::DbsError;
use crate::mapper::ArcMapper;
use crate::models::SearchResult;
use crate::registry::ComponentRegistry;
use crate::store::{escape_sql_literal, VectorStore};

const DEFAULT_LIMIT: usize = 5;

/// Embeds a query, dispatches hybrid search with prefilter predicates,
/// and returns typed results in store order (or ascending-distance order
/// on vector-only fallback).
pub struct SearchService {
    embedder: Embedder,
    store: VectorStore,
}

impl SearchService {
    pub async fn new(settings: &Settings, engine_tag: &str) -> Result<Self, DbsError> {
        let engine_cfg = settings.engine(engine_tag)?;
        let mapper: ArcMapper = ComponentRegistry::mapper(&engine_cfg.mapper_type, engine_cfg.vector_dimension)?;
        let embedder = Embedder::new(engine_cfg)?;
        let store = VectorStore::open(
            &settings.system.db_path,
            &engine_cfg.table_name,
            engine_cfg.vector_dimension,
            mapper,
            settings.system.nprobes,
        )
        .await?;

        Ok(Self { embedder, store })
    }

    pub async fn execute_query(
        &self,
        query: &str,
        source_filter: Option<&str>,
        limit: usize,
        min_time: Option<f64>,
    ) -> Result<Vec<SearchResult>, DbsError> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        let qv = self.embedder.embed_query(query)?;

        let mut prefilters = Vec::new();
        if let Some(s) = source_filter {
            prefilters.push(format!("source = '{}'", escape_sql_literal(s)));
        }
        if let Some(t) = min_time {
            prefilters.push(format!("execution_time_ms >= {t}"));
        }

        tracing::debug!(query, limit, ?source_filter, ?min_time, "executing search");
        self.store.search(query, &qv, &prefilters, limit).await
    }
}

/// Human-readable rendering used by the CLI `search` command and the
/// agent-tool handlers. Switches on the result tag, never on which
/// optional fields happen to be populated.
pub fn render_results_text(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        match r {
            SearchResult::Document(d) => {
                out.push_str(&format!(
                    "{}. [{}] score={:.4} source={}\n   {}\n",
                    i + 1,
                    if d.is_fts_match { "fts" } else { "vector" },
                    d.score.unwrap_or_default(),
                    d.chunk.source,
                    snippet(&d.chunk.text)
                ));
            }
            SearchResult::Sql(s) => {
                out.push_str(&format!(
                    "{}. [{}] score={:.4} source={} calls={} exec_ms={:.1}\n   {}\n",
                    i + 1,
                    if s.is_fts_match { "fts" } else { "vector" },
                    s.score.unwrap_or_default(),
                    s.chunk.source,
                    s.chunk.calls,
                    s.chunk.execution_time_ms,
                    snippet(&s.chunk.raw_query)
                ));
            }
        }
    }
    out
}

fn snippet(text: &str) -> String {
    const MAX: usize = 160;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(MAX).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocChunk, DocSearchResult};

    #[test]
    fn empty_results_render_a_placeholder() {
        assert_eq!(render_results_text(&[]), "No results found.");
    }

    #[test]
    fn renders_document_results_with_tag_switched_fields() {
        let result = SearchResult::Document(DocSearchResult {
            chunk: DocChunk {
                id: "a.md_chunk_0".to_string(),
                text: "hello world".to_string(),
                source: "a.md".to_string(),
                content_hash: "x".to_string(),
                node_type: None,
                parent_scope: None,
                line_range: None,
            },
            distance: Some(0.1),
            score: Some(0.1),
            is_fts_match: false,
        });
        let rendered = render_results_text(&[result]);
        assert!(rendered.contains("a.md"));
        assert!(rendered.contains("hello world"));
    }
}
