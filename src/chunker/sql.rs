use serde_json::Value;

use super::Chunker;
use crate::models::{content_hash_hex, Chunk, InputDocument, SqlChunk};

/// Chunks a JSON array of SQL query-log records. Any record missing a
/// usable normalized query text is skipped; malformed top-level JSON
/// yields zero chunks rather than failing the pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlChunker;

impl Chunker for SqlChunker {
    fn process(&self, doc: &InputDocument, _max_chars: usize) -> Vec<Chunk> {
        let parsed: Value = match serde_json::from_str(&doc.content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(file = %doc.filepath, error = %e, "invalid JSON for SQL chunker");
                return Vec::new();
            }
        };

        let Value::Array(records) = parsed else {
            tracing::warn!(file = %doc.filepath, "SQL chunker input is not a JSON array");
            return Vec::new();
        };

        records
            .iter()
            .filter_map(|record| record_to_chunk(record))
            .map(Chunk::Sql)
            .collect()
    }

    fn supported_extensions(&self) -> &'static [&'static str] {
        &[".json"]
    }
}

fn str_field(record: &Value, key: &str) -> Option<String> {
    record.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn record_to_chunk(record: &Value) -> Option<SqlChunk> {
    let raw = str_field(record, "query").unwrap_or_default();

    let text = str_field(record, "normalized_query")
        .or_else(|| str_field(record, "normalized"))
        .unwrap_or_else(|| raw.clone());
    if text.trim().is_empty() {
        return None;
    }

    let id = str_field(record, "query_hash")
        .or_else(|| str_field(record, "id"))
        .unwrap_or_else(|| md5_hex(raw.as_bytes()));

    let source = str_field(record, "database")
        .or_else(|| str_field(record, "source"))
        .unwrap_or_else(|| "unknown".to_string());

    let execution_time_ms = record
        .get("duration")
        .and_then(Value::as_f64)
        .or_else(|| record.get("execution_time_ms").and_then(Value::as_f64))
        .unwrap_or(0.0);

    let calls = record
        .get("calls")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(1);

    let content_hash = content_hash_hex(text.as_bytes());

    Some(SqlChunk {
        id,
        text,
        raw_query: raw,
        source,
        execution_time_ms,
        calls,
        content_hash,
    })
}

fn md5_hex(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    let digest = Md5::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> InputDocument {
        InputDocument::new("q.json", content.to_string())
    }

    #[test]
    fn extracts_fields_with_fallback_order() {
        let content = r#"[{"query":"SELECT 1","normalized_query":"SELECT 1","duration":123.4,"calls":7,"database":"db1"}]"#;
        let d = doc(content);
        let chunks = SqlChunker.process(&d, 0);
        assert_eq!(chunks.len(), 1);
        let Chunk::Sql(c) = &chunks[0] else { panic!("expected sql chunk") };
        assert_eq!(c.source, "db1");
        assert_eq!(c.execution_time_ms, 123.4);
        assert_eq!(c.calls, 7);
    }

    #[test]
    fn calls_coerces_a_float_value_by_truncation() {
        let content = r#"[{"query":"SELECT 1","normalized_query":"SELECT 1","calls":7.9}]"#;
        let d = doc(content);
        let chunks = SqlChunker.process(&d, 0);
        let Chunk::Sql(c) = &chunks[0] else { panic!("expected sql chunk") };
        assert_eq!(c.calls, 7);
    }

    #[test]
    fn falls_back_to_md5_of_raw_when_no_id_present() {
        let content = r#"[{"query":"SELECT 2","normalized":"SELECT 2"}]"#;
        let d = doc(content);
        let chunks = SqlChunker.process(&d, 0);
        assert_eq!(chunks.len(), 1);
        let Chunk::Sql(c) = &chunks[0] else { panic!("expected sql chunk") };
        assert_eq!(c.id, md5_hex(b"SELECT 2"));
    }

    #[test]
    fn skips_records_with_empty_normalized_text() {
        let content = r#"[{"query":""}]"#;
        let d = doc(content);
        let chunks = SqlChunker.process(&d, 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn non_array_json_yields_zero_chunks() {
        let d = doc(r#"{"not":"an array"}"#);
        let chunks = SqlChunker.process(&d, 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn malformed_json_yields_zero_chunks() {
        let d = doc("not json at all");
        let chunks = SqlChunker.process(&d, 0);
        assert!(chunks.is_empty());
    }
}
