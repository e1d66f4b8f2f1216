use std::sync::Arc;

use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use super::Mapper;
use crate::error::DbsError;
use crate::models::{Chunk, DocChunk, DocSearchResult, SearchResult};

pub struct DocumentMapper {
    pub dimension: usize,
}

impl DocumentMapper {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Mapper for DocumentMapper {
    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), self.dimension as i32),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("workflow", DataType::Utf8, false),
            Field::new("node_type", DataType::Utf8, true),
            Field::new("parent_scope", DataType::Utf8, true),
            Field::new("line_range", DataType::Utf8, true),
        ]))
    }

    fn to_record_batch(&self, chunks: &[Chunk], vectors: &[Vec<f32>], workflow: &str) -> Result<RecordBatch, DbsError> {
        if vectors.len() != chunks.len() {
            return Err(DbsError::Store(format!(
                "vectors/chunks length mismatch: {} vs {}",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut ids = Vec::with_capacity(chunks.len());
        let mut texts = Vec::with_capacity(chunks.len());
        let mut sources = Vec::with_capacity(chunks.len());
        let mut hashes = Vec::with_capacity(chunks.len());
        let mut node_types: Vec<Option<String>> = Vec::with_capacity(chunks.len());
        let mut parent_scopes: Vec<Option<String>> = Vec::with_capacity(chunks.len());
        let mut line_ranges: Vec<Option<String>> = Vec::with_capacity(chunks.len());

        let mut flat: Vec<f32> = Vec::with_capacity(chunks.len() * self.dimension);

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let Chunk::Doc(c) = chunk else {
                return Err(DbsError::Store("DocumentMapper received a non-document chunk".to_string()));
            };
            if vector.len() != self.dimension {
                return Err(DbsError::Store(format!(
                    "vector dimension mismatch: expected {}, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
            ids.push(c.id.clone());
            texts.push(c.text.clone());
            sources.push(c.source.clone());
            hashes.push(c.content_hash.clone());
            node_types.push(c.node_type.clone());
            parent_scopes.push(c.parent_scope.clone());
            line_ranges.push(c.line_range.clone());
            flat.extend_from_slice(vector);
        }

        let workflows: Vec<&str> = std::iter::repeat_n(workflow, chunks.len()).collect();

        let values: ArrayRef = Arc::new(Float32Array::from(flat));
        let item_field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_arr: ArrayRef = Arc::new(FixedSizeListArray::try_new(item_field, self.dimension as i32, values, None)?);

        let batch = RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(StringArray::from(ids)) as ArrayRef,
                vector_arr,
                Arc::new(StringArray::from(texts)) as ArrayRef,
                Arc::new(StringArray::from(sources)) as ArrayRef,
                Arc::new(StringArray::from(hashes)) as ArrayRef,
                Arc::new(StringArray::from(workflows)) as ArrayRef,
                Arc::new(StringArray::from(node_types)) as ArrayRef,
                Arc::new(StringArray::from(parent_scopes)) as ArrayRef,
                Arc::new(StringArray::from(line_ranges)) as ArrayRef,
            ],
        )?;

        Ok(batch)
    }

    fn from_row(&self, batch: &RecordBatch, row_idx: usize, score: Option<f32>) -> Result<SearchResult, DbsError> {
        let col = |name: &str| -> Result<&StringArray, DbsError> {
            let idx = batch
                .schema()
                .index_of(name)
                .map_err(|e| DbsError::Store(format!("missing column '{name}': {e}")))?;
            batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DbsError::Store(format!("column '{name}' has unexpected type")))
        };

        let nullable_str = |arr: &StringArray, idx: usize| -> Option<String> {
            if arr.is_valid(idx) {
                Some(arr.value(idx).to_string())
            } else {
                None
            }
        };

        let id_col = col("id")?;
        let text_col = col("text")?;
        let source_col = col("source")?;
        let hash_col = col("content_hash")?;
        let node_type_col = col("node_type")?;
        let parent_scope_col = col("parent_scope")?;
        let line_range_col = col("line_range")?;

        let chunk = DocChunk {
            id: id_col.value(row_idx).to_string(),
            text: text_col.value(row_idx).to_string(),
            source: source_col.value(row_idx).to_string(),
            content_hash: hash_col.value(row_idx).to_string(),
            node_type: nullable_str(node_type_col, row_idx),
            parent_scope: nullable_str(parent_scope_col, row_idx),
            line_range: nullable_str(line_range_col, row_idx),
        };

        Ok(SearchResult::Document(DocSearchResult {
            chunk,
            distance: score,
            score,
            is_fts_match: score.is_none(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocChunk;

    fn sample_chunk() -> Chunk {
        Chunk::Doc(DocChunk {
            id: "a.md_chunk_0".to_string(),
            text: "hello world".to_string(),
            source: "a.md".to_string(),
            content_hash: "abcdef0123456789".to_string(),
            node_type: None,
            parent_scope: None,
            line_range: None,
        })
    }

    #[test]
    fn round_trips_a_single_chunk() {
        let mapper = DocumentMapper::new(4);
        let chunks = vec![sample_chunk()];
        let vectors = vec![vec![0.1, 0.2, 0.3, 0.4]];
        let batch = mapper.to_record_batch(&chunks, &vectors, "default").unwrap();

        let SearchResult::Document(result) = mapper.from_row(&batch, 0, Some(0.12)).unwrap() else {
            panic!("expected document result")
        };
        assert_eq!(result.chunk.id, "a.md_chunk_0");
        assert_eq!(result.chunk.text, "hello world");
        assert!(!result.is_fts_match);
        assert_eq!(result.score, Some(0.12));
    }

    #[test]
    fn null_score_marks_fts_match() {
        let mapper = DocumentMapper::new(4);
        let chunks = vec![sample_chunk()];
        let vectors = vec![vec![0.1, 0.2, 0.3, 0.4]];
        let batch = mapper.to_record_batch(&chunks, &vectors, "default").unwrap();

        let SearchResult::Document(result) = mapper.from_row(&batch, 0, None).unwrap() else {
            panic!("expected document result")
        };
        assert!(result.is_fts_match);
        assert_eq!(result.distance, None);
    }

    #[test]
    fn rejects_vector_chunk_length_mismatch() {
        let mapper = DocumentMapper::new(4);
        let chunks = vec![sample_chunk()];
        let vectors = vec![vec![0.1, 0.2], vec![0.3, 0.4]];
        assert!(mapper.to_record_batch(&chunks, &vectors, "default").is_err());
    }
}
