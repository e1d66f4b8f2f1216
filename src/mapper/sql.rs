use std::sync::Arc;

use arrow_array::{Array, ArrayRef, Float32Array, Float64Array, Int64Array, FixedSizeListArray, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use super::Mapper;
use crate::error::DbsError;
use crate::models::{Chunk, SearchResult, SqlChunk, SqlSearchResult};

pub struct SqlMapper {
    pub dimension: usize,
}

impl SqlMapper {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Mapper for SqlMapper {
    fn schema(&self) -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), self.dimension as i32),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("raw_query", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("execution_time_ms", DataType::Float64, false),
            Field::new("calls", DataType::Int64, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("workflow", DataType::Utf8, false),
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
        let mut raw_queries = Vec::with_capacity(chunks.len());
        let mut sources = Vec::with_capacity(chunks.len());
        let mut exec_times = Vec::with_capacity(chunks.len());
        let mut calls = Vec::with_capacity(chunks.len());
        let mut hashes = Vec::with_capacity(chunks.len());

        let mut flat: Vec<f32> = Vec::with_capacity(chunks.len() * self.dimension);

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let Chunk::Sql(c) = chunk else {
                return Err(DbsError::Store("SqlMapper received a non-sql chunk".to_string()));
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
            raw_queries.push(c.raw_query.clone());
            sources.push(c.source.clone());
            exec_times.push(c.execution_time_ms);
            calls.push(c.calls);
            hashes.push(c.content_hash.clone());
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
                Arc::new(StringArray::from(raw_queries)) as ArrayRef,
                Arc::new(StringArray::from(sources)) as ArrayRef,
                Arc::new(Float64Array::from(exec_times)) as ArrayRef,
                Arc::new(Int64Array::from(calls)) as ArrayRef,
                Arc::new(StringArray::from(hashes)) as ArrayRef,
                Arc::new(StringArray::from(workflows)) as ArrayRef,
            ],
        )?;

        Ok(batch)
    }

    fn from_row(&self, batch: &RecordBatch, row_idx: usize, score: Option<f32>) -> Result<SearchResult, DbsError> {
        let str_col = |name: &str| -> Result<&StringArray, DbsError> {
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

        let idx_of = |name: &str| -> Result<usize, DbsError> {
            batch
                .schema()
                .index_of(name)
                .map_err(|e| DbsError::Store(format!("missing column '{name}': {e}")))
        };

        let exec_col = batch
            .column(idx_of("execution_time_ms")?)
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| DbsError::Store("column 'execution_time_ms' has unexpected type".to_string()))?;

        let calls_col = batch
            .column(idx_of("calls")?)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| DbsError::Store("column 'calls' has unexpected type".to_string()))?;

        let chunk = SqlChunk {
            id: str_col("id")?.value(row_idx).to_string(),
            text: str_col("text")?.value(row_idx).to_string(),
            raw_query: str_col("raw_query")?.value(row_idx).to_string(),
            source: str_col("source")?.value(row_idx).to_string(),
            execution_time_ms: exec_col.value(row_idx),
            calls: calls_col.value(row_idx),
            content_hash: str_col("content_hash")?.value(row_idx).to_string(),
        };

        Ok(SearchResult::Sql(SqlSearchResult {
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
    use crate::models::SqlChunk;

    fn sample_chunk() -> Chunk {
        Chunk::Sql(SqlChunk {
            id: "h1".to_string(),
            text: "SELECT 1".to_string(),
            raw_query: "SELECT 1".to_string(),
            source: "db1".to_string(),
            execution_time_ms: 123.4,
            calls: 7,
            content_hash: "abcdef0123456789".to_string(),
        })
    }

    #[test]
    fn round_trips_sql_fields() {
        let mapper = SqlMapper::new(3);
        let chunks = vec![sample_chunk()];
        let vectors = vec![vec![0.1, 0.2, 0.3]];
        let batch = mapper.to_record_batch(&chunks, &vectors, "default").unwrap();

        let SearchResult::Sql(result) = mapper.from_row(&batch, 0, Some(0.05)).unwrap() else {
            panic!("expected sql result")
        };
        assert_eq!(result.chunk.execution_time_ms, 123.4);
        assert_eq!(result.chunk.calls, 7);
        assert_eq!(result.chunk.source, "db1");
    }
}
