use std::collections::HashSet;
use std::path::{Path, PathBuf};

use arrow_array::{Array, StringArray};
use futures::TryStreamExt;
use lancedb::index::scalar::FtsIndexBuilder;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, DistanceType, Table};

use crate::error::DbsError;
use crate::mapper::ArcMapper;
use crate::models::{Chunk, SearchResult};

/// Row count below which building an IVF-PQ vector index is skipped.
const MIN_ROWS_FOR_VECTOR_INDEX: usize = 256;
const MAX_PARTITIONS: usize = 256;

pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    mapper: ArcMapper,
    nprobes: u32,
}

impl VectorStore {
    pub async fn open(db_path: &Path, table_name: &str, dimension: usize, mapper: ArcMapper, nprobes: u32) -> Result<Self, DbsError> {
        std::fs::create_dir_all(db_path).map_err(|e| DbsError::Store(format!("failed to create db dir: {e}")))?;
        let connection = lancedb::connect(&db_path.to_string_lossy())
            .execute()
            .await
            .map_err(|e| DbsError::Store(format!("failed to open lancedb at {}: {e}", db_path.display())))?;

        let schema = mapper.schema();
        match connection.open_table(table_name).execute().await {
            Ok(existing) => {
                let existing_schema = existing
                    .schema()
                    .await
                    .map_err(|e| DbsError::Store(e.to_string()))?;
                if existing_schema.as_ref() != schema.as_ref() {
                    return Err(DbsError::SchemaMismatch {
                        table: table_name.to_string(),
                        detail: "existing table schema does not match the configured mapper schema".to_string(),
                    });
                }
            }
            Err(_) => {
                connection
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
                    .map_err(|e| DbsError::Store(format!("failed to create table '{table_name}': {e}")))?;
            }
        }

        Ok(Self {
            connection,
            table_name: table_name.to_string(),
            dimension,
            mapper,
            nprobes,
        })
    }

    async fn table(&self) -> Result<Table, DbsError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| DbsError::Store(format!("failed to open table '{}': {e}", self.table_name)))
    }

    pub fn db_dir(&self) -> PathBuf {
        PathBuf::from(self.connection.uri())
    }

    /// Drop the table (idempotent) and recreate it empty.
    pub async fn clear(&self) -> Result<(), DbsError> {
        let _ = self.connection.drop_table(&self.table_name).await;
        self.connection
            .create_empty_table(&self.table_name, self.mapper.schema())
            .execute()
            .await
            .map_err(|e| DbsError::Store(format!("failed to recreate table '{}': {e}", self.table_name)))?;
        Ok(())
    }

    /// No-op on an empty batch; otherwise encode via the mapper and append atomically.
    pub async fn ingest_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>], workflow: &str) -> Result<(), DbsError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = self.mapper.to_record_batch(chunks, vectors, workflow)?;
        let schema = batch.schema();
        let reader = arrow_array::RecordBatchIterator::new(vec![Ok(batch)], schema);
        let table = self.table().await?;
        table
            .add(Box::new(reader))
            .execute()
            .await
            .map_err(|e| DbsError::Store(format!("append failed: {e}")))?;
        Ok(())
    }

    /// Returns an empty set without scanning when the table is empty.
    pub async fn get_existing_hashes(&self) -> Result<HashSet<String>, DbsError> {
        let table = self.table().await?;
        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| DbsError::Store(e.to_string()))?;
        if row_count == 0 {
            return Ok(HashSet::new());
        }

        let mut stream = table
            .query()
            .select(Select::columns(&["content_hash"]))
            .execute()
            .await
            .map_err(|e| DbsError::Store(e.to_string()))?;

        let mut out = HashSet::with_capacity(row_count);
        while let Some(rb) = stream.try_next().await.map_err(|e| DbsError::Store(e.to_string()))? {
            let idx = rb
                .schema()
                .index_of("content_hash")
                .map_err(|e| DbsError::Store(e.to_string()))?;
            let col = rb
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| DbsError::Store("content_hash column has unexpected type".to_string()))?;
            for i in 0..col.len() {
                if col.is_valid(i) {
                    out.insert(col.value(i).to_string());
                }
            }
        }
        Ok(out)
    }

    pub async fn compact(&self) -> Result<(), DbsError> {
        let table = self.table().await?;
        table
            .optimize(lancedb::table::OptimizeAction::All)
            .await
            .map_err(|e| DbsError::Store(format!("compaction failed: {e}")))?;
        Ok(())
    }

    /// FTS build failures are logged and swallowed; vector index failures propagate.
    pub async fn create_indices(&self) -> Result<(), DbsError> {
        let table = self.table().await?;

        if let Err(e) = table
            .create_index(&["text"], Index::FTS(FtsIndexBuilder::default()))
            .replace(true)
            .execute()
            .await
        {
            tracing::warn!(table = %self.table_name, error = %e, "FTS indexing failed");
        }

        let row_count = table
            .count_rows(None)
            .await
            .map_err(|e| DbsError::Store(e.to_string()))?;
        if row_count < MIN_ROWS_FOR_VECTOR_INDEX {
            return Ok(());
        }

        let num_partitions = ((row_count as f64).sqrt().floor() as usize).min(MAX_PARTITIONS).max(1);
        table
            .create_index(
                &["vector"],
                Index::IvfPq(IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine).num_partitions(num_partitions as u32)),
            )
            .execute()
            .await
            .map_err(|e| DbsError::IndexBuildFailure(e.to_string()))?;

        Ok(())
    }

    /// Hybrid (vector + FTS) search with optional AND-composed prefilters.
    /// Falls back to vector-only search (reapplying the same prefilters) on
    /// any hybrid-path failure.
    pub async fn search(
        &self,
        query: &str,
        query_vector: &[f32],
        prefilters: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>, DbsError> {
        if query_vector.len() != self.dimension {
            return Err(DbsError::Store(format!(
                "query vector dimension mismatch: expected {}, got {}",
                self.dimension,
                query_vector.len()
            )));
        }

        let table = self.table().await?;
        let predicate = (!prefilters.is_empty()).then(|| prefilters.join(" AND "));

        let hybrid_result = self.run_hybrid(&table, query, query_vector, predicate.as_deref(), limit).await;

        let batches = match hybrid_result {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "hybrid search unavailable, falling back to vector-only");
                self.run_vector_only(&table, query_vector, predicate.as_deref(), limit).await?
            }
        };

        let mut results = Vec::new();
        for batch in &batches {
            let distance_idx = batch.schema().index_of("_distance").ok();
            for row in 0..batch.num_rows() {
                let score = distance_idx.and_then(|idx| {
                    let col = batch.column(idx).as_any().downcast_ref::<arrow_array::Float32Array>()?;
                    if col.is_valid(row) {
                        Some(col.value(row))
                    } else {
                        None
                    }
                });
                results.push(self.mapper.from_row(batch, row, score)?);
            }
        }
        Ok(results)
    }

    async fn run_hybrid(
        &self,
        table: &Table,
        query: &str,
        query_vector: &[f32],
        predicate: Option<&str>,
        limit: usize,
    ) -> Result<Vec<arrow_array::RecordBatch>, DbsError> {
        let mut q = table
            .query()
            .full_text_search(lancedb::query::FullTextSearchQuery::new(query.to_string()))
            .nearest_to(query_vector)
            .map_err(|e| DbsError::HybridUnavailable(e.to_string()))?
            .nprobes(self.nprobes as usize)
            .limit(limit);

        if let Some(pred) = predicate {
            q = q.only_if(pred);
        }

        let mut stream = q.execute().await.map_err(|e| DbsError::HybridUnavailable(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(b) = stream.try_next().await.map_err(|e| DbsError::HybridUnavailable(e.to_string()))? {
            out.push(b);
        }
        Ok(out)
    }

    async fn run_vector_only(
        &self,
        table: &Table,
        query_vector: &[f32],
        predicate: Option<&str>,
        limit: usize,
    ) -> Result<Vec<arrow_array::RecordBatch>, DbsError> {
        let mut q = table
            .query()
            .nearest_to(query_vector)
            .map_err(|e| DbsError::Store(e.to_string()))?
            .distance_type(DistanceType::Cosine)
            .nprobes(self.nprobes as usize)
            .limit(limit);

        if let Some(pred) = predicate {
            q = q.only_if(pred);
        }

        let mut stream = q.execute().await.map_err(|e| DbsError::Store(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(b) = stream.try_next().await.map_err(|e| DbsError::Store(e.to_string()))? {
            out.push(b);
        }
        Ok(out)
    }
}

/// Doubles every single quote per ANSI-SQL literal quoting, so a
/// `source_filter` value is always a literal-equality match, never an
/// injection vector.
pub fn escape_sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_single_quotes_for_literal_equality() {
        let escaped = escape_sql_literal("file' OR '1'='1");
        assert_eq!(escaped, "file'' OR ''1''=''1");
    }

    #[test]
    fn num_partitions_formula() {
        let row_count = 1_000usize;
        let n = ((row_count as f64).sqrt().floor() as usize).min(MAX_PARTITIONS).max(1);
        assert_eq!(n, 31);
    }
}
