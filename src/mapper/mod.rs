pub mod document;
pub mod sql;

use std::sync::Arc;

use arrow_schema::SchemaRef;
use arrow_array::RecordBatch;

use crate::error::DbsError;
use crate::models::{Chunk, SearchResult};

/// Owns the binary columnar contract for a single engine: its Arrow
/// schema, how to encode chunks+vectors into a record batch, and how to
/// decode a result row back into a typed search result.
pub trait Mapper: Send + Sync {
    fn schema(&self) -> SchemaRef;

    fn to_record_batch(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        workflow: &str,
    ) -> Result<RecordBatch, DbsError>;

    fn from_row(&self, batch: &RecordBatch, row_idx: usize, score: Option<f32>) -> Result<SearchResult, DbsError>;
}

pub use document::DocumentMapper;
pub use sql::SqlMapper;

pub type ArcMapper = Arc<dyn Mapper>;
