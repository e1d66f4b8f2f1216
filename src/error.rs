use thiserror::Error;

/// Unified error taxonomy shared by every layer of the pipeline.
///
/// CLI/HTTP/MCP edges translate this into exit codes, status codes, or
/// JSON-RPC error payloads; the two "recovered locally" kinds never reach
/// here because the store/search layers absorb them before propagating.
#[derive(Debug, Error)]
pub enum DbsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("unknown engine: {0}")]
    UnknownEngine(String),

    #[error("schema mismatch for table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedder inference failed: {0}")]
    Inference(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("index build failed: {0}")]
    IndexBuildFailure(String),

    #[error("hybrid search unavailable: {0}")]
    HybridUnavailable(String),
}

pub type Result<T> = std::result::Result<T, DbsError>;

impl From<lancedb::Error> for DbsError {
    fn from(e: lancedb::Error) -> Self {
        DbsError::Store(e.to_string())
    }
}

impl From<arrow_schema::ArrowError> for DbsError {
    fn from(e: arrow_schema::ArrowError) -> Self {
        DbsError::Store(e.to_string())
    }
}
