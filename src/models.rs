use serde::{Deserialize, Serialize};

/// A raw input file read during an ingestion pass. Transient: constructed
/// once per file, dropped after the chunker consumes it.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub filepath: String,
    pub content: String,
    /// First 16 hex chars of SHA-256 over `content`.
    pub content_hash: String,
}

impl InputDocument {
    pub fn new(filepath: impl Into<String>, content: String) -> Self {
        let content_hash = content_hash_hex(content.as_bytes());
        Self {
            filepath: filepath.into(),
            content,
            content_hash,
        }
    }
}

pub fn content_hash_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(bytes);
    let full = hex_encode(&digest);
    full[..16].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// A prose/markdown retrieval unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub content_hash: String,
    pub node_type: Option<String>,
    pub parent_scope: Option<String>,
    pub line_range: Option<String>,
}

/// A retrieval unit drawn from a SQL query-log export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlChunk {
    pub id: String,
    pub text: String,
    pub raw_query: String,
    pub source: String,
    pub execution_time_ms: f64,
    pub calls: i64,
    pub content_hash: String,
}

/// Tagged union over the two chunk shapes so mappers/stores can stay
/// generic over "a batch of chunks" without losing per-kind fields.
#[derive(Debug, Clone)]
pub enum Chunk {
    Doc(DocChunk),
    Sql(SqlChunk),
}

impl Chunk {
    pub fn id(&self) -> &str {
        match self {
            Chunk::Doc(c) => &c.id,
            Chunk::Sql(c) => &c.id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Chunk::Doc(c) => &c.text,
            Chunk::Sql(c) => &c.text,
        }
    }

    pub fn content_hash(&self) -> &str {
        match self {
            Chunk::Doc(c) => &c.content_hash,
            Chunk::Sql(c) => &c.content_hash,
        }
    }
}

/// A single hybrid/vector search hit, tagged by the originating engine kind.
///
/// Rendering logic switches on this tag rather than probing for
/// runtime-optional fields (Design Notes: "polymorphic result types").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SearchResult {
    Document(DocSearchResult),
    Sql(SqlSearchResult),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocSearchResult {
    pub chunk: DocChunk,
    pub distance: Option<f32>,
    pub score: Option<f32>,
    pub is_fts_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlSearchResult {
    pub chunk: SqlChunk,
    pub distance: Option<f32>,
    pub score: Option<f32>,
    pub is_fts_match: bool,
}

/// Per-engine configuration, mirroring the `engines` section of `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model_name: String,
    pub vector_dimension: usize,
    pub max_token_length: usize,
    pub table_name: String,
    pub mapper_type: String,
    pub chunker_type: String,
    pub chunk_max_chars: usize,
    pub query_prefix: String,
    pub passage_prefix: String,
    pub workflow: String,
    pub description: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_name: "intfloat/multilingual-e5-small".to_string(),
            vector_dimension: 384,
            max_token_length: 512,
            table_name: "default".to_string(),
            mapper_type: "document".to_string(),
            chunker_type: "document".to_string(),
            chunk_max_chars: 1_500,
            query_prefix: String::new(),
            passage_prefix: String::new(),
            workflow: "default".to_string(),
            description: String::new(),
        }
    }
}
