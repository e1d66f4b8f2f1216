pub mod document;
pub mod sql;

use crate::models::{Chunk, InputDocument};

/// Translates a raw input document into a lazily-filtered sequence of
/// typed chunks. Never errors on malformed input: implementations log
/// and yield an empty sequence instead of aborting the ingestion pass.
pub trait Chunker: Send + Sync {
    fn process(&self, doc: &InputDocument, max_chars: usize) -> Vec<Chunk>;
    fn supported_extensions(&self) -> &'static [&'static str];
}

pub use document::DocumentChunker;
pub use sql::SqlChunker;
