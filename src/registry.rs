use std::sync::Arc;

use crate::chunker::{Chunker, DocumentChunker, SqlChunker};
use crate::error::DbsError;
use crate::mapper::{ArcMapper, DocumentMapper, SqlMapper};

/// Closed, compile-time tag → constructor mapping for chunker/mapper
/// variants. No dynamic code loading, no hot-reload: new component kinds
/// require a new build.
pub struct ComponentRegistry;

impl ComponentRegistry {
    pub fn chunker(tag: &str) -> Result<Arc<dyn Chunker>, DbsError> {
        match tag {
            "document" => Ok(Arc::new(DocumentChunker)),
            "sql" => Ok(Arc::new(SqlChunker)),
            other => Err(DbsError::UnknownComponent(other.to_string())),
        }
    }

    pub fn mapper(tag: &str, dimension: usize) -> Result<ArcMapper, DbsError> {
        match tag {
            "document" => Ok(Arc::new(DocumentMapper::new(dimension))),
            "sql" => Ok(Arc::new(SqlMapper::new(dimension))),
            other => Err(DbsError::UnknownComponent(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_fails() {
        assert!(ComponentRegistry::chunker("xml").is_err());
        assert!(ComponentRegistry::mapper("xml", 4).is_err());
    }

    #[test]
    fn known_tags_resolve() {
        assert!(ComponentRegistry::chunker("document").is_ok());
        assert!(ComponentRegistry::chunker("sql").is_ok());
        assert!(ComponentRegistry::mapper("document", 4).is_ok());
        assert!(ComponentRegistry::mapper("sql", 4).is_ok());
    }
}
