use std::path::Path;

use ignore::WalkBuilder;

use crate::chunker::Chunker;
use crate::config::Settings;
use crate::embedder::Embedder;
use crate::error::DbsError;
use crate::mapper::ArcMapper;
use crate::models::{Chunk, InputDocument};
use crate::registry::ComponentRegistry;
use crate::store::VectorStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub new_chunks: usize,
    pub skipped_chunks: usize,
}

/// Orchestrates chunker → dedup → embedder → store for one engine,
/// idempotently. Write paths on a single engine must not overlap;
/// independent engines may ingest in parallel.
pub struct IngestionService {
    chunker: std::sync::Arc<dyn Chunker>,
    mapper: ArcMapper,
    embedder: Embedder,
    store: VectorStore,
    chunk_max_chars: usize,
    workflow: String,
    batch_size: usize,
}

impl IngestionService {
    pub async fn new(settings: &Settings, engine_tag: &str) -> Result<Self, DbsError> {
        let engine_cfg = settings.engine(engine_tag)?;
        let chunker = ComponentRegistry::chunker(&engine_cfg.chunker_type)?;
        let mapper = ComponentRegistry::mapper(&engine_cfg.mapper_type, engine_cfg.vector_dimension)?;
        let embedder = Embedder::new(engine_cfg)?;
        let store = VectorStore::open(
            &settings.system.db_path,
            &engine_cfg.table_name,
            engine_cfg.vector_dimension,
            mapper.clone(),
            settings.system.nprobes,
        )
        .await?;

        Ok(Self {
            chunker,
            mapper,
            embedder,
            store,
            chunk_max_chars: engine_cfg.chunk_max_chars,
            workflow: engine_cfg.workflow.clone(),
            batch_size: settings.system.batch_size as usize,
        })
    }

    pub async fn run(&self, target: &Path, rebuild: bool) -> Result<IngestReport, DbsError> {
        tracing::info!(target = %target.display(), "starting ingest");

        if rebuild {
            self.store.clear().await?;
        }

        let files = enumerate_inputs(target, self.chunker.supported_extensions())?;

        let mut chunks: Vec<Chunk> = Vec::new();
        for file in &files {
            let bytes = std::fs::read(file).map_err(|e| DbsError::Store(format!("failed to read {}: {e}", file.display())))?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let filepath = file.to_string_lossy().replace('\\', "/");
            let doc = InputDocument::new(filepath, content);
            chunks.extend(self.chunker.process(&doc, self.chunk_max_chars));
        }

        tracing::info!("checking for existing documents");
        let existing_hashes = self.store.get_existing_hashes().await?;

        let mut report = IngestReport::default();
        for batch in chunks.chunks(self.batch_size.max(1)) {
            let (new, skipped): (Vec<&Chunk>, Vec<&Chunk>) = batch
                .iter()
                .partition(|c| !existing_hashes.contains(c.content_hash()));

            report.skipped_chunks += skipped.len();

            if new.is_empty() {
                continue;
            }

            let texts: Vec<String> = new.iter().map(|c| c.text().to_string()).collect();
            let vectors = self.embedder.embed_batch(&texts).map_err(|e| match e {
                DbsError::Validation(_) => e,
                other => DbsError::Inference(other.to_string()),
            })?;

            let new_owned: Vec<Chunk> = new.into_iter().cloned().collect();
            self.store.ingest_chunks(&new_owned, &vectors, &self.workflow).await?;

            report.new_chunks += new_owned.len();
            tracing::info!(new = new_owned.len(), total_new = report.new_chunks, "ingested batch");
        }

        if report.skipped_chunks > 0 {
            tracing::info!(skipped = report.skipped_chunks, "skipped already-indexed chunks");
        }

        self.store.create_indices().await?;
        self.store.compact().await?;
        tracing::info!(new_chunks = report.new_chunks, skipped = report.skipped_chunks, "ingest complete");

        Ok(report)
    }

    pub fn mapper(&self) -> &ArcMapper {
        &self.mapper
    }
}

/// Directory targets are walked (gitignore-aware) and filtered by
/// extension; anything else is treated as a glob pattern.
fn enumerate_inputs(target: &Path, supported_extensions: &[&str]) -> Result<Vec<std::path::PathBuf>, DbsError> {
    if target.is_dir() {
        let mut out = Vec::new();
        let walker = WalkBuilder::new(target).standard_filters(true).build();
        for entry in walker {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.into_path();
            let matches_ext = supported_extensions
                .iter()
                .any(|ext| path.to_string_lossy().to_lowercase().ends_with(ext));
            if matches_ext {
                out.push(path);
            }
        }
        out.sort();
        Ok(out)
    } else {
        let pattern = target.to_string_lossy();
        let mut out = Vec::new();
        for entry in glob::glob(&pattern).map_err(|e| DbsError::Validation(format!("invalid glob pattern '{pattern}': {e}")))? {
            if let Ok(path) = entry {
                if path.is_file() {
                    out.push(path);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn directory_walk_filters_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# hi").unwrap();
        fs::write(dir.path().join("b.txt"), "hello").unwrap();
        fs::write(dir.path().join("c.png"), [0u8, 1, 2]).unwrap();

        let files = enumerate_inputs(dir.path(), &[".md", ".txt"]).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn glob_expansion_keeps_regular_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("q1.json"), "[]").unwrap();
        fs::write(dir.path().join("q2.json"), "[]").unwrap();
        let pattern = dir.path().join("*.json");

        let files = enumerate_inputs(Path::new(&pattern), &[".json"]).unwrap();
        assert_eq!(files.len(), 2);
    }
}
