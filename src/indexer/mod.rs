// Indexer module
// Incremental ingestion of the knowledge directory into the knowledge base


use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embeddings::{Chunker, Embedder, EmbeddingModel};
use crate::parser::{DocumentParser, FileFailure};
use crate::store::{ChunkRecord, KnowledgeBase, SeenFiles, StorePaths};
use crate::{KbError, Result};

/// Statistics about a single ingestion run
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub files_discovered: usize,
    pub new_files: usize,
    pub parsed_files: usize,
    pub failures: Vec<FileFailure>,
    pub chunks_created: usize,
    /// Vectors in the index after the run, when the index was updated
    pub index_size: Option<usize>,
    /// Nothing new was found and nothing was written
    pub no_op: bool,
}

/// Ingests files under a root directory that have not been seen before
pub struct Indexer<'a, P, M> {
    root: PathBuf,
    paths: StorePaths,
    chunker: Chunker,
    parser: P,
    embedder: &'a Embedder<M>,
}

impl<'a, P: DocumentParser, M: EmbeddingModel> Indexer<'a, P, M> {
    #[inline]
    pub fn new(
        root: PathBuf,
        paths: StorePaths,
        chunker: Chunker,
        parser: P,
        embedder: &'a Embedder<M>,
    ) -> Self {
        Self {
            root,
            paths,
            chunker,
            parser,
            embedder,
        }
    }

    /// Build an indexer for the directories and chunking settings in `config`
    #[inline]
    pub fn from_config(config: &Config, parser: P, embedder: &'a Embedder<M>) -> Result<Self> {
        let chunker = Chunker::try_from(config.chunking)?;
        Ok(Self::new(
            config.knowledge_dir(),
            config.store_paths(),
            chunker,
            parser,
            embedder,
        ))
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every regular file under the root, in a stable order
    #[inline]
    pub fn discover_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(KbError::Config(format!(
                "knowledge directory {} does not exist",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| KbError::Io(e.into()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        debug!("Discovered {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Run one ingestion pass.
    ///
    /// The seen-files ledger is only written after the index and metadata
    /// have been saved, so an interrupted run re-ingests its files next time.
    #[inline]
    pub fn run(&self) -> Result<IngestionReport> {
        let mut seen = SeenFiles::load(&self.paths.seen)?;
        let files = self.discover_files()?;

        let new_files: Vec<PathBuf> = files
            .iter()
            .filter(|path| !seen.contains(&self.source_key(path)))
            .cloned()
            .collect();

        let mut report = IngestionReport {
            files_discovered: files.len(),
            new_files: new_files.len(),
            ..IngestionReport::default()
        };

        if new_files.is_empty() {
            info!("No new files to ingest under {}", self.root.display());
            report.no_op = true;
            return Ok(report);
        }

        info!("Ingesting {} new files", new_files.len());

        let mut outcome = self.parser.parse_all(&new_files);
        report.parsed_files = outcome.documents.len();
        report.failures = outcome.failures;

        // Records name their file the same way the ledger does
        for (path, document) in &mut outcome.documents {
            document.source = self.source_key(path);
        }
        let parsed: Vec<String> = outcome
            .documents
            .iter()
            .map(|(_, document)| document.source.clone())
            .collect();

        let records: Vec<ChunkRecord> = outcome
            .documents
            .iter()
            .flat_map(|(_, document)| self.chunker.chunk_document(document))
            .collect();
        report.chunks_created = records.len();

        if records.is_empty() {
            info!("New files produced no chunks, recording them as seen");
            seen.extend(parsed);
            seen.persist(&self.paths.seen)?;
            return Ok(report);
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let vectors = self.embedder.embed(&texts)?;
        let dimension = vectors.first().map_or(0, Vec::len);

        let mut knowledge_base = match KnowledgeBase::open(&self.paths)? {
            Some(existing) => existing,
            None => {
                debug!("Creating knowledge base with dimension {}", dimension);
                KnowledgeBase::new(dimension)
            }
        };

        knowledge_base.append(&vectors, records)?;
        knowledge_base.persist(&self.paths)?;

        seen.extend(parsed);
        seen.persist(&self.paths.seen)?;

        report.index_size = Some(knowledge_base.len());

        if report.failures.is_empty() {
            info!(
                "Added {} chunks; index now holds {} vectors",
                report.chunks_created,
                knowledge_base.len()
            );
        } else {
            warn!(
                "Added {} chunks; {} files failed and will be retried",
                report.chunks_created,
                report.failures.len()
            );
        }

        Ok(report)
    }

    /// Key under which a file is tracked in the seen-files ledger.
    ///
    /// The key is the path relative to the knowledge root with `/`
    /// separators, so it does not depend on how the base directory was
    /// spelled on the command line.
    #[inline]
    pub fn source_key(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
