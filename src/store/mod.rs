// Store module
// Persistent vector index and chunk metadata, kept positionally aligned

pub mod consistency;
pub mod index;
pub mod metadata;
pub mod seen;


use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempPath};
use tracing::{debug, info, warn};

use crate::{KbError, Result};

pub use consistency::{ConsistencyReport, consistency_report};
pub use index::{SearchHit, VectorIndex};
pub use metadata::{ChunkRecord, MetadataStore};
pub use seen::SeenFiles;

/// On-disk locations of everything an ingestion run persists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub seen: PathBuf,
}

/// The vector index and metadata store as one unit.
///
/// Position `i` of the metadata always describes vector `i` of the index.
/// Both halves are only ever loaded, extended and saved together.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    index: VectorIndex,
    metadata: MetadataStore,
}

impl KnowledgeBase {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            index: VectorIndex::new(dimension),
            metadata: MetadataStore::default(),
        }
    }

    #[inline]
    pub fn from_parts(index: VectorIndex, metadata: MetadataStore) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(KbError::CorruptState(format!(
                "index holds {} vectors but metadata holds {} records",
                index.len(),
                metadata.len()
            )));
        }

        Ok(Self { index, metadata })
    }

    /// Load the persisted pair, or `None` when neither file exists yet
    #[inline]
    pub fn open(paths: &StorePaths) -> Result<Option<Self>> {
        match (paths.index.exists(), paths.metadata.exists()) {
            (false, false) => {
                debug!("No persisted knowledge base at {}", paths.index.display());
                Ok(None)
            }
            (true, false) => Err(KbError::CorruptState(format!(
                "index file {} exists without metadata file {}",
                paths.index.display(),
                paths.metadata.display()
            ))),
            (false, true) => Err(KbError::CorruptState(format!(
                "metadata file {} exists without index file {}",
                paths.metadata.display(),
                paths.index.display()
            ))),
            (true, true) => {
                let index = VectorIndex::load(&paths.index)?;
                let metadata = MetadataStore::load(&paths.metadata)?;
                let knowledge_base = Self::from_parts(index, metadata)?;
                info!(
                    "Loaded knowledge base with {} vectors of dimension {}",
                    knowledge_base.len(),
                    knowledge_base.dimension()
                );
                Ok(Some(knowledge_base))
            }
        }
    }

    /// Append a batch of vectors and the records that produced them, in order
    #[inline]
    pub fn append(&mut self, vectors: &[Vec<f32>], records: Vec<ChunkRecord>) -> Result<()> {
        if vectors.len() != records.len() {
            return Err(KbError::CorruptState(format!(
                "refusing to append {} vectors with {} records",
                vectors.len(),
                records.len()
            )));
        }

        // The index validates the whole batch before changing anything
        self.index.add(vectors)?;
        self.metadata.append(records);
        Ok(())
    }

    /// Save both halves, staging each file before replacing either.
    ///
    /// The previous index is kept aside until the metadata has been
    /// replaced too. If either rename fails it is moved back, so an error
    /// leaves the files on disk as they were.
    #[inline]
    pub fn persist(&self, paths: &StorePaths) -> Result<()> {
        let staged_index = stage_file(&paths.index, &self.index.to_bytes()?)?;
        let staged_metadata = stage_file(&paths.metadata, &self.metadata.to_bytes()?)?;

        let previous_index = set_aside(&paths.index)?;
        let committed = commit_file(staged_index, &paths.index)
            .and_then(|()| commit_file(staged_metadata, &paths.metadata));

        if let Err(e) = committed {
            warn!("Saving the knowledge base failed, restoring the previous index: {}", e);
            restore(previous_index, &paths.index)?;
            return Err(e);
        }

        info!(
            "Saved {} vectors to {} and metadata to {}",
            self.len(),
            paths.index.display(),
            paths.metadata.display()
        );
        Ok(())
    }

    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.index.search(query, k)
    }

    #[inline]
    pub fn record(&self, position: usize) -> Result<&ChunkRecord> {
        self.metadata.get(position)
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

/// Write `bytes` to a temporary file next to `path`, flushed to disk
pub(crate) fn stage_file(path: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let directory = parent_dir(path);
    fs::create_dir_all(directory)?;

    let mut staged = NamedTempFile::new_in(directory)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    Ok(staged)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically move a staged file over `path`
pub(crate) fn commit_file(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.persist(path).map_err(|e| KbError::Io(e.error))?;
    debug!("Replaced {}", path.display());
    Ok(())
}

/// Move an existing file to a temporary name in the same directory.
///
/// The returned path deletes the moved file when dropped.
fn set_aside(path: &Path) -> Result<Option<TempPath>> {
    if !path.exists() {
        return Ok(None);
    }

    let backup = Builder::new()
        .prefix(".previous-")
        .tempfile_in(parent_dir(path))?
        .into_temp_path();
    fs::rename(path, &backup)?;
    debug!("Moved {} aside to {}", path.display(), backup.display());
    Ok(Some(backup))
}

/// Put a file moved by `set_aside` back, or remove `path` if there was none
fn restore(previous: Option<TempPath>, path: &Path) -> Result<()> {
    match previous {
        Some(backup) => backup.persist(path).map_err(|e| KbError::Io(e.error))?,
        None => match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

/// Replace `path` with `bytes` so readers see either the old or new content
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    commit_file(stage_file(path, bytes)?, path)
}
