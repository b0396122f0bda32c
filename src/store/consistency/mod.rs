// Consistency inspection
// Reports on the persisted files without modifying them


use tracing::{debug, info, warn};

use super::{MetadataStore, SeenFiles, StorePaths, VectorIndex};

/// Snapshot of what is on disk and whether the pieces agree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub index_present: bool,
    pub metadata_present: bool,
    /// Number of vectors, if the index could be read
    pub vectors: Option<usize>,
    /// Number of chunk records, if the metadata could be read
    pub records: Option<usize>,
    pub dimension: Option<usize>,
    /// Number of files in the seen-files ledger, if it could be read
    pub seen_files: Option<usize>,
    pub problems: Vec<String>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// True when no knowledge base has been written yet
    #[inline]
    pub fn is_fresh(&self) -> bool {
        !self.index_present && !self.metadata_present
    }
}

/// Inspect the persisted files at `paths`.
///
/// Unreadable or mismatched files are recorded as problems rather than
/// returned as errors, so the report is always available.
#[inline]
pub fn consistency_report(paths: &StorePaths) -> ConsistencyReport {
    let index_present = paths.index.exists();
    let metadata_present = paths.metadata.exists();
    let mut problems = Vec::new();

    let mut vectors = None;
    let mut dimension = None;
    if index_present {
        match VectorIndex::load(&paths.index) {
            Ok(index) => {
                vectors = Some(index.len());
                dimension = Some(index.dimension());
            }
            Err(e) => problems.push(format!("index {}: {}", paths.index.display(), e)),
        }
    }

    let mut records = None;
    if metadata_present {
        match MetadataStore::load(&paths.metadata) {
            Ok(metadata) => records = Some(metadata.len()),
            Err(e) => problems.push(format!("metadata {}: {}", paths.metadata.display(), e)),
        }
    }

    match (index_present, metadata_present) {
        (true, false) => problems.push(format!(
            "index {} exists without metadata {}",
            paths.index.display(),
            paths.metadata.display()
        )),
        (false, true) => problems.push(format!(
            "metadata {} exists without index {}",
            paths.metadata.display(),
            paths.index.display()
        )),
        _ => {}
    }

    if let (Some(vector_count), Some(record_count)) = (vectors, records)
        && vector_count != record_count
    {
        problems.push(format!(
            "index holds {} vectors but metadata holds {} records",
            vector_count, record_count
        ));
    }

    let seen_files = match SeenFiles::load(&paths.seen) {
        Ok(seen) => Some(seen.len()),
        Err(e) => {
            problems.push(format!("seen files {}: {}", paths.seen.display(), e));
            None
        }
    };

    let is_consistent = problems.is_empty();
    if is_consistent {
        info!("Knowledge base files are consistent");
    } else {
        warn!("Found {} consistency problems", problems.len());
        for problem in &problems {
            debug!("Consistency problem: {}", problem);
        }
    }

    ConsistencyReport {
        index_present,
        metadata_present,
        vectors,
        records,
        dimension,
        seen_files,
        problems,
        is_consistent,
    }
}
