//! In-memory vector store with paired on-disk persistence.
//!
//! A [`VectorStore`] holds two index-aligned lists: the embedding vectors and
//! the [`ChunkRecord`]s (text + metadata) they were computed from. Position
//! `i` in one list always describes the same chunk as position `i` in the
//! other; [`VectorStore::append`] validates a whole batch before touching
//! either list so the two can never diverge.
//!
//! # Files
//!
//! | File | Contents |
//! |------|----------|
//! | `<name>.json` | JSON array of `{text, metadata}` records |
//! | `<name>.index` | header + `count × dims` little-endian `f32` |
//!
//! The index header binds the pair together:
//!
//! ```text
//! ┌──────────┬─────────┬──────┬───────┬──────────────────────┬─────────────┐
//! │ MEDRAGIX │ version │ dims │ count │ sha256(records file) │ vectors ... │
//! │ 8 bytes  │ u32 LE  │u32 LE│u64 LE │ 32 bytes             │ f32 LE      │
//! └──────────┴─────────┴──────┴───────┴──────────────────────┴─────────────┘
//! ```
//!
//! [`VectorStore::save`] writes both files to temporary siblings and renames
//! them into place. [`VectorStore::load`] refuses a pair whose checksum or
//! counts disagree, so an interrupted save is detected on the next start
//! instead of serving vectors against the wrong text.
//!
//! # Concurrency
//!
//! Search takes `&self` and never mutates; a store behind an `Arc` can be
//! queried from any number of tasks. Mutation requires `&mut self` and is only
//! done by the offline ingestion path before the store is shared.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::embedding::{bytes_to_vec, cosine_similarity, vec_to_bytes};
use crate::models::{Chunk, ChunkRecord, ScoredResult, StoreStats};

const MAGIC: &[u8; 8] = b"MEDRAGIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8 + 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store is incomplete: {present} exists but {missing} is missing")]
    IncompletePair { present: PathBuf, missing: PathBuf },

    #[error("vector store files are inconsistent: {0}")]
    Inconsistent(String),

    #[error("vector store index is corrupt: {0}")]
    Corrupt(String),

    #[error("dimension mismatch: store holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("vector store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("vector store records are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Locations of the two companion files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub index: PathBuf,
    pub records: PathBuf,
}

impl StorePaths {
    pub fn new(index: impl Into<PathBuf>, records: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            records: records.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.index_path(), config.records_path())
    }

    /// True when both files exist.
    pub fn exists(&self) -> bool {
        self.index.exists() && self.records.exists()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    dims: usize,
    vectors: Vec<Vec<f32>>,
    records: Vec<ChunkRecord>,
}

impl VectorStore {
    /// Creates an empty store for vectors of `dims` dimensions.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            num_chunks: self.len(),
            dims: self.dims,
        }
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Appends chunks to the store.
    ///
    /// Every chunk is validated first; if any embedding has the wrong
    /// dimensionality or a non-finite component, nothing is appended.
    pub fn append(&mut self, chunks: Vec<Chunk>) -> Result<(), StoreError> {
        for chunk in &chunks {
            if chunk.embedding.len() != self.dims {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dims,
                    actual: chunk.embedding.len(),
                });
            }
            if chunk.embedding.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::InvalidVector(
                    "embedding contains NaN or infinite values".to_string(),
                ));
            }
        }

        self.vectors.reserve(chunks.len());
        self.records.reserve(chunks.len());
        for chunk in chunks {
            self.vectors.push(chunk.embedding);
            self.records.push(ChunkRecord {
                text: chunk.text,
                metadata: chunk.metadata,
            });
        }
        debug_assert_eq!(self.vectors.len(), self.records.len());
        Ok(())
    }

    /// Returns up to `k` chunks nearest to `query`, most relevant first.
    ///
    /// `k` larger than the store yields every chunk. An empty store yields an
    /// empty list regardless of the query's dimensionality.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredResult>, StoreError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(StoreError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, sim)| {
                let record = &self.records[i];
                ScoredResult {
                    text: record.text.clone(),
                    relevance_score: sim.clamp(0.0, 1.0),
                    metadata: record.metadata.clone(),
                }
            })
            .collect())
    }

    /// Persists the store as a file pair.
    ///
    /// Both files are written to `.tmp` siblings first and then renamed into
    /// place, records before index.
    pub fn save(&self, paths: &StorePaths) -> Result<(), StoreError> {
        for path in [&paths.index, &paths.records] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(io_err(parent))?;
                }
            }
        }

        let records_bytes = serde_json::to_vec(&self.records)?;
        let checksum: [u8; 32] = Sha256::digest(&records_bytes).into();

        let mut index_bytes =
            Vec::with_capacity(HEADER_LEN + self.vectors.len() * self.dims * 4);
        index_bytes.extend_from_slice(MAGIC);
        index_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        index_bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        index_bytes.extend_from_slice(&(self.vectors.len() as u64).to_le_bytes());
        index_bytes.extend_from_slice(&checksum);
        for v in &self.vectors {
            index_bytes.extend_from_slice(&vec_to_bytes(v));
        }

        let records_tmp = tmp_sibling(&paths.records);
        let index_tmp = tmp_sibling(&paths.index);
        write_synced(&records_tmp, &records_bytes)?;
        write_synced(&index_tmp, &index_bytes)?;

        fs::rename(&records_tmp, &paths.records).map_err(io_err(&paths.records))?;
        fs::rename(&index_tmp, &paths.index).map_err(io_err(&paths.index))?;

        tracing::info!(
            chunks = self.len(),
            dims = self.dims,
            checksum = %hex::encode(checksum),
            index = %paths.index.display(),
            "saved vector store"
        );
        Ok(())
    }

    /// Loads a persisted store.
    ///
    /// Returns `Ok(None)` when neither file exists. Exactly one file present
    /// is [`StoreError::IncompletePair`]; a pair whose header, length, count
    /// or checksum disagree is [`StoreError::Inconsistent`] or
    /// [`StoreError::Corrupt`].
    pub fn load(paths: &StorePaths) -> Result<Option<Self>, StoreError> {
        match (paths.index.exists(), paths.records.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(StoreError::IncompletePair {
                    present: paths.index.clone(),
                    missing: paths.records.clone(),
                })
            }
            (false, true) => {
                return Err(StoreError::IncompletePair {
                    present: paths.records.clone(),
                    missing: paths.index.clone(),
                })
            }
            (true, true) => {}
        }

        let index_bytes = fs::read(&paths.index).map_err(io_err(&paths.index))?;
        let records_bytes = fs::read(&paths.records).map_err(io_err(&paths.records))?;

        if index_bytes.len() < HEADER_LEN || &index_bytes[..8] != MAGIC {
            return Err(StoreError::Corrupt("missing or invalid header".to_string()));
        }
        let version = read_u32(&index_bytes[8..12]);
        if version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {}",
                version
            )));
        }
        let dims = read_u32(&index_bytes[12..16]) as usize;
        let count = read_u64(&index_bytes[16..24]) as usize;
        let stored_checksum = &index_bytes[24..56];

        let actual_checksum: [u8; 32] = Sha256::digest(&records_bytes).into();
        if stored_checksum != actual_checksum.as_slice() {
            return Err(StoreError::Inconsistent(format!(
                "records checksum {} does not match index header {}",
                hex::encode(actual_checksum),
                hex::encode(stored_checksum)
            )));
        }

        let body = &index_bytes[HEADER_LEN..];
        let expected_len = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| StoreError::Corrupt("header counts overflow".to_string()))?;
        if body.len() != expected_len {
            return Err(StoreError::Corrupt(format!(
                "expected {} bytes of vectors, found {}",
                expected_len,
                body.len()
            )));
        }

        let records: Vec<ChunkRecord> = serde_json::from_slice(&records_bytes)?;
        if records.len() != count {
            return Err(StoreError::Inconsistent(format!(
                "index holds {} vectors but records file holds {} chunks",
                count,
                records.len()
            )));
        }

        let vectors: Vec<Vec<f32>> = if dims == 0 {
            vec![Vec::new(); count]
        } else {
            body.chunks_exact(dims * 4).map(bytes_to_vec).collect()
        };

        tracing::info!(chunks = count, dims, "loaded vector store");
        Ok(Some(Self {
            dims,
            vectors,
            records,
        }))
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(path).map_err(io_err(path))?;
    file.write_all(bytes).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))?;
    Ok(())
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use tempfile::TempDir;

    fn chunk(text: &str, embedding: Vec<f32>) -> Chunk {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::from("test"));
        Chunk {
            text: text.to_string(),
            embedding,
            metadata,
        }
    }

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::new(3);
        store
            .append(vec![
                chunk("fever", vec![1.0, 0.0, 0.0]),
                chunk("cough", vec![0.0, 1.0, 0.0]),
                chunk("fever and cough", vec![0.7, 0.7, 0.0]),
            ])
            .unwrap();
        store
    }

    fn paths(tmp: &TempDir) -> StorePaths {
        StorePaths::new(tmp.path().join("s.index"), tmp.path().join("s.json"))
    }

    #[test]
    fn test_search_orders_by_relevance() {
        let store = sample_store();
        let results = store.search(&[1.0, 0.1, 0.0], 3).unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["fever", "fever and cough", "cough"]);
        assert!(results
            .windows(2)
            .all(|w| w[0].relevance_score >= w[1].relevance_score));
    }

    #[test]
    fn test_search_k_larger_than_store() {
        let store = sample_store();
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 3);
    }

    #[test]
    fn test_search_empty_store() {
        let store = VectorStore::new(3);
        assert!(store.search(&[1.0, 0.0, 0.0], 4).unwrap().is_empty());
    }

    #[test]
    fn test_relevance_is_clamped() {
        let store = sample_store();
        let results = store.search(&[-1.0, 0.0, 0.0], 3).unwrap();
        assert!(results
            .iter()
            .all(|r| (0.0..=1.0).contains(&r.relevance_score)));
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let store = sample_store();
        let err = store.search(&[1.0, 0.0], 2).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_append_is_all_or_nothing() {
        let mut store = sample_store();
        let err = store
            .append(vec![
                chunk("ok", vec![0.0, 0.0, 1.0]),
                chunk("bad", vec![1.0, 0.0]),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.len(), 3);

        let err = store
            .append(vec![chunk("nan", vec![f32::NAN, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidVector(_)));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        let store = sample_store();
        store.save(&paths).unwrap();

        assert!(paths.exists());
        assert!(!tmp_sibling(&paths.index).exists());

        let loaded = VectorStore::load(&paths).unwrap().unwrap();
        assert_eq!(loaded.stats(), StoreStats { num_chunks: 3, dims: 3 });
        assert_eq!(loaded.records()[1].text, "cough");
        assert_eq!(loaded.records()[0].metadata["source"], json!("test"));
        let top = loaded.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(top[0].text, "cough");
    }

    #[test]
    fn test_load_nothing_persisted() {
        let tmp = TempDir::new().unwrap();
        assert!(VectorStore::load(&paths(&tmp)).unwrap().is_none());
    }

    #[test]
    fn test_load_with_only_one_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        sample_store().save(&paths).unwrap();
        fs::remove_file(&paths.records).unwrap();

        let err = VectorStore::load(&paths).unwrap_err();
        assert!(matches!(err, StoreError::IncompletePair { .. }));
    }

    #[test]
    fn test_load_detects_swapped_records() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        sample_store().save(&paths).unwrap();

        // Records rewritten without a matching index.
        fs::write(&paths.records, r#"[{"text":"other","metadata":{}}]"#).unwrap();
        let err = VectorStore::load(&paths).unwrap_err();
        assert!(matches!(err, StoreError::Inconsistent(_)));
    }

    #[test]
    fn test_load_detects_truncated_index() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        sample_store().save(&paths).unwrap();

        let bytes = fs::read(&paths.index).unwrap();
        fs::write(&paths.index, &bytes[..bytes.len() - 4]).unwrap();
        let err = VectorStore::load(&paths).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        fs::write(&paths.index, b"not an index").unwrap();
        fs::write(&paths.records, b"[]").unwrap();
        let err = VectorStore::load(&paths).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_empty_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let paths = paths(&tmp);
        VectorStore::new(8).save(&paths).unwrap();
        let loaded = VectorStore::load(&paths).unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dims(), 8);
    }
}
