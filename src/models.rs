//! Core data models used throughout the service.
//!
//! These types represent the chunks stored in the vector store and the
//! per-query results that flow through the retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of source text with its embedding, as produced by ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// The persisted half of a [`Chunk`]: text and metadata without the vector.
///
/// Records live at the same position as their vector in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A chunk matched by a nearest-neighbor query.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub text: String,
    /// Cosine similarity clamped to `[0.0, 1.0]`.
    pub relevance_score: f32,
    pub metadata: Map<String, Value>,
}

/// Summary of a loaded vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub num_chunks: usize,
    pub dims: usize,
}
