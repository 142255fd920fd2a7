//! Offline build path for the vector store.
//!
//! Coordinates the ingestion flow: PDF → text → chunks → embeddings → store →
//! paired files on disk. This runs at startup when no persisted store exists,
//! or explicitly via `medrag ingest`; it never runs while the server is
//! answering queries.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{embed_batched, EmbeddingProvider};
use crate::extract::extract_pdf_file;
use crate::models::Chunk;
use crate::store::{StorePaths, VectorStore};

/// Summary of a completed build.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub chunks: usize,
    pub dims: usize,
    pub elapsed: Duration,
    pub paths: StorePaths,
}

/// Chunks and embeds `text` into a fresh store.
///
/// `source` is recorded in every chunk's metadata.
pub async fn build_store_from_text(
    text: &str,
    source: &str,
    config: &Config,
    provider: &dyn EmbeddingProvider,
) -> Result<VectorStore> {
    let pieces = chunk_text(
        text,
        config.chunking.max_chars,
        config.chunking.overlap_chars,
    );
    if pieces.is_empty() {
        bail!("Source document {} produced no text chunks", source);
    }
    tracing::info!(chunks = pieces.len(), source, "chunked source document");

    let vectors = embed_batched(provider, &pieces, config.embedding.batch_size)
        .await
        .context("Failed to embed document chunks")?;

    // A store is only reopened when its width matches `provider.dims()`.
    let dims = provider.dims();
    if let Some(actual) = vectors.iter().map(Vec::len).find(|len| *len != dims) {
        bail!(
            "Embedding model '{}' returned {}-d vectors but is configured for {}-d; \
             fix `[embedding] dims` before ingesting",
            provider.model_name(),
            actual,
            dims
        );
    }

    let ingested_at = Utc::now().to_rfc3339();
    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (text, embedding))| {
            let mut metadata = Map::new();
            metadata.insert("source".to_string(), Value::from(source));
            metadata.insert("chunk_index".to_string(), Value::from(index));
            metadata.insert("hash".to_string(), Value::from(sha256_hex(&text)));
            metadata.insert("ingested_at".to_string(), Value::from(ingested_at.clone()));
            Chunk {
                text,
                embedding,
                metadata,
            }
        })
        .collect();

    let mut store = VectorStore::new(dims);
    store.append(chunks)?;
    Ok(store)
}

/// Extracts the configured PDF and builds a store from it.
///
/// A missing, unreadable or text-less document is an error.
pub async fn build_store(config: &Config, provider: &dyn EmbeddingProvider) -> Result<VectorStore> {
    let path = &config.document.path;
    tracing::info!(document = %path.display(), "processing source document");
    let text = extract_pdf_file(path)
        .with_context(|| format!("Failed to process PDF at {}", path.display()))?;

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    build_store_from_text(&text, &source, config, provider).await
}

/// Rebuilds the persisted store from the source document.
///
/// Refuses to overwrite an existing store unless `force` is set.
pub async fn run_ingest(
    config: &Config,
    provider: &dyn EmbeddingProvider,
    force: bool,
) -> Result<IngestReport> {
    let paths = StorePaths::from_config(&config.store);
    if !force && (paths.index.exists() || paths.records.exists()) {
        bail!(
            "Vector store already exists at {} (use --force to rebuild)",
            paths.index.display()
        );
    }

    let start = Instant::now();
    let store = build_store(config, provider).await?;
    store.save(&paths)?;

    Ok(IngestReport {
        chunks: store.len(),
        dims: store.dims(),
        elapsed: start.elapsed(),
        paths,
    })
}

/// Loads the persisted store, or builds and saves it when none exists.
///
/// An incomplete or inconsistent pair is an error rather than a trigger to
/// rebuild, as is a store whose vectors do not match the provider.
pub async fn open_or_build(config: &Config, provider: &dyn EmbeddingProvider) -> Result<VectorStore> {
    let paths = StorePaths::from_config(&config.store);

    if let Some(store) = VectorStore::load(&paths)? {
        if !store.is_empty() && store.dims() != provider.dims() {
            bail!(
                "Vector store holds {}-d vectors but embedding model '{}' produces {}-d; \
                 run `medrag ingest --force` to rebuild",
                store.dims(),
                provider.model_name(),
                provider.dims()
            );
        }
        return Ok(store);
    }

    tracing::info!("vector store not found, processing PDF");
    let store = build_store(config, provider).await?;
    store.save(&paths)?;
    tracing::info!(chunks = store.len(), "created new vector store");
    Ok(store)
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct LengthProvider;

    #[async_trait]
    impl EmbeddingProvider for LengthProvider {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.dir = tmp.path().join("data");
        config.document.path = tmp.path().join("missing.pdf");
        config.chunking.max_chars = 40;
        config.chunking.overlap_chars = 0;
        config
    }

    #[tokio::test]
    async fn test_build_from_text_records_metadata() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let text = "Fever is a raised body temperature.\n\nPneumonia affects the lungs.";
        let store = build_store_from_text(text, "book.pdf", &config, &LengthProvider)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.dims(), 2);
        let first = &store.records()[0];
        assert_eq!(first.metadata["source"], "book.pdf");
        assert_eq!(first.metadata["chunk_index"], 0);
        assert_eq!(first.metadata["hash"], sha256_hex(&first.text).as_str());
        assert!(first.metadata.contains_key("ingested_at"));
    }

    #[tokio::test]
    async fn test_build_from_blank_text_fails() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        assert!(build_store_from_text("  \n\n ", "x", &config, &LengthProvider)
            .await
            .is_err());
    }

    struct MisconfiguredProvider;

    #[async_trait]
    impl EmbeddingProvider for MisconfiguredProvider {
        fn model_name(&self) -> &str {
            "misconfigured"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_before_save() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let err = build_store_from_text("Fever.", "b", &config, &MisconfiguredProvider)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("returned 2-d vectors"));
        assert!(err.to_string().contains("configured for 3-d"));
    }

    #[tokio::test]
    async fn test_open_or_build_missing_pdf_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let err = open_or_build(&config, &LengthProvider).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to process PDF"));
    }

    #[tokio::test]
    async fn test_open_or_build_prefers_persisted_store() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let store = build_store_from_text("Cancer screening.", "b", &config, &LengthProvider)
            .await
            .unwrap();
        store.save(&StorePaths::from_config(&config.store)).unwrap();

        // The PDF does not exist, so this only succeeds by loading.
        let loaded = open_or_build(&config, &LengthProvider).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records()[0].text, "Cancer screening.");
    }

    #[tokio::test]
    async fn test_ingest_refuses_to_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        VectorStore::new(2)
            .save(&StorePaths::from_config(&config.store))
            .unwrap();
        let err = run_ingest(&config, &LengthProvider, false).await.unwrap_err();
        assert!(err.to_string().contains("--force"));
    }
}
