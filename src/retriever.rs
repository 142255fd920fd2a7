//! Context retrieval: question → ranked chunks → one formatted context string.
//!
//! Each result is rendered as a labeled block:
//!
//! ```text
//! [Source 1 - Relevance: 0.87]
//! Pneumonia is an infection that inflames the air sacs in one or both lungs.
//! ```
//!
//! Blocks are joined with a blank line and preceded by a divider line. When
//! nothing is found, or when embedding or search fails, the retriever returns
//! [`NO_CONTEXT_FOUND`] instead; callers treat it as ordinary context.

use anyhow::Result;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::models::ScoredResult;
use crate::store::VectorStore;

/// Context used when the store has nothing relevant to offer.
pub const NO_CONTEXT_FOUND: &str = "No relevant medical information found in the knowledge base.";

const DIVIDER_WIDTH: usize = 50;

pub struct ContextRetriever<'a> {
    store: &'a VectorStore,
    embedder: &'a dyn EmbeddingProvider,
    max_context_chars: usize,
}

impl<'a> ContextRetriever<'a> {
    pub fn new(
        store: &'a VectorStore,
        embedder: &'a dyn EmbeddingProvider,
        max_context_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            max_context_chars,
        }
    }

    /// Embeds `query` and returns up to `top_k` nearest chunks, most relevant
    /// first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredResult>> {
        if self.store.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(self.embedder, query).await?;
        Ok(self.store.search(&query_vec, top_k)?)
    }

    /// Returns the formatted context for `query`.
    ///
    /// Never fails: retrieval errors are logged and degrade to
    /// [`NO_CONTEXT_FOUND`].
    pub async fn retrieve(&self, query: &str, top_k: usize) -> String {
        let preview: String = query.chars().take(50).collect();
        tracing::debug!(query = %preview, top_k, "retrieving context");

        let results = match self.search(query, top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("context retrieval failed: {:#}", e);
                return NO_CONTEXT_FOUND.to_string();
            }
        };

        if results.is_empty() {
            tracing::info!("no relevant context found");
            return NO_CONTEXT_FOUND.to_string();
        }

        let context = format_context(&results, self.max_context_chars);
        tracing::debug!(results = results.len(), chars = context.len(), "retrieved context");
        context
    }
}

/// Renders one result as `[Source <rank> - Relevance: <score>]\n<text>`.
pub fn format_block(rank: usize, result: &ScoredResult) -> String {
    format!(
        "[Source {} - Relevance: {:.2}]\n{}",
        rank,
        result.relevance_score,
        result.text.trim()
    )
}

/// Renders ranked results into a context string of at most
/// `max_chars` characters.
///
/// Results must already be ordered most relevant first. Blocks are dropped
/// from the tail until the rendering fits; the top block is always kept
/// whole, even if it alone exceeds the limit. An empty slice renders as
/// [`NO_CONTEXT_FOUND`].
pub fn format_context(results: &[ScoredResult], max_chars: usize) -> String {
    if results.is_empty() {
        return NO_CONTEXT_FOUND.to_string();
    }

    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format_block(i + 1, r))
        .collect();

    let divider = "=".repeat(DIVIDER_WIDTH);
    let prefix_len = 2 + DIVIDER_WIDTH;

    let mut keep = blocks.len();
    let mut total = prefix_len + joined_len(&blocks);
    while keep > 1 && total > max_chars {
        keep -= 1;
        total = prefix_len + joined_len(&blocks[..keep]);
    }
    if keep < blocks.len() {
        tracing::debug!(
            dropped = blocks.len() - keep,
            max_chars,
            "dropped lowest-relevance sources to fit context"
        );
    }

    format!("\n\n{}{}", divider, blocks[..keep].join("\n\n"))
}

/// Character count of `blocks` joined by blank lines.
fn joined_len(blocks: &[String]) -> usize {
    let chars: usize = blocks.iter().map(|b| b.chars().count()).sum();
    chars + 2 * blocks.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;
    use async_trait::async_trait;
    use serde_json::Map;

    /// Maps text onto three axes by keyword presence.
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("fever") { 1.0 } else { 0.0 },
                        if t.contains("lung") { 1.0 } else { 0.0 },
                        if t.contains("skin") { 1.0 } else { 0.1 },
                    ]
                })
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("model unavailable")
        }
    }

    fn store_with(texts: &[(&str, [f32; 3])]) -> VectorStore {
        let mut store = VectorStore::new(3);
        store
            .append(
                texts
                    .iter()
                    .map(|(t, v)| Chunk {
                        text: t.to_string(),
                        embedding: v.to_vec(),
                        metadata: Map::new(),
                    })
                    .collect(),
            )
            .unwrap();
        store
    }

    fn result(text: &str, score: f32) -> ScoredResult {
        ScoredResult {
            text: text.to_string(),
            relevance_score: score,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_store_returns_sentinel() {
        let store = VectorStore::new(3);
        let retriever = ContextRetriever::new(&store, &AxisProvider, 10_000);
        assert_eq!(retriever.retrieve("fever", 4).await, NO_CONTEXT_FOUND);
    }

    #[tokio::test]
    async fn test_fewer_chunks_than_top_k() {
        let store = store_with(&[
            ("  Fever is a raised temperature.  ", [1.0, 0.0, 0.0]),
            ("The lungs exchange gases.", [0.0, 1.0, 0.0]),
        ]);
        let retriever = ContextRetriever::new(&store, &AxisProvider, 10_000);
        let context = retriever.retrieve("What causes fever?", 5).await;

        assert_eq!(context.matches("[Source ").count(), 2);
        assert!(context.contains("[Source 1 - Relevance: "));
        assert!(context.contains("[Source 2 - Relevance: "));
        assert!(context.contains("]\nFever is a raised temperature.\n\n[Source 2"));
    }

    #[tokio::test]
    async fn test_most_relevant_block_first() {
        let store = store_with(&[
            ("Skin rashes.", [0.0, 0.0, 1.0]),
            ("Lung infection.", [0.0, 1.0, 0.1]),
            ("Fever management.", [1.0, 0.0, 0.1]),
        ]);
        let retriever = ContextRetriever::new(&store, &AxisProvider, 10_000);
        let context = retriever.retrieve("lung pain", 1).await;
        assert!(context.ends_with("[Source 1 - Relevance: 1.00]\nLung infection."));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_sentinel() {
        let store = store_with(&[("Fever.", [1.0, 0.0, 0.0])]);
        let retriever = ContextRetriever::new(&store, &FailingProvider, 10_000);
        assert_eq!(retriever.retrieve("fever", 4).await, NO_CONTEXT_FOUND);
    }

    #[tokio::test]
    async fn test_remote_embedding_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let config = crate::config::EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(3),
            url: Some(server.url()),
            max_retries: 3,
            ..Default::default()
        };
        let provider = crate::embedding::HttpProvider::openai_with_key(&config, "k").unwrap();
        let store = store_with(&[("Fever.", [1.0, 0.0, 0.0])]);
        let retriever = ContextRetriever::new(&store, &provider, 10_000);

        let start = std::time::Instant::now();
        assert_eq!(retriever.retrieve("fever", 4).await, NO_CONTEXT_FOUND);
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        mock.assert_async().await;
    }

    #[test]
    fn test_format_context_layout() {
        let results = vec![result("first ", 0.876), result("\nsecond", 0.5)];
        let context = format_context(&results, 10_000);
        let expected = format!(
            "\n\n{}[Source 1 - Relevance: 0.88]\nfirst\n\n[Source 2 - Relevance: 0.50]\nsecond",
            "=".repeat(50)
        );
        assert_eq!(context, expected);
    }

    #[test]
    fn test_format_context_drops_lowest_relevance_first() {
        let long = "x".repeat(200);
        let results = vec![result(&long, 0.9), result(&long, 0.8), result(&long, 0.7)];
        let context = format_context(&results, 600);
        assert_eq!(context.matches("[Source ").count(), 2);
        assert!(context.chars().count() <= 600);
        assert!(!context.contains("[Source 3"));
    }

    #[test]
    fn test_format_context_keeps_top_block_when_over_limit() {
        let results = vec![result(&"y".repeat(500), 0.9), result("short", 0.2)];
        let context = format_context(&results, 10);
        assert_eq!(context.matches("[Source ").count(), 1);
        assert!(context.contains(&"y".repeat(500)));
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[], 100), NO_CONTEXT_FOUND);
    }
}
