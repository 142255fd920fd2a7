//! The question-answering service context.
//!
//! [`RagService`] wires the pipeline stages together: validate → retrieve →
//! compose → generate. It is built once at startup and shared read-only by
//! every request, so the store is never mutated while queries are served.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::completion::{ChatCompletionClient, CompletionClient};
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::generator::generate;
use crate::ingest::open_or_build;
use crate::models::StoreStats;
use crate::prompt::PromptTemplate;
use crate::retriever::ContextRetriever;
use crate::store::VectorStore;
use crate::validator::QueryValidator;

/// Reasons a question is not answered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("No question provided")]
    MissingQuestion,
    #[error("Inappropriate query")]
    Inappropriate,
    /// The detail is logged; callers only ever see the generic message.
    #[error("Internal server error")]
    Internal(String),
}

/// A successful answer, echoed with the question it answers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

pub struct RagService {
    store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionClient>,
    validator: QueryValidator,
    template: PromptTemplate,
    retrieval: RetrievalConfig,
}

impl RagService {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionClient>,
        validator: QueryValidator,
        template: PromptTemplate,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            completion,
            validator,
            template,
            retrieval,
        }
    }

    /// Builds the production service from configuration.
    ///
    /// Checks credentials before touching the store, so a missing API key
    /// fails fast instead of after a long ingestion. Loads the persisted
    /// store or builds it from the source PDF.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let completion = ChatCompletionClient::new(&config.completion)?;
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);

        let template = match &config.prompt.template_path {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::medical(),
        };

        let store = open_or_build(config, embedder.as_ref()).await?;

        Ok(Self::new(
            Arc::new(store),
            embedder,
            Arc::new(completion),
            QueryValidator::medical(),
            template,
            config.retrieval.clone(),
        ))
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn retriever(&self) -> ContextRetriever<'_> {
        ContextRetriever::new(
            &self.store,
            self.embedder.as_ref(),
            self.retrieval.max_context_chars,
        )
    }

    /// Runs the full pipeline for one question.
    ///
    /// Only validation failures are errors here. Retrieval and generation
    /// failures degrade to their fallback texts inside the pipeline.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::MissingQuestion);
        }
        if !self.validator.validate(question) {
            tracing::info!("rejected out-of-domain question");
            return Err(QueryError::Inappropriate);
        }

        let context = self
            .retriever()
            .retrieve(question, self.retrieval.top_k)
            .await;
        let prompt = self.template.compose(&context, question);
        let answer = generate(&prompt, self.completion.as_ref()).await;

        Ok(Answer {
            question: question.to_string(),
            answer,
        })
    }
}
