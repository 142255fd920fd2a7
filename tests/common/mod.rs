#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use medical_rag::completion::CompletionClient;
use medical_rag::config::{Config, RetrievalConfig};
use medical_rag::embedding::EmbeddingProvider;
use medical_rag::ingest::build_store_from_text;
use medical_rag::prompt::PromptTemplate;
use medical_rag::service::RagService;
use medical_rag::store::VectorStore;
use medical_rag::validator::QueryValidator;

/// Topic axes for [`KeywordEmbedder`]. A text's vector has 1.0 on every axis
/// whose keyword it mentions, plus a small constant so no vector is zero.
const AXES: &[&str] = &["pneumonia", "fever", "heart", "diabetes", "skin"];

/// Deterministic embedder: one dimension per topic keyword.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }

    fn dims(&self) -> usize {
        AXES.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = AXES
                    .iter()
                    .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                    .collect();
                v.push(0.05);
                v
            })
            .collect())
    }
}

/// Completion fake that records prompts and replies with markdown-heavy text.
#[derive(Default)]
pub struct ScriptedCompletion {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("**Common symptoms**\n\n\n\n• *Cough* with phlegm\n• **Fever** and chills\n\n\n".to_string())
    }
}

/// Completion fake that panics, standing in for a bug deep in the pipeline.
pub struct PanickingCompletion;

#[async_trait]
impl CompletionClient for PanickingCompletion {
    fn model(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        panic!("completion backend exploded");
    }
}

pub const REFERENCE_TEXT: &str = "\
Pneumonia is an infection that inflames the air sacs in one or both lungs.

Symptoms of pneumonia include cough with phlegm, fever, chills and difficulty breathing.

Pneumonia in older adults may present with confusion and a lower than normal temperature.

Fever is a temporary rise in body temperature, often due to an illness.

Heart disease describes a range of conditions that affect the heart.

Diabetes is a disease that occurs when blood glucose is too high.

Eczema is a condition that makes the skin red and itchy.

Bacterial pneumonia can be treated with antibiotics; viral pneumonia usually resolves with rest.";

pub fn small_chunk_config() -> Config {
    let mut config = Config::default();
    config.chunking.max_chars = 120;
    config.chunking.overlap_chars = 0;
    config
}

pub async fn reference_store() -> VectorStore {
    build_store_from_text(
        REFERENCE_TEXT,
        "reference.txt",
        &small_chunk_config(),
        &KeywordEmbedder,
    )
    .await
    .unwrap()
}

pub fn service_with(store: VectorStore, completion: Arc<dyn CompletionClient>) -> RagService {
    RagService::new(
        Arc::new(store),
        Arc::new(KeywordEmbedder),
        completion,
        QueryValidator::medical(),
        PromptTemplate::medical(),
        RetrievalConfig::default(),
    )
}
