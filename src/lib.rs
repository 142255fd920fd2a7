//! # Medical RAG
//!
//! Retrieval-augmented question answering over a fixed medical reference
//! document.
//!
//! A PDF is extracted, chunked, and embedded once into a persisted vector
//! store. Each incoming question is gated by a keyword filter, answered from
//! the most relevant chunks via a remote chat-completion model, and cleaned
//! up before it is returned over HTTP or the CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │   PDF    │──▶│ Chunk+Embed │──▶│ Vector Store │
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │
//!   question ──▶ Validator ──▶ Retriever ◀┘
//!                                  │
//!                                  ▼
//!                    Prompt ──▶ Generator ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! medrag ingest                 # build ./data/medical_vector_store.*
//! medrag ask "What are the symptoms of pneumonia?"
//! medrag serve                  # POST /query on 0.0.0.0:5000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | In-memory vector store and its on-disk format |
//! | [`ingest`] | Building the store from the source document |
//! | [`validator`] | Keyword admission filter |
//! | [`retriever`] | Context retrieval and formatting |
//! | [`prompt`] | Prompt template |
//! | [`completion`] | Chat completion client |
//! | [`generator`] | Answer generation and cleanup |
//! | [`service`] | Pipeline wiring |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod service;
pub mod store;
pub mod validator;
