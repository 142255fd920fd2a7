//! Answer generation and post-processing.
//!
//! [`generate`] sends the composed prompt to the completion endpoint once and
//! cleans the reply with [`format_medical_response`]. Any failure on the way
//! is logged and replaced by [`GENERATION_FAILED_MESSAGE`]; callers always get
//! text back.

use std::sync::LazyLock;

use regex::Regex;

use crate::completion::CompletionClient;

/// Returned in place of an answer when the completion endpoint fails.
pub const GENERATION_FAILED_MESSAGE: &str = "I apologize, but I encountered an error while processing your medical question. Please try rephrasing your question or consult a healthcare professional directly.";

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static pattern is valid"));

/// Calls the completion endpoint with `prompt` and returns a cleaned answer,
/// or the fixed apology text on failure.
pub async fn generate(prompt: &str, client: &dyn CompletionClient) -> String {
    tracing::debug!(model = client.model(), prompt_chars = prompt.len(), "generating response");

    match client.complete(prompt).await {
        Ok(raw) => {
            let answer = format_medical_response(&raw);
            tracing::info!(chars = answer.len(), "medical response generated");
            answer
        }
        Err(e) => {
            tracing::error!("error generating medical response: {:#}", e);
            GENERATION_FAILED_MESSAGE.to_string()
        }
    }
}

/// Strips markdown emphasis markers, collapses runs of three or more
/// newlines to two, and trims surrounding whitespace.
///
/// Idempotent: cleaning an already clean response returns it unchanged.
pub fn format_medical_response(response: &str) -> String {
    let unstarred = response.replace('*', "");
    EXCESS_NEWLINES
        .replace_all(&unstarred, "\n\n")
        .trim()
        .to_string()
}
