//! Prompt composition.
//!
//! A [`PromptTemplate`] is an immutable value with exactly one `{context}`
//! and one `{question}` placeholder. It is parsed once, at construction, into
//! literal segments; [`PromptTemplate::compose`] then concatenates segments
//! and arguments in a single pass. Placeholder-looking text inside the
//! context or question is therefore never re-substituted, and both arguments
//! always appear verbatim in the output.

use std::path::Path;

use anyhow::{bail, Context, Result};

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// Built-in instruction template for the medical assistant.
pub const MEDICAL_PROMPT_TEMPLATE: &str = "You are an expert medical assistant with access to comprehensive medical knowledge.

Based on the provided medical context, answer the user's question clearly and accurately.

GUIDELINES:
1) Provide clear, well-structured responses.
2) Use bullet points or numbered lists for complex information.
3) Explain medical terms in simple language.
4) Be specific and factual based on the context.
5) If the context doesn't contain relevant information, clearly state this.
6) Don't use + for bullet points and use • .

MEDICAL CONTEXT:
{context}

USER QUESTION: {question}

RESPONSE:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Context,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Literal text before the first slot, between the slots, and after the second.
    segments: [String; 3],
    order: [Slot; 2],
}

impl PromptTemplate {
    /// Parses a template containing `{context}` and `{question}` exactly once each.
    pub fn new(template: &str) -> Result<Self> {
        let context_pos = single_occurrence(template, CONTEXT_SLOT)?;
        let question_pos = single_occurrence(template, QUESTION_SLOT)?;

        let (first, first_len, second, second_len, order) = if context_pos < question_pos {
            (
                context_pos,
                CONTEXT_SLOT.len(),
                question_pos,
                QUESTION_SLOT.len(),
                [Slot::Context, Slot::Question],
            )
        } else {
            (
                question_pos,
                QUESTION_SLOT.len(),
                context_pos,
                CONTEXT_SLOT.len(),
                [Slot::Question, Slot::Context],
            )
        };

        Ok(Self {
            segments: [
                template[..first].to_string(),
                template[first + first_len..second].to_string(),
                template[second + second_len..].to_string(),
            ],
            order,
        })
    }

    /// The built-in medical assistant template.
    pub fn medical() -> Self {
        Self {
            segments: split_builtin(),
            order: [Slot::Context, Slot::Question],
        }
    }

    /// Loads a template from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt template: {}", path.display()))?;
        Self::new(&text).with_context(|| format!("Invalid prompt template: {}", path.display()))
    }

    /// Fills the template. The output contains `context` and `question`
    /// verbatim; nothing is truncated.
    pub fn compose(&self, context: &str, question: &str) -> String {
        let value = |slot: Slot| match slot {
            Slot::Context => context,
            Slot::Question => question,
        };
        let mut out = String::with_capacity(
            self.segments.iter().map(String::len).sum::<usize>() + context.len() + question.len(),
        );
        out.push_str(&self.segments[0]);
        out.push_str(value(self.order[0]));
        out.push_str(&self.segments[1]);
        out.push_str(value(self.order[1]));
        out.push_str(&self.segments[2]);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::medical()
    }
}

fn single_occurrence(template: &str, slot: &str) -> Result<usize> {
    let mut matches = template.match_indices(slot);
    let Some((pos, _)) = matches.next() else {
        bail!("template is missing the {} placeholder", slot);
    };
    if matches.next().is_some() {
        bail!("template contains the {} placeholder more than once", slot);
    }
    Ok(pos)
}

fn split_builtin() -> [String; 3] {
    let (before, rest) = MEDICAL_PROMPT_TEMPLATE
        .split_once(CONTEXT_SLOT)
        .unwrap_or((MEDICAL_PROMPT_TEMPLATE, ""));
    let (between, after) = rest.split_once(QUESTION_SLOT).unwrap_or((rest, ""));
    [before.to_string(), between.to_string(), after.to_string()]
}
