
use serde::{Deserialize, Serialize};

use crate::vector_store::RetrievalMatch;

pub const SYSTEM_MESSAGE: &str =
    "You are a helpful assistant that answers questions based on provided context.";

/// Prompt variants compared by the optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptTemplate {
    #[default]
    Default,
    Concise,
    Detailed,
}

impl PromptTemplate {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            PromptTemplate::Default => "default",
            PromptTemplate::Concise => "concise",
            PromptTemplate::Detailed => "detailed",
        }
    }

    /// Render the user message for `question` over an assembled `context`
    #[inline]
    pub fn render(&self, question: &str, context: &str) -> String {
        match *self {
            PromptTemplate::Default => format!(
                "You are a helpful assistant. Answer the question based on the context provided.\n\n\
                 Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Answer: Provide a clear, concise answer based only on the information in the context. \
                 If the context doesn't contain relevant information, say so."
            ),
            PromptTemplate::Concise => format!(
                "Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Reply with a short factual answer of at most two sentences, using only the context. \
                 If the answer is not in the context, reply \"I don't know\"."
            ),
            PromptTemplate::Detailed => format!(
                "Use the numbered documents below to answer the question thoroughly.\n\n\
                 Context:\n{context}\n\n\
                 Question: {question}\n\n\
                 Explain the answer step by step and mention which document numbers support each point. \
                 Do not use knowledge outside the documents; if they are insufficient, say what is missing."
            ),
        }
    }
}

impl std::fmt::Display for PromptTemplate {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PromptTemplate {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PromptTemplate::Default),
            "concise" => Ok(PromptTemplate::Concise),
            "detailed" => Ok(PromptTemplate::Detailed),
            other => Err(format!("Unknown prompt template: {other}")),
        }
    }
}

/// Number retrieved documents into one context block
#[inline]
pub fn build_context(matches: &[RetrievalMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| format!("Document {}:\n{}\n", i + 1, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}
