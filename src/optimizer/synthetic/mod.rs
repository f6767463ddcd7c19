// Synthetic question/answer test set generated from the corpus


use anyhow::{Result, anyhow, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::RequestError;
use crate::llm::{ChatMessage, ChatModel, CompletionOptions};
use crate::sources::Document;
use crate::vector_store::truncate_chars;

const GENERATOR_SYSTEM_MESSAGE: &str =
    "You write reading-comprehension questions. Reply with a single JSON object and nothing else.";
const DOCUMENT_EXCERPT_CHARS: usize = 3000;
const GENERATION_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.3,
    max_tokens: 300,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
    /// Document the question was written from
    pub document_id: String,
}

#[derive(Deserialize)]
struct GeneratedPair {
    question: String,
    answer: String,
}

/// Ask the LLM for `count` grounded question/answer pairs.
///
/// Documents are visited in a seeded shuffled order, cycling when there are
/// fewer documents than questions. Gives up after `2 * count` attempts.
/// Unparseable replies are skipped; a failed HTTP exchange with the LLM
/// stops generation, since its retries are already spent.
#[inline]
pub fn generate_qa_pairs(
    chat: &dyn ChatModel,
    documents: &[Document],
    count: usize,
    seed: u64,
) -> Result<Vec<QaPair>> {
    if documents.is_empty() {
        bail!("Cannot generate test questions without documents");
    }

    let order = visit_order(documents.len(), seed);
    let max_attempts = count.saturating_mul(2);
    let mut pairs = Vec::with_capacity(count);
    let mut last_error = None;

    for (attempt, &doc_index) in order.iter().cycle().take(max_attempts).enumerate() {
        if pairs.len() >= count {
            break;
        }
        let Some(document) = documents.get(doc_index) else {
            continue;
        };

        let messages = [
            ChatMessage::system(GENERATOR_SYSTEM_MESSAGE),
            ChatMessage::user(generation_prompt(&document.text)),
        ];
        let reply = match chat.complete(&messages, &GENERATION_OPTIONS) {
            Ok(completion) => completion.content,
            Err(e) if e.downcast_ref::<RequestError>().is_some() => {
                return Err(e.context(format!(
                    "Question generation stopped at document '{}'",
                    document.id
                )));
            }
            Err(e) => {
                warn!(
                    "Question generation failed for document '{}': {:#}",
                    document.id, e
                );
                last_error = Some(e);
                continue;
            }
        };

        match parse_qa_reply(&reply) {
            Some((question, answer)) => {
                debug!("Attempt {}: generated question from '{}'", attempt + 1, document.id);
                pairs.push(QaPair {
                    question,
                    answer,
                    document_id: document.id.clone(),
                });
            }
            None => warn!(
                "Skipping unparseable reply for document '{}'",
                document.id
            ),
        }
    }

    if pairs.is_empty() {
        let message = format!("Failed to generate any test questions after {max_attempts} attempts");
        return match last_error {
            Some(e) => Err(e.context(message)),
            None => Err(anyhow!(message)),
        };
    }
    if pairs.len() < count {
        warn!("Generated {} of {} requested test questions", pairs.len(), count);
    } else {
        info!("Generated {} test questions", pairs.len());
    }
    Ok(pairs)
}

fn visit_order(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    order
}

fn generation_prompt(text: &str) -> String {
    format!(
        "Read the document below and write one question that can be answered from it alone, \
         together with a short factual answer taken from the document.\n\n\
         Document:\n{}\n\n\
         Respond with JSON in exactly this form: {{\"question\": \"...\", \"answer\": \"...\"}}",
        truncate_chars(text, DOCUMENT_EXCERPT_CHARS)
    )
}

/// Question and answer from the first JSON object in `reply`, if both are non-blank
#[inline]
pub fn parse_qa_reply(reply: &str) -> Option<(String, String)> {
    let json = first_json_object(reply)?;
    let pair: GeneratedPair = serde_json::from_str(json).ok()?;
    let question = pair.question.trim();
    let answer = pair.answer.trim();
    if question.is_empty() || answer.is_empty() {
        return None;
    }
    Some((question.to_string(), answer.to_string()))
}

/// First balanced `{...}` span, ignoring braces inside string literals
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.get(start..)?.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return text.get(start..=start + offset);
                }
            }
            _ => {}
        }
    }
    None
}
