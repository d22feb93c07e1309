//! The three summarization tiers and their provenance tags.
//!
//! Tier A asks the model for a narrative summary of usable content.
//! Tier B selects salient sentences without any model involvement.
//! Tier C falls back to a blurb built from feed metadata alone.

use std::fmt;
use std::str::FromStr;

use crate::core::errors::CoreError;
use crate::llm::types::CompletionRequest;

use super::store::Article;

const SUMMARY_SYSTEM: &str = "You summarize technology news for busy engineers. Write a \
factual summary of the article in at most four sentences. No headlines, no bullet \
points, no commentary.";

/// Sentences shorter than this rarely carry content worth keeping.
const MIN_SENTENCE_CHARS: usize = 30;

const METADATA_BLURB_MAX_CHARS: usize = 300;

/// Which tier produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Llm,
    Heuristic,
    Metadata,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Llm => "llm",
            Provenance::Heuristic => "heuristic",
            Provenance::Metadata => "metadata",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "llm" => Ok(Provenance::Llm),
            "heuristic" => Ok(Provenance::Heuristic),
            "metadata" => Ok(Provenance::Metadata),
            other => Err(CoreError::Internal(format!(
                "unknown summary provenance '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub body: String,
    pub provenance: Provenance,
    pub generated_at: String,
}

impl Summary {
    pub fn now(body: String, provenance: Provenance) -> Self {
        Self {
            body,
            provenance,
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Build the tier-A completion request for one article.
pub fn llm_summary_request(
    article: &Article,
    content: &str,
    max_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    let prompt = format!(
        "Title: {}\nSource: {}\n\nArticle:\n{}\n\nSummary:",
        article.title, article.source, content
    );
    CompletionRequest::new(prompt)
        .with_system(SUMMARY_SYSTEM)
        .with_max_tokens(max_tokens)
        .with_temperature(temperature)
}

/// Tier B: keep the leading salient sentences of the extracted text.
/// Returns `None` when nothing sentence-like survives.
pub fn heuristic_brief(content: &str, max_sentences: usize) -> Option<String> {
    let sentences: Vec<&str> = split_sentences(content)
        .into_iter()
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .take(max_sentences)
        .collect();

    if sentences.is_empty() {
        return None;
    }

    let mut brief = sentences.join(" ");
    if !brief.ends_with(['.', '!', '?']) {
        brief.push('.');
    }
    Some(brief)
}

/// Tier C: a blurb from what the feed alone told us.
pub fn metadata_blurb(article: &Article) -> String {
    let mut blurb = format!("{} ({})", article.title.trim(), article.source.trim());
    let description = article.description.trim();
    if !description.is_empty() {
        blurb.push_str(": ");
        blurb.push_str(description);
    }
    if blurb.chars().count() > METADATA_BLURB_MAX_CHARS {
        let mut cut: String = blurb.chars().take(METADATA_BLURB_MAX_CHARS).collect();
        cut.push_str("...");
        blurb = cut;
    }
    blurb
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        let at_break = matches!(b, b'.' | b'!' | b'?')
            && bytes
                .get(i + 1)
                .map(|next| next.is_ascii_whitespace())
                .unwrap_or(true);
        if at_break || *b == b'\n' {
            let end = if *b == b'\n' { i } else { i + 1 };
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
