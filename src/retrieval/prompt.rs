//! Prompt assembly for grounded answering.
//!
//! Builds the context block from retrieved chunks (score order, one
//! chunk per source document), folds in recent chat turns, and derives
//! the citation list from what was actually retrieved — the model is
//! never asked where an answer came from.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::history::ChatTurn;
use crate::index::ScoredChunk;

const SYSTEM_INSTRUCTION: &str = "You are an internal knowledge assistant. Answer strictly \
from the provided context. If the context does not contain the answer, say that you do not \
have enough internal information instead of guessing. Keep answers concise and factual.";

/// Maximum snippet length shown alongside a citation.
const SNIPPET_MAX_CHARS: usize = 400;

/// Provenance of one answer, tied to a retrieved chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub snippet: String,
    pub score: f32,
}

/// The assembled prompt plus the citations backing it.
#[derive(Debug, Clone)]
pub struct PromptBundle {
    pub system: String,
    pub prompt: String,
    pub citations: Vec<Citation>,
}

pub struct PromptBuilder {
    max_context_chars: usize,
    max_history_turns: usize,
}

impl PromptBuilder {
    pub fn new(max_context_chars: usize, max_history_turns: usize) -> Self {
        Self {
            max_context_chars,
            max_history_turns,
        }
    }

    pub fn build(&self, question: &str, hits: &[ScoredChunk], history: &[ChatTurn]) -> PromptBundle {
        let selected = dedup_by_document(hits);

        let mut context = String::new();
        let mut citations = Vec::new();
        for (i, hit) in selected.iter().enumerate() {
            let addition = hit.chunk.text.len() + 64;
            if !context.is_empty() && context.len() + addition > self.max_context_chars {
                break;
            }
            context.push_str(&format!(
                "[{}] (Source: {})\n{}\n\n",
                i + 1,
                hit.chunk.document_name,
                hit.chunk.text
            ));
            citations.push(Citation {
                chunk_id: hit.chunk.chunk_id.clone(),
                document_id: hit.chunk.document_id.clone(),
                document_name: hit.chunk.document_name.clone(),
                snippet: snippet_of(&hit.chunk.text),
                score: hit.score,
            });
        }

        let mut prompt = String::new();
        prompt.push_str("Context:\n");
        prompt.push_str(context.trim_end());
        prompt.push_str("\n\n");

        let recent = trailing_turns(history, self.max_history_turns);
        if !recent.is_empty() {
            prompt.push_str("Conversation so far:\n");
            for turn in recent {
                prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.question, turn.answer));
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Question: {}\nAnswer:", question));

        PromptBundle {
            system: SYSTEM_INSTRUCTION.to_string(),
            prompt,
            citations,
        }
    }
}

/// Keep the best-scoring chunk per source document, preserving score order.
fn dedup_by_document(hits: &[ScoredChunk]) -> Vec<&ScoredChunk> {
    let mut seen = HashSet::new();
    hits.iter()
        .filter(|hit| seen.insert(hit.chunk.document_id.clone()))
        .collect()
}

fn trailing_turns(history: &[ChatTurn], max_turns: usize) -> &[ChatTurn] {
    let start = history.len().saturating_sub(max_turns);
    &history[start..]
}

/// Shorten chunk text for display, preferring a sentence boundary.
fn snippet_of(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= SNIPPET_MAX_CHARS {
        return trimmed.to_string();
    }

    let excerpt: String = trimmed.chars().take(SNIPPET_MAX_CHARS).collect();
    match excerpt.rfind('.') {
        Some(pos) if pos >= SNIPPET_MAX_CHARS * 7 / 10 => excerpt[..=pos].to_string(),
        _ => format!("{}...", excerpt),
    }
}

/// Order citations so the ones that best align with the generated
/// answer come first. Alignment is word overlap between the answer and
/// the cited text, with retrieval score as tie-breaker. Only retrieved
/// chunks ever appear here, so the model cannot invent a source.
pub fn order_by_answer_alignment(answer: &str, mut citations: Vec<Citation>) -> Vec<Citation> {
    let answer_words: HashSet<String> = answer
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect();

    let alignment = |citation: &Citation| -> f32 {
        let text = citation.snippet.to_lowercase();
        let overlap = answer_words.iter().filter(|w| text.contains(*w)).count();
        overlap as f32 * 10.0 + citation.score
    };

    citations.sort_by(|a, b| {
        alignment(b)
            .partial_cmp(&alignment(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    citations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkRecord;
    use crate::scope::AccessScope;

    fn hit(chunk_id: &str, document_id: &str, text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRecord {
                chunk_id: chunk_id.to_string(),
                document_id: document_id.to_string(),
                document_name: format!("{}.pdf", document_id),
                ordinal: 0,
                text: text.to_string(),
                start_offset: 0,
                scope: AccessScope::Company,
                ingested_at: "2025-01-01T00:00:00Z".to_string(),
            },
            score,
        }
    }

    fn turn(question: &str, answer: &str) -> ChatTurn {
        ChatTurn {
            id: 0,
            session_id: "s".to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            cited_chunk_ids: vec![],
            created_at: String::new(),
        }
    }

    #[test]
    fn one_citation_per_source_document() {
        let builder = PromptBuilder::new(4000, 6);
        let hits = vec![
            hit("a1", "doc-a", "first chunk", 0.9),
            hit("a2", "doc-a", "second chunk of same doc", 0.8),
            hit("b1", "doc-b", "other doc", 0.7),
        ];

        let bundle = builder.build("q", &hits, &[]);
        let docs: Vec<&str> = bundle.citations.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(docs, vec!["doc-a", "doc-b"]);
        assert_eq!(bundle.citations[0].chunk_id, "a1");
    }

    #[test]
    fn context_budget_limits_chunks_but_never_to_zero() {
        let builder = PromptBuilder::new(200, 6);
        let big = "x".repeat(500);
        let hits = vec![hit("a", "doc-a", &big, 0.9), hit("b", "doc-b", &big, 0.8)];

        let bundle = builder.build("q", &hits, &[]);
        assert_eq!(bundle.citations.len(), 1);
    }

    #[test]
    fn history_is_truncated_to_most_recent_turns() {
        let builder = PromptBuilder::new(4000, 2);
        let history = vec![turn("old question", "a"), turn("mid", "b"), turn("latest", "c")];

        let bundle = builder.build("q", &[hit("a", "d", "ctx", 0.9)], &history);
        assert!(!bundle.prompt.contains("old question"));
        assert!(bundle.prompt.contains("mid"));
        assert!(bundle.prompt.contains("latest"));
    }

    #[test]
    fn prompt_carries_grounding_instruction_and_question() {
        let builder = PromptBuilder::new(4000, 6);
        let bundle = builder.build("How many days?", &[hit("a", "d", "15 days", 0.9)], &[]);

        assert!(bundle.system.contains("strictly"));
        assert!(bundle.prompt.contains("Question: How many days?"));
        assert!(bundle.prompt.contains("(Source: d.pdf)"));
    }

    #[test]
    fn long_snippets_cut_at_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(320), "b".repeat(300));
        let snippet = snippet_of(&text);
        assert!(snippet.ends_with('.'));
        assert!(snippet.chars().count() <= SNIPPET_MAX_CHARS);
    }

    #[test]
    fn alignment_reorders_citations_toward_answer_terms() {
        let citations = vec![
            Citation {
                chunk_id: "a".into(),
                document_id: "doc-a".into(),
                document_name: "benefits.pdf".into(),
                snippet: "Office seating chart and desk assignments".into(),
                score: 0.95,
            },
            Citation {
                chunk_id: "b".into(),
                document_id: "doc-b".into(),
                document_name: "leave.pdf".into(),
                snippet: "Employees accrue vacation days monthly".into(),
                score: 0.90,
            },
        ];

        let ordered =
            order_by_answer_alignment("You accrue vacation days each month.", citations);
        assert_eq!(ordered[0].chunk_id, "b");
    }
}
