//! Quality gate deciding whether article content may be summarized by
//! the model. Content that is too short or matches the placeholder
//! denylist is routed to a lower summarization tier, never to the LLM.

use regex::Regex;

use crate::core::errors::{CoreError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ContentQuality {
    Usable { words: usize },
    TooShort { words: usize },
    /// The denylist pattern that fired, for the logs.
    Placeholder { pattern: String },
}

impl ContentQuality {
    pub fn is_usable(&self) -> bool {
        matches!(self, ContentQuality::Usable { .. })
    }
}

#[derive(Debug)]
pub struct QualityGate {
    min_words: usize,
    denylist: Vec<Regex>,
}

impl QualityGate {
    /// Compile the configured denylist. A broken pattern is a
    /// configuration mistake and is rejected up front.
    pub fn new(min_words: usize, patterns: &[String]) -> Result<Self> {
        let mut denylist = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let compiled = Regex::new(pattern).map_err(|e| {
                CoreError::Validation(format!("invalid placeholder pattern '{}': {}", pattern, e))
            })?;
            denylist.push(compiled);
        }
        Ok(Self {
            min_words,
            denylist,
        })
    }

    pub fn assess(&self, content: &str) -> ContentQuality {
        let words = word_count(content);
        if words < self.min_words {
            return ContentQuality::TooShort { words };
        }
        for pattern in &self.denylist {
            if pattern.is_match(content) {
                return ContentQuality::Placeholder {
                    pattern: pattern.as_str().to_string(),
                };
            }
        }
        ContentQuality::Usable { words }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
