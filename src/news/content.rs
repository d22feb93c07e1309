//! Article fetching and main-content extraction.
//!
//! Extraction is heuristic: boilerplate containers are cut out, the
//! rest is de-tagged, and only reasonably long, unique lines survive.
//! The result is capped at a configured character budget so a runaway
//! page cannot blow up prompts or the cache.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::core::errors::{CoreError, Result};

/// Lines at or under this length are treated as navigation debris.
const MIN_LINE_CHARS: usize = 20;

fn boilerplate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?is)<script\b.*?</script>|<style\b.*?</style>|<noscript\b.*?</noscript>",
            r"|<svg\b.*?</svg>|<nav\b.*?</nav>|<header\b.*?</header>",
            r"|<footer\b.*?</footer>|<aside\b.*?</aside>|<form\b.*?</form>",
        ))
        .unwrap()
    })
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|blockquote|tr|section|article)>").unwrap()
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// Strip an HTML page down to its readable text, capped at `max_chars`.
pub fn extract_readable(html: &str, max_chars: usize) -> String {
    let without_boilerplate = boilerplate_re().replace_all(html, " ");
    let with_breaks = block_break_re().replace_all(&without_boilerplate, "\n");
    let de_tagged = tag_re().replace_all(&with_breaks, " ");
    let decoded = decode_entities(&de_tagged);

    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in decoded.lines() {
        let line = collapse_spaces(line);
        if line.chars().count() <= MIN_LINE_CHARS {
            continue;
        }
        if !seen.insert(line.clone()) {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
        if out.chars().count() >= max_chars {
            break;
        }
    }

    truncate_chars(&out, max_chars)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

fn collapse_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Fetches article pages and reduces them to readable text.
#[derive(Clone)]
pub struct ContentFetcher {
    http: reqwest::Client,
    max_chars: usize,
}

impl ContentFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("knowhub-news/0.3")
            .build()
            .map_err(CoreError::internal)?;
        Ok(Self { http, max_chars })
    }

    /// Fetch the canonical url and extract its readable text. Any
    /// network or status failure is a `ContentAcquisition` error; the
    /// summarization chain treats that as "advance to the next tier".
    pub async fn fetch_article(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::ContentAcquisition(format!("article fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CoreError::ContentAcquisition(format!(
                "article fetch {}: status {}",
                url,
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CoreError::ContentAcquisition(format!("article body {}: {}", url, e)))?;

        let text = extract_readable(&html, self.max_chars);
        if text.is_empty() {
            return Err(CoreError::ContentAcquisition(format!(
                "article {}: no readable text extracted",
                url
            )));
        }
        Ok(text)
    }
}
