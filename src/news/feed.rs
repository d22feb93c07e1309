//! RSS/Atom feed retrieval and parsing.
//!
//! Both formats are read with the same event loop: RSS wraps entries in
//! `<item>` with `<link>text</link>`, Atom uses `<entry>` with a
//! `href` attribute on `<link/>`. Unknown elements are skipped.

use std::time::Duration;

use quick_xml::events::Event;
use tracing::warn;

use crate::core::errors::{CoreError, Result};

/// One entry as the feed describes it, before caching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    Published,
}

/// Parse an RSS 2.0 or Atom document into its entries. Entries without
/// a link are dropped; they cannot be cached or fetched.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut field: Option<Field> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"item" | b"entry" => {
                        current = Some(FeedItem::default());
                        field = None;
                    }
                    b"title" if current.is_some() => field = Some(Field::Title),
                    b"link" if current.is_some() => {
                        field = Some(Field::Link);
                        if let Some(href) = link_href(&e) {
                            if let Some(item) = current.as_mut() {
                                item.link = href;
                            }
                            field = None;
                        }
                    }
                    b"description" | b"summary" if current.is_some() => {
                        field = Some(Field::Description)
                    }
                    b"pubDate" | b"published" | b"updated" if current.is_some() => {
                        field = Some(Field::Published)
                    }
                    _ => field = None,
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let (Some(item), Some(href)) = (current.as_mut(), link_href(&e)) {
                        if item.link.is_empty() {
                            item.link = href;
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), field) {
                    let value = text.unescape().unwrap_or_default();
                    append_field(item, field, value.as_ref());
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), field) {
                    let value = String::from_utf8_lossy(data.as_ref()).into_owned();
                    append_field(item, field, &value);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"item" | b"entry" => {
                    if let Some(item) = current.take() {
                        if item.link.is_empty() {
                            warn!(title = %item.title, "feed entry without link dropped");
                        } else {
                            items.push(item);
                        }
                    }
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CoreError::ContentAcquisition(format!(
                    "malformed feed: {}",
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

fn link_href(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"href")
        .and_then(|a| String::from_utf8(a.value.into_owned()).ok())
}

fn append_field(item: &mut FeedItem, field: Field, value: &str) {
    let target = match field {
        Field::Title => &mut item.title,
        Field::Link => &mut item.link,
        Field::Description => &mut item.description,
        Field::Published => {
            if item.published.is_none() {
                item.published = Some(value.trim().to_string());
            }
            return;
        }
    };
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(value.trim());
}

/// Thin HTTP wrapper for fetching feed documents.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("knowhub-news/0.3")
            .build()
            .map_err(CoreError::internal)?;
        Ok(Self { http })
    }

    pub async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::ContentAcquisition(format!("feed fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CoreError::ContentAcquisition(format!(
                "feed fetch {}: status {}",
                url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CoreError::ContentAcquisition(format!("feed body {}: {}", url, e)))
    }
}
