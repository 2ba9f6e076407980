use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::Serialize;

use crate::ai::SummaryRequest;
use crate::error::Result;
use crate::feed::{resolve_url, take_chars, truncate_chars, SyncContext};
use crate::models::ItemType;

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const BODY_TEXT_MAX_CHARS: usize = 4000;
const HTML_WRAP_WIDTH: usize = 10_000;
const PROMPT_VERSION: &str = "app_v1";
const INSTRUCTION: &str = "Write one friendly sentence (at most 28 words) describing what this app or \
product does and who it helps. No hype, no emojis, plain English.";

/// Open Graph and visible text pulled from an app's landing page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub body_text: String,
}

impl PageMetadata {
    pub fn summary_source(&self) -> String {
        [
            self.title.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default(),
            self.body_text.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Enrichment {
    pub summary: Option<String>,
    pub image: Option<String>,
}

struct Patterns {
    meta_tag: Regex,
    attribute: Regex,
    title: Regex,
    body: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                meta_tag: Regex::new(r"(?is)<meta\b[^>]*>").ok()?,
                attribute: Regex::new(r#"(?is)([a-z:_-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()?,
                title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?,
                body: Regex::new(r"(?is)<body[^>]*>(.*)</body>").ok()?,
            })
        })
        .as_ref()
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| decode_entities(v.trim()))
        .filter(|v| !v.is_empty())
}

/// Parse OG/meta tags, the `<title>` and the visible body text (capped at 4000 chars).
pub fn parse_page_metadata(html: &str) -> PageMetadata {
    let Some(p) = patterns() else {
        return PageMetadata::default();
    };

    let mut meta: HashMap<String, String> = HashMap::new();
    for tag in p.meta_tag.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for cap in p.attribute.captures_iter(tag.as_str()) {
            let name = cap[1].to_ascii_lowercase();
            let value = cap.get(2).or_else(|| cap.get(3)).map(|m| m.as_str().to_string());
            match name.as_str() {
                "property" | "name" => key = value.map(|v| v.to_ascii_lowercase()),
                "content" => content = value,
                _ => {}
            }
        }
        if let (Some(key), Some(content)) = (key, content) {
            meta.entry(key).or_insert(content);
        }
    }

    let page_title = p
        .title
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let body_html = p
        .body
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html);
    let body_text = html2text::from_read(body_html.as_bytes(), HTML_WRAP_WIDTH)
        .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    PageMetadata {
        title: non_empty(meta.get("og:title")).or_else(|| non_empty(page_title.as_ref())),
        description: non_empty(meta.get("og:description"))
            .or_else(|| non_empty(meta.get("description"))),
        image: non_empty(meta.get("og:image")),
        body_text: take_chars(&body_text, BODY_TEXT_MAX_CHARS),
    }
}

#[derive(Clone)]
pub struct AppMetadataFetcher {
    client: Client,
}

impl AppMetadataFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Best-effort page fetch: non-2xx or network failure yields `None`.
    pub async fn fetch_page(&self, url: &str) -> Option<String> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));

        let response = match self.client.get(url).headers(headers).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch app page {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Failed to fetch app page {}: {}", url, response.status());
            return None;
        }

        match response.text().await {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::warn!("Failed to read app page {}: {}", url, e);
                None
            }
        }
    }

    /// Fill an `app` item's blurb and image from its landing page.
    ///
    /// Each effect only runs when its field is empty unless `force` is set. Returns `None`
    /// when the item is not an app or the page could not be fetched.
    pub async fn enrich_app_item(
        &self,
        ctx: &SyncContext,
        item_id: i64,
        force: bool,
    ) -> Result<Option<Enrichment>> {
        let Some(item) = ctx.repository.get_item(item_id).await? else {
            return Ok(None);
        };
        if item.item_type != ItemType::App || item.source_url.trim().is_empty() {
            return Ok(None);
        }

        let Some(html) = self.fetch_page(&item.source_url).await else {
            return Ok(None);
        };
        let page = parse_page_metadata(&html);
        let has_blurb = item.blurb.as_deref().is_some_and(|b| !b.trim().is_empty());
        let has_image = item.image_url.as_deref().is_some_and(|i| !i.trim().is_empty());

        let mut summary = None;
        let source = page.summary_source();
        if !source.is_empty() && (force || !has_blurb) {
            let outcome = ctx
                .cache
                .summarize_and_update_item(SummaryRequest {
                    item_id,
                    text: &source,
                    model: &ctx.model,
                    prompt_version: PROMPT_VERSION,
                    instruction: Some(INSTRUCTION),
                })
                .await;
            summary = outcome.summary;

            if summary.is_none() {
                if let Some(description) = &page.description {
                    let fallback = truncate_chars(description, 200, 197);
                    ctx.repository.set_item_blurb(item_id, fallback.clone()).await?;
                    summary = Some(fallback);
                }
            }
        }

        let mut image = item.image_url;
        if let Some(resolved) = page.image.as_deref().map(|i| resolve_url(i, &item.source_url)) {
            if force || !has_image {
                ctx.repository.set_item_image(item_id, resolved.clone()).await?;
                image = Some(resolved);
            }
        }

        Ok(Some(Enrichment { summary, image }))
    }
}
