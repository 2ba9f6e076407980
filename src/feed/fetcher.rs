use feed_rs::model::Feed;
use feed_rs::parser;
use reqwest::Client;

use crate::error::{AppError, Result};

/// Fetches and parses RSS/Atom documents for the YouTube and Substack syncs.
#[derive(Clone)]
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// `label` names the provider in error messages, e.g. "YouTube RSS".
    pub async fn fetch_feed(&self, url: &str, label: &str) -> Result<Feed> {
        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::Fetch(format!("Unable to fetch {} feed: {}", label, e))
        })?;

        if !response.status().is_success() {
            return Err(AppError::Fetch(format!(
                "{} error ({})",
                label,
                response.status().as_u16()
            )));
        }

        let bytes = response.bytes().await?;
        let feed = parser::parse(&bytes[..])
            .map_err(|e| AppError::Fetch(format!("Unable to parse {} feed: {}", label, e)))?;
        tracing::debug!("Fetched {} entries from {}", feed.entries.len(), url);
        Ok(feed)
    }
}

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_string()
}

/// The `alternate` link of an entry, else its first link.
pub fn entry_link(entry: &feed_rs::model::Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
}
