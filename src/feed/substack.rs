use feed_rs::model::Entry;

use crate::error::Result;
use crate::models::{ItemType, SyncStats, SyncedItem};

use super::fetcher::{entry_link, FeedFetcher};
use super::text::{strip_html, take_chars};
use super::{BlurbSource, SyncContext};

const PROMPT_VERSION: &str = "substack_v1";
const INITIAL_BLURB_CHARS: usize = 240;

/// Map one newsletter post. Full `content:encoded` wins over the short description.
pub fn normalize_post(entry: &Entry) -> Option<SyncedItem> {
    let source_url = entry_link(entry)?;
    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "Untitled".to_string());

    let content = entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
        .unwrap_or_default();

    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
        .or_else(|| {
            entry
                .media
                .iter()
                .flat_map(|m| m.thumbnails.iter())
                .map(|t| t.image.uri.clone())
                .next()
        });

    let plain = strip_html(&content);
    let source_id = if entry.id.is_empty() {
        source_url.clone()
    } else {
        entry.id.clone()
    };

    Some(SyncedItem {
        item_type: ItemType::Substack,
        source_id: Some(source_id),
        source_url,
        title,
        description: Some(content),
        blurb: (!plain.is_empty()).then(|| take_chars(&plain, INITIAL_BLURB_CHARS)),
        image_url,
        embed_html: None,
        tags: None,
        published_at: entry.published.or(entry.updated),
    })
}

pub async fn sync_posts(ctx: &SyncContext, fetcher: &FeedFetcher, feed_url: &str) -> Result<SyncStats> {
    let feed = fetcher.fetch_feed(feed_url.trim(), "Substack RSS").await?;
    let mut stats = SyncStats::default();

    for post in feed.entries.iter().filter_map(normalize_post) {
        let plain = strip_html(post.description.as_deref().unwrap_or_default());
        let title = post.title.clone();
        let item_id = ctx.repository.upsert_synced_item(post).await?;
        stats.processed += 1;

        ctx.summarize_or_fallback(
            BlurbSource {
                item_id,
                title: &title,
                text: &plain,
                prompt_version: PROMPT_VERSION,
                instruction: None,
            },
            &mut stats,
        )
        .await;
    }

    Ok(stats)
}
