use feed_rs::model::Entry;

use crate::error::Result;
use crate::models::{ItemType, SyncStats, SyncedItem};

use super::fetcher::{entry_link, FeedFetcher};
use super::{BlurbSource, SyncContext};

const PROMPT_VERSION: &str = "youtube_v1";

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Map one channel feed entry to a `youtube` item with thumbnail and embed markup.
pub fn normalize_video(entry: &Entry) -> Option<SyncedItem> {
    let video_id = entry
        .id
        .strip_prefix("yt:video:")
        .unwrap_or(&entry.id)
        .to_string();
    let source_url = entry_link(entry)
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", video_id));
    let title = entry.title.as_ref().map(|t| t.content.clone())?;

    let media = entry.media.first();
    let description = media
        .and_then(|m| m.description.as_ref())
        .map(|d| d.content.clone())
        .unwrap_or_default();
    let image_url = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();

    let embed_html = (!video_id.is_empty()).then(|| {
        format!(
            r#"<iframe src="https://www.youtube.com/embed/{}" title="{}" allowfullscreen class="w-full aspect-video rounded-xl border border-slate-800"></iframe>"#,
            video_id,
            escape_attr(&title)
        )
    });

    Some(SyncedItem {
        item_type: ItemType::Youtube,
        source_id: Some(video_id),
        source_url,
        title,
        description: Some(description),
        blurb: None,
        image_url,
        embed_html,
        tags: None,
        published_at: entry.published.or(entry.updated),
    })
}

/// Sync the latest uploads of one channel.
pub async fn sync_videos(
    ctx: &SyncContext,
    fetcher: &FeedFetcher,
    feed_base_url: &str,
    channel_id: &str,
) -> Result<SyncStats> {
    let url = format!(
        "{}?channel_id={}",
        feed_base_url,
        urlencoding::encode(channel_id.trim())
    );
    let feed = fetcher.fetch_feed(&url, "YouTube RSS").await?;
    let mut stats = SyncStats::default();

    for video in feed.entries.iter().filter_map(normalize_video) {
        let text = format!(
            "{}\n\n{}",
            video.title,
            video.description.as_deref().unwrap_or_default()
        );
        let title = video.title.clone();
        let item_id = ctx.repository.upsert_synced_item(video).await?;
        stats.processed += 1;

        ctx.summarize_or_fallback(
            BlurbSource {
                item_id,
                title: &title,
                text: &text,
                prompt_version: PROMPT_VERSION,
                instruction: None,
            },
            &mut stats,
        )
        .await;
    }

    Ok(stats)
}
