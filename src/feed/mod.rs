mod fetcher;
mod github;
mod substack;
mod text;
mod youtube;

pub use fetcher::{entry_link, resolve_url, FeedFetcher};
pub use github::{sync_repos, GithubClient, GithubRepo};
pub use substack::{normalize_post, sync_posts};
pub use text::{strip_html, take_chars, to_plain_summary, to_plain_text, truncate_chars};
pub use youtube::{normalize_video, sync_videos};

use crate::ai::{SummaryCache, SummaryRequest};
use crate::db::Repository;
use crate::models::{SyncError, SyncStats};

/// Source text shorter than this is not worth a summarizer call.
pub const SUMMARY_MIN_CHARS: usize = 160;

/// What every provider sync needs besides its own remote client.
#[derive(Clone)]
pub struct SyncContext {
    pub repository: Repository,
    pub cache: SummaryCache,
    pub model: String,
}

/// One freshly upserted item waiting for a blurb.
pub(crate) struct BlurbSource<'a> {
    pub item_id: i64,
    pub title: &'a str,
    pub text: &'a str,
    pub prompt_version: &'a str,
    pub instruction: Option<&'a str>,
}

impl SyncContext {
    /// Summarize long enough text; otherwise, or when no summary comes back, fill an empty
    /// blurb with the local plain-text fallback.
    pub(crate) async fn summarize_or_fallback(&self, source: BlurbSource<'_>, stats: &mut SyncStats) {
        if source.text.trim().chars().count() > SUMMARY_MIN_CHARS {
            let outcome = self
                .cache
                .summarize_and_update_item(SummaryRequest {
                    item_id: source.item_id,
                    text: source.text,
                    model: &self.model,
                    prompt_version: source.prompt_version,
                    instruction: source.instruction,
                })
                .await;

            if outcome.summary.is_some() {
                stats.summarized += 1;
                return;
            }
            if let Some(error) = outcome.error {
                stats.errors.push(SyncError {
                    item_id: source.item_id,
                    title: source.title.to_string(),
                    error,
                });
            }
        }

        self.fill_fallback_blurb(source.item_id, source.text).await;
    }

    async fn fill_fallback_blurb(&self, item_id: i64, text: &str) {
        let Some(blurb) = to_plain_summary(text) else {
            return;
        };
        let result = match self.repository.get_item(item_id).await {
            Ok(Some(item)) if item.blurb.as_deref().map_or(true, |b| b.trim().is_empty()) => {
                self.repository.set_item_blurb(item_id, blurb).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to write fallback blurb for item {}: {}", item_id, e);
        }
    }
}
