use sha2::{Digest, Sha256};

use crate::db::{NewSummary, Repository};
use crate::error::Result;
use crate::models::SummaryOutcome;

use super::Summarizer;

pub const DEFAULT_INSTRUCTION: &str = "Summarize the content below in 1-2 sentences (at most 45 words), \
plain English, highlight concrete value/what this is, avoid hype, no emojis. Return plain text only.";

/// One summarization request against the cache.
#[derive(Debug, Clone)]
pub struct SummaryRequest<'a> {
    pub item_id: i64,
    pub text: &'a str,
    pub model: &'a str,
    pub prompt_version: &'a str,
    pub instruction: Option<&'a str>,
}

/// Content-hash cache in front of the summarizer. Calls never fail: errors land in
/// [`SummaryOutcome::error`].
#[derive(Clone)]
pub struct SummaryCache {
    repository: Repository,
    summarizer: Option<Summarizer>,
}

pub fn hash_source(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl SummaryCache {
    pub fn new(repository: Repository, summarizer: Option<Summarizer>) -> Self {
        Self {
            repository,
            summarizer,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.summarizer.is_some()
    }

    pub async fn summarize(&self, request: SummaryRequest<'_>) -> SummaryOutcome {
        let trimmed = request.text.trim();
        if trimmed.is_empty() {
            return SummaryOutcome::default();
        }

        let source_hash = hash_source(trimmed);
        match self
            .repository
            .cached_summary(request.item_id, request.model, &source_hash)
            .await
        {
            Ok(Some(entry)) if !entry.summary.is_empty() => {
                tracing::debug!("Summary cache hit for item {}", request.item_id);
                return SummaryOutcome {
                    summary: Some(entry.summary),
                    cached: true,
                    error: None,
                };
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Summary cache lookup failed for item {}: {}", request.item_id, e),
        }

        let Some(summarizer) = &self.summarizer else {
            tracing::warn!("Summarizer API key not configured; skipping summarization");
            return SummaryOutcome::default();
        };

        let prompt = format!(
            "{}\n\nCONTENT:\n{}",
            request.instruction.unwrap_or(DEFAULT_INSTRUCTION),
            trimmed
        );

        match self.call_and_store(summarizer, &request, &source_hash, &prompt).await {
            Ok(summary) => SummaryOutcome {
                summary: (!summary.is_empty()).then_some(summary),
                cached: false,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Summarization failed for item {}: {}", request.item_id, e);
                SummaryOutcome {
                    summary: None,
                    cached: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn call_and_store(
        &self,
        summarizer: &Summarizer,
        request: &SummaryRequest<'_>,
        source_hash: &str,
        prompt: &str,
    ) -> Result<String> {
        let completion = summarizer.complete(request.model, prompt).await?;
        if !completion.text.is_empty() {
            self.repository
                .store_summary(NewSummary {
                    item_id: request.item_id,
                    model: request.model.to_string(),
                    source_hash: source_hash.to_string(),
                    summary: completion.text.clone(),
                    prompt_version: request.prompt_version.to_string(),
                    tokens_in: completion.tokens_in,
                    tokens_out: completion.tokens_out,
                    cost_cents: completion.cost_cents,
                })
                .await?;
        }
        Ok(completion.text)
    }

    /// Summarize and, when a summary comes back, write it as the item's blurb.
    pub async fn summarize_and_update_item(&self, request: SummaryRequest<'_>) -> SummaryOutcome {
        let item_id = request.item_id;
        let mut outcome = self.summarize(request).await;
        if let Some(summary) = &outcome.summary {
            if let Err(e) = self.repository.set_item_blurb(item_id, summary.clone()).await {
                tracing::warn!("Failed to store blurb for item {}: {}", item_id, e);
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash_source("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_degrades_to_empty_outcome() {
        let repo = Repository::open_in_memory().await.unwrap();
        let cache = SummaryCache::new(repo, None);

        let outcome = cache
            .summarize(SummaryRequest {
                item_id: 1,
                text: "Something long enough to summarize.",
                model: "m",
                prompt_version: "v1",
                instruction: None,
            })
            .await;
        assert_eq!(outcome, SummaryOutcome::default());
    }

    #[tokio::test]
    async fn test_cache_hit_needs_no_client() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.store_summary(NewSummary {
            item_id: 3,
            model: "m".into(),
            source_hash: hash_source("cached text"),
            summary: "From cache.".into(),
            prompt_version: "v1".into(),
            tokens_in: 0,
            tokens_out: 0,
            cost_cents: 0,
        })
        .await
        .unwrap();
        let cache = SummaryCache::new(repo, None);

        let outcome = cache
            .summarize(SummaryRequest {
                item_id: 3,
                text: "  cached text \n",
                model: "m",
                prompt_version: "v1",
                instruction: None,
            })
            .await;
        assert_eq!(outcome.summary.as_deref(), Some("From cache."));
        assert!(outcome.cached);
    }

    #[tokio::test]
    async fn test_blank_text_skips_everything() {
        let repo = Repository::open_in_memory().await.unwrap();
        let cache = SummaryCache::new(repo, None);
        let outcome = cache
            .summarize(SummaryRequest {
                item_id: 1,
                text: "   ",
                model: "m",
                prompt_version: "v1",
                instruction: None,
            })
            .await;
        assert!(outcome.summary.is_none());
        assert!(!outcome.cached);
    }
}
