use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;

use crate::ai::{Summarizer, SummaryCache, SummaryRequest};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{sync_posts, sync_repos, sync_videos, FeedFetcher, GithubClient, SyncContext};
use crate::models::{SendFilters, SendReport, SummaryOutcome, SyncStats};
use crate::services::{
    self, Analytics, AppMetadataFetcher, Enrichment, ImportOptions, ImportResult, MailgunClient,
    MailgunSettings, UnsubscribeTokens,
};

const USER_AGENT: &str = concat!("personal-hub/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const MANUAL_PROMPT_VERSION: &str = "admin_manual";

/// Which provider(s) a sync run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    Github,
    Youtube,
    Substack,
    All,
}

impl FromStr for SyncTarget {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(SyncTarget::Github),
            "youtube" => Ok(SyncTarget::Youtube),
            "substack" => Ok(SyncTarget::Substack),
            "all" => Ok(SyncTarget::All),
            other => Err(AppError::BadRequest(format!("Unknown sync target: {}", other))),
        }
    }
}

/// Everything a request or CLI run needs, built once at startup.
pub struct App {
    pub config: Config,
    pub repository: Repository,
    pub cache: SummaryCache,
    pub analytics: Analytics,
    pub tokens: UnsubscribeTokens,
    client: Client,
    fetcher: FeedFetcher,
    github: GithubClient,
    app_metadata: AppMetadataFetcher,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: Config, repository: Repository) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let summarizer = Summarizer::from_config(client.clone(), &config.summarizer);
        if summarizer.is_none() {
            tracing::info!("No summarizer API key configured; blurbs fall back to plain text");
        }

        Ok(Self {
            cache: SummaryCache::new(repository.clone(), summarizer),
            analytics: Analytics::new(repository.clone(), config.analytics_salt.clone()),
            tokens: UnsubscribeTokens::new(config.unsubscribe_secret.clone()),
            fetcher: FeedFetcher::new(client.clone()),
            github: GithubClient::new(client.clone(), &config.github),
            app_metadata: AppMetadataFetcher::new(client.clone()),
            client,
            repository,
            config,
        })
    }

    /// Summarizer model: the settings table wins over the config file.
    pub async fn summarizer_model(&self) -> Result<String> {
        let site = self.repository.site_settings().await?;
        Ok(site
            .summarizer_model
            .unwrap_or_else(|| self.config.summarizer.model.clone()))
    }

    async fn sync_context(&self) -> Result<SyncContext> {
        Ok(SyncContext {
            repository: self.repository.clone(),
            cache: self.cache.clone(),
            model: self.summarizer_model().await?,
        })
    }

    pub async fn sync_github(&self) -> Result<SyncStats> {
        let site = self.repository.site_settings().await?;
        let users = site
            .github_user
            .or_else(|| self.config.github.user.clone())
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("Add a GitHub username in Settings before fetching.".to_string())
            })?;
        let users: Vec<String> = crate::models::split_tags(&users);

        let ctx = self.sync_context().await?;
        sync_repos(&ctx, &self.github, &users).await
    }

    pub async fn sync_youtube(&self) -> Result<SyncStats> {
        let site = self.repository.site_settings().await?;
        let channel_id = site
            .youtube_channel_id
            .or_else(|| self.config.youtube.channel_id.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(
                    "Add a YouTube channel ID in Settings before fetching.".to_string(),
                )
            })?;

        let ctx = self.sync_context().await?;
        sync_videos(&ctx, &self.fetcher, &self.config.youtube.feed_url, &channel_id).await
    }

    pub async fn sync_substack(&self) -> Result<SyncStats> {
        let site = self.repository.site_settings().await?;
        let feed_url = site
            .substack_feed_url
            .or_else(|| self.config.substack.feed_url.clone())
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("Add a Substack feed URL in Settings before fetching.".to_string())
            })?;

        let ctx = self.sync_context().await?;
        sync_posts(&ctx, &self.fetcher, &feed_url).await
    }

    /// Run one provider, or all of them. With `All`, a failing or unconfigured provider is
    /// logged and skipped.
    pub async fn sync(&self, target: SyncTarget) -> Result<SyncStats> {
        match target {
            SyncTarget::Github => self.sync_github().await,
            SyncTarget::Youtube => self.sync_youtube().await,
            SyncTarget::Substack => self.sync_substack().await,
            SyncTarget::All => {
                let mut stats = SyncStats::default();
                for (name, result) in [
                    ("github", self.sync_github().await),
                    ("youtube", self.sync_youtube().await),
                    ("substack", self.sync_substack().await),
                ] {
                    match result {
                        Ok(provider) => stats.absorb(provider),
                        Err(e) => tracing::warn!("Skipping {} sync: {}", name, e),
                    }
                }
                Ok(stats)
            }
        }
    }

    pub async fn enrich_app(&self, item_id: i64, force: bool) -> Result<Option<Enrichment>> {
        let ctx = self.sync_context().await?;
        self.app_metadata.enrich_app_item(&ctx, item_id, force).await
    }

    /// Re-run the summarizer over an item's title and description.
    pub async fn resummarize_item(&self, item_id: i64) -> Result<SummaryOutcome> {
        let item = self
            .repository
            .get_item(item_id)
            .await?
            .ok_or_else(|| AppError::not_found("Item not found"))?;
        let text = format!(
            "{}\n\n{}",
            item.title,
            item.description.as_deref().unwrap_or_default()
        );
        let model = self.summarizer_model().await?;

        Ok(self
            .cache
            .summarize_and_update_item(SummaryRequest {
                item_id,
                text: &text,
                model: &model,
                prompt_version: MANUAL_PROMPT_VERSION,
                instruction: None,
            })
            .await)
    }

    /// A Mailgun client when the API key, domain and sender are all known.
    /// Domain, sender and base URL from the settings table win over the config file.
    pub async fn mailgun(&self) -> Result<Option<MailgunClient>> {
        let site = self.repository.site_settings().await?;
        let mailgun = &self.config.mailgun;

        let api_key = mailgun.api_key.clone().filter(|k| !k.trim().is_empty());
        let domain = site.mailgun_domain.or_else(|| mailgun.domain.clone());
        let from = site.mailgun_from.or_else(|| mailgun.from.clone());
        let base_url = site
            .mailgun_base_url
            .unwrap_or_else(|| mailgun.base_url.clone());

        Ok(match (api_key, domain, from) {
            (Some(api_key), Some(domain), Some(from))
                if !domain.trim().is_empty() && !from.trim().is_empty() =>
            {
                Some(MailgunClient::new(
                    self.client.clone(),
                    MailgunSettings {
                        api_key,
                        domain,
                        from,
                        base_url,
                    },
                ))
            }
            _ => None,
        })
    }

    pub async fn send_campaign(&self, campaign_id: i64, filters: &SendFilters) -> Result<SendReport> {
        let mailgun = self.mailgun().await?;
        services::send_campaign(
            &self.repository,
            mailgun.as_ref(),
            &self.tokens,
            campaign_id,
            filters,
        )
        .await
    }

    pub async fn import_csv(&self, data: &[u8], options: ImportOptions) -> Result<ImportResult> {
        services::import_subscribers(&self.repository, data, options).await
    }
}
