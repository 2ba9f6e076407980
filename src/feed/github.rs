use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use crate::config::GithubConfig;
use crate::error::{AppError, Result};
use crate::models::{ItemType, SyncStats, SyncedItem};

use super::text::take_chars;
use super::{BlurbSource, SyncContext};

const USER_AGENT_STRING: &str = "PersonalHub/1.0";
const README_MAX_CHARS: usize = 2000;
const PER_PAGE: u32 = 100;
const PROMPT_VERSION: &str = "github_v1";
const INSTRUCTION: &str = "Summarize this open-source project in one crisp sentence (at most 30 words). \
Mention what it does and who benefits. No marketing fluff, no emojis.";

#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub id: i64,
    pub name: String,
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<GithubOwner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubOwner {
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl GithubRepo {
    pub fn to_synced_item(&self) -> SyncedItem {
        SyncedItem {
            item_type: ItemType::Github,
            source_id: Some(self.id.to_string()),
            source_url: self.html_url.clone(),
            title: self.name.clone(),
            description: Some(self.description.clone().unwrap_or_default()),
            blurb: None,
            image_url: self.owner.as_ref().and_then(|o| o.avatar_url.clone()),
            embed_html: None,
            tags: (!self.topics.is_empty()).then(|| self.topics.join(",")),
            published_at: self.pushed_at,
        }
    }
}

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(client: Client, config: &GithubConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        }
    }

    fn request(&self, url: &str, accept: &'static str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_STRING)
            .header(ACCEPT, accept);
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Every public repo of `username`, most recently pushed first, across all pages.
    pub async fn fetch_repos(&self, username: &str) -> Result<Vec<GithubRepo>> {
        let mut repos = Vec::new();
        let mut next = Some(format!(
            "{}/users/{}/repos?sort=pushed&per_page={}",
            self.api_url,
            urlencoding::encode(username),
            PER_PAGE
        ));

        while let Some(url) = next.take() {
            let response = self
                .request(&url, "application/vnd.github.mercy-preview+json")
                .send()
                .await
                .map_err(|e| AppError::Fetch(format!("GitHub API request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Fetch(format!("GitHub API error ({}): {}", status, body)));
            }

            next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_page_url);

            let page: Vec<GithubRepo> = response
                .json()
                .await
                .map_err(|e| {
                    AppError::Fetch(format!("GitHub API returned an unreadable payload: {}", e))
                })?;
            repos.extend(page);
        }

        Ok(repos)
    }

    /// Raw README capped at 2000 chars. Any failure is logged and yields `None`.
    pub async fn fetch_readme(&self, repo: &GithubRepo) -> Option<String> {
        let owner = repo.owner.as_ref()?;
        let url = format!("{}/repos/{}/{}/readme", self.api_url, owner.login, repo.name);

        let response = match self.request(&url, "application/vnd.github.v3.raw").send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch README for {}/{}: {}", owner.login, repo.name, e);
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!("No README for {}/{}: {}", owner.login, repo.name, response.status());
            return None;
        }

        match response.text().await {
            Ok(text) if !text.trim().is_empty() => Some(take_chars(&text, README_MAX_CHARS)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read README for {}/{}: {}", owner.login, repo.name, e);
                None
            }
        }
    }
}

/// The `rel="next"` target of a GitHub `Link` header.
fn next_page_url(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| url.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Upsert every repo of each user and give each one a blurb.
pub async fn sync_repos(ctx: &SyncContext, github: &GithubClient, usernames: &[String]) -> Result<SyncStats> {
    let mut stats = SyncStats::default();

    for username in usernames.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        let repos = github.fetch_repos(username).await?;
        tracing::info!("Fetched {} repos for {}", repos.len(), username);

        for repo in repos {
            let item_id = ctx.repository.upsert_synced_item(repo.to_synced_item()).await?;
            stats.processed += 1;

            let readme = github.fetch_readme(&repo).await;
            let text = readme
                .or_else(|| repo.description.clone().filter(|d| !d.trim().is_empty()))
                .unwrap_or_else(|| repo.name.clone());

            ctx.summarize_or_fallback(
                BlurbSource {
                    item_id,
                    title: &repo.name,
                    text: &text,
                    prompt_version: PROMPT_VERSION,
                    instruction: Some(INSTRUCTION),
                },
                &mut stats,
            )
            .await;
        }
    }

    Ok(stats)
}
