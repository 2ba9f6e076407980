//! Read-only page models for the public site.
//!
//! Each route returns the JSON a template would render: the shared site header plus the
//! page-specific blocks, sourced from settings and visible items.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Essay, FeatureLink, Item, ItemQuery, ItemType, SiteSettings};

use super::AppState;

const APPEARED_ON_LIMIT: usize = 6;
const HOME_SECTION_LIMIT: u32 = 3;
const HOME_FEATURES_LIMIT: u32 = 12;
const SOCIAL_PER_NETWORK: u32 = 5;
const NEWSLETTER_LIMIT: u32 = 20;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/projects", get(projects))
        .route("/videos", get(videos))
        .route("/newsletter", get(newsletter))
        .route("/products", get(products))
        .route("/apps", get(apps))
        .route("/features", get(features))
        .route("/about", get(about))
        .route("/privacy", get(privacy))
        .route("/terms", get(terms))
        .route("/unsubscribe", get(unsubscribe))
}

#[derive(Debug, Serialize)]
pub struct SiteHeader {
    pub title: String,
    pub description: String,
    pub social_links: Vec<Value>,
}

impl From<&SiteSettings> for SiteHeader {
    fn from(site: &SiteSettings) -> Self {
        Self {
            title: site.title.clone(),
            description: site.description.clone(),
            social_links: site.social_links.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Hero {
    pub heading: String,
    pub subheading: String,
    pub cta_text: String,
    pub paragraphs: Vec<String>,
    pub image: String,
    pub image_alt: String,
}

#[derive(Debug, Serialize)]
pub struct HomePage {
    pub site: SiteHeader,
    pub hero: Hero,
    pub appeared_on: Vec<FeatureLink>,
    pub recent_essays: Vec<Essay>,
    pub newsletter_embed_url: String,
    pub projects: Vec<Item>,
    pub apps: Vec<Item>,
    pub videos: Vec<Item>,
    pub posts: Vec<Item>,
    pub features: Vec<Item>,
    pub social_posts: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub site: SiteHeader,
    pub title: &'static str,
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub struct AboutPage {
    pub site: SiteHeader,
    pub title: &'static str,
    pub about_html: String,
    pub hero_image: String,
    pub hero_image_alt: String,
    pub help_cards: Vec<Value>,
    pub apps: Vec<Item>,
}

#[derive(Debug, Serialize)]
pub struct StaticPage {
    pub site: SiteHeader,
    pub title: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribePage {
    pub site: SiteHeader,
    pub title: &'static str,
    pub token: Option<String>,
    pub email: Option<String>,
    pub invalid: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub token: Option<String>,
}

async fn featured_or_latest(repository: &Repository, item_type: ItemType, limit: u32) -> Result<Vec<Item>> {
    let featured = repository
        .list_items(item_type, ItemQuery::featured(limit))
        .await?;
    if !featured.is_empty() {
        return Ok(featured);
    }
    repository.list_items(item_type, ItemQuery::limit(limit)).await
}

/// Newest first by publish date, falling back to creation time.
fn latest_social(mut posts: Vec<Item>, limit: usize) -> Vec<Item> {
    posts.sort_by(|a, b| {
        let a = a.published_at.unwrap_or(a.created_at);
        let b = b.published_at.unwrap_or(b.created_at);
        b.cmp(&a)
    });
    posts.truncate(limit);
    posts
}

async fn home(State(state): State<AppState>) -> Result<Json<HomePage>> {
    let repository = &state.app.repository;
    let site = repository.site_settings().await?;

    let mut social = repository
        .list_items(ItemType::XPost, ItemQuery::limit(SOCIAL_PER_NETWORK))
        .await?;
    social.extend(
        repository
            .list_items(ItemType::LinkedinPost, ItemQuery::limit(SOCIAL_PER_NETWORK))
            .await?,
    );

    Ok(Json(HomePage {
        site: SiteHeader::from(&site),
        hero: Hero {
            heading: site.hero_heading.clone(),
            subheading: site.hero_subheading.clone(),
            cta_text: site.hero_cta_text.clone(),
            paragraphs: site.hero_paragraphs.clone(),
            image: site.hero_image_path.clone(),
            image_alt: site.hero_image_alt.clone(),
        },
        appeared_on: site.appeared_on.iter().take(APPEARED_ON_LIMIT).cloned().collect(),
        recent_essays: site.recent_essays.clone(),
        newsletter_embed_url: site.newsletter_embed_url.clone(),
        projects: featured_or_latest(repository, ItemType::Github, HOME_SECTION_LIMIT).await?,
        apps: featured_or_latest(repository, ItemType::App, HOME_SECTION_LIMIT).await?,
        videos: repository
            .list_items(ItemType::Youtube, ItemQuery::limit(HOME_SECTION_LIMIT))
            .await?,
        posts: repository
            .list_items(ItemType::Substack, ItemQuery::limit(HOME_SECTION_LIMIT))
            .await?,
        features: repository
            .list_items(ItemType::Feature, ItemQuery::featured(HOME_FEATURES_LIMIT))
            .await?,
        social_posts: latest_social(social, HOME_SECTION_LIMIT as usize),
    }))
}

async fn list_page(
    state: &AppState,
    title: &'static str,
    item_type: ItemType,
    query: ItemQuery,
) -> Result<Json<ListPage>> {
    let repository = &state.app.repository;
    let site = repository.site_settings().await?;
    Ok(Json(ListPage {
        site: SiteHeader::from(&site),
        title,
        items: repository.list_items(item_type, query).await?,
    }))
}

async fn projects(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(&state, "Projects", ItemType::Github, ItemQuery::default()).await
}

async fn videos(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(&state, "Videos", ItemType::Youtube, ItemQuery::default()).await
}

async fn newsletter(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(
        &state,
        "Newsletter",
        ItemType::Substack,
        ItemQuery::limit(NEWSLETTER_LIMIT),
    )
    .await
}

async fn products(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(&state, "Products", ItemType::Product, ItemQuery::default()).await
}

async fn apps(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(&state, "Apps", ItemType::App, ItemQuery::default()).await
}

async fn features(State(state): State<AppState>) -> Result<Json<ListPage>> {
    list_page(&state, "Features", ItemType::Feature, ItemQuery::default()).await
}

async fn about(State(state): State<AppState>) -> Result<Json<AboutPage>> {
    let repository = &state.app.repository;
    let site = repository.site_settings().await?;
    let about_html = if site.about_long_html.trim().is_empty() {
        site.about_html.clone()
    } else {
        site.about_long_html.clone()
    };

    Ok(Json(AboutPage {
        site: SiteHeader::from(&site),
        title: "About",
        about_html,
        hero_image: site.hero_image_path.clone(),
        hero_image_alt: site.hero_image_alt.clone(),
        help_cards: site.about_help_cards.clone(),
        apps: featured_or_latest(repository, ItemType::App, HOME_SECTION_LIMIT).await?,
    }))
}

async fn static_page(state: &AppState, title: &'static str) -> Result<Json<StaticPage>> {
    let site = state.app.repository.site_settings().await?;
    Ok(Json(StaticPage {
        site: SiteHeader::from(&site),
        title,
    }))
}

async fn privacy(State(state): State<AppState>) -> Result<Json<StaticPage>> {
    static_page(&state, "Privacy Policy").await
}

async fn terms(State(state): State<AppState>) -> Result<Json<StaticPage>> {
    static_page(&state, "Terms of Service").await
}

async fn unsubscribe(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<Json<UnsubscribePage>> {
    let site = state.app.repository.site_settings().await?;
    let token = query.token.filter(|t| !t.trim().is_empty());
    let email = token.as_deref().and_then(|t| state.app.tokens.verify(t));

    Ok(Json(UnsubscribePage {
        site: SiteHeader::from(&site),
        title: "Unsubscribe",
        invalid: token.is_some() && email.is_none(),
        token,
        email,
    }))
}
