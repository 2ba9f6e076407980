//! Integration tests for provider sync and the summary cache
//!
//! GitHub, the channel and newsletter feeds and the summarizer API are all replaced by local
//! axum servers so the tests can count outbound summarizer calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use personal_hub::db::Repository;
use personal_hub::models::{ItemQuery, ItemType};
use personal_hub::{App, AppError, Config, SyncTarget};

const SUMMARY: &str = "A neat summary.";

const CHANNEL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <title>Channel</title>
  <id>yt:channel:UC123</id>
  <updated>2024-05-01T00:00:00+00:00</updated>
  <entry>
    <id>yt:video:abc123</id>
    <title>Building a CRM</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=abc123"/>
    <published>2024-04-30T12:00:00+00:00</published>
    <media:group>
      <media:thumbnail url="https://i.ytimg.com/vi/abc123/hqdefault.jpg" width="480" height="360"/>
      <media:description>We build a tiny CRM.</media:description>
    </media:group>
  </entry>
  <entry>
    <id>yt:video:def456</id>
    <title>Shipping it</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=def456"/>
    <published>2024-04-20T12:00:00+00:00</published>
    <media:group>
      <media:description>Deploy day.</media:description>
    </media:group>
  </entry>
</feed>"#;

const POSTS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Letters</title>
    <link>https://letters.example.com</link>
    <description>Newsletter</description>
    <item>
      <title>Issue #1</title>
      <link>https://letters.example.com/p/issue-1</link>
      <guid isPermaLink="false">post-1</guid>
      <content:encoded><![CDATA[<h2>Hello</h2><p>This week I rebuilt the newsletter pipeline from scratch, moved every subscriber into a single table and finally wrote down how the campaign sender retries failed recipients without ever emailing anyone twice.</p>]]></content:encoded>
      <pubDate>Mon, 01 Apr 2024 09:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Issue #2</title>
      <link>https://letters.example.com/p/issue-2</link>
      <guid isPermaLink="false">post-2</guid>
      <description>Short note.</description>
      <pubDate>Mon, 08 Apr 2024 09:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Two repos: `tiny` has a 10 character description and no README, `big` has a long README.
async fn mock_github() -> String {
    let router = Router::new()
        .route(
            "/users/:user/repos",
            get(|Path(user): Path<String>| async move {
                Json(json!([
                    {
                        "id": 1,
                        "name": "tiny",
                        "html_url": format!("https://github.com/{}/tiny", user),
                        "description": "Tiny tool!",
                        "owner": { "login": user }
                    },
                    {
                        "id": 2,
                        "name": "big",
                        "html_url": format!("https://github.com/{}/big", user),
                        "description": "Big",
                        "topics": ["rust", "cli"],
                        "owner": { "login": user }
                    }
                ]))
            }),
        )
        .route(
            "/repos/:owner/:name/readme",
            get(|Path((_, name)): Path<(String, String)>| async move {
                if name == "big" {
                    let readme = "# big\n\n".to_string()
                        + &"A command line tool that does a great many useful things. ".repeat(6);
                    (StatusCode::OK, readme).into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }),
        );
    spawn(router).await
}

/// A GitHub API that answers every repo listing with `status` and `body`.
async fn broken_github(status: StatusCode, body: &'static str) -> String {
    let router = Router::new().route(
        "/users/:user/repos",
        get(move || async move { (status, [(header::CONTENT_TYPE, "application/json")], body) }),
    );
    spawn(router).await
}

/// Channel feed (only for `channel_id=UC123`), newsletter feed and a failing feed.
async fn mock_feeds() -> String {
    let router = Router::new()
        .route(
            "/feeds/videos.xml",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                if query.get("channel_id").map(String::as_str) == Some("UC123") {
                    ([(header::CONTENT_TYPE, "application/atom+xml")], CHANNEL_FEED).into_response()
                } else {
                    StatusCode::NOT_FOUND.into_response()
                }
            }),
        )
        .route(
            "/letters/feed",
            get(|| async { ([(header::CONTENT_TYPE, "application/rss+xml")], POSTS_FEED) }),
        )
        .route("/broken/feed", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    spawn(router).await
}

/// Summarizer answering with `status`; the counter sees every call, failed or not.
async fn summarizer_with(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let router = Router::new().route(
        "/v1/messages",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if status.is_success() {
                    (
                        status,
                        Json(json!({
                            "content": [{ "type": "text", "text": SUMMARY }],
                            "usage": { "input_tokens": 120, "output_tokens": 12 }
                        })),
                    )
                } else {
                    (status, Json(json!({ "error": { "message": "overloaded" } })))
                }
            }
        }),
    );
    (spawn(router).await, calls)
}

async fn app_with(config: Config) -> App {
    let repository = Repository::open_in_memory().await.unwrap();
    App::with_repository(config, repository).unwrap()
}

async fn github_config(summarizer_status: StatusCode) -> (Config, Arc<AtomicUsize>) {
    let (summarizer_url, calls) = summarizer_with(summarizer_status).await;

    let mut config = Config::default();
    config.github.user = Some("octo".to_string());
    config.github.api_url = mock_github().await;
    config.summarizer.api_key = Some("test-key".to_string());
    config.summarizer.base_url = summarizer_url;
    (config, calls)
}

async fn setup() -> (App, Arc<AtomicUsize>) {
    let (config, calls) = github_config(StatusCode::OK).await;
    (app_with(config).await, calls)
}

#[tokio::test]
async fn test_github_sync_summarizes_only_long_text() {
    let (app, calls) = setup().await;

    let stats = app.sync(SyncTarget::Github).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.summarized, 1);
    assert!(stats.errors.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let items = app
        .repository
        .list_items(ItemType::Github, ItemQuery::all_including_hidden())
        .await
        .unwrap();
    let tiny = items.iter().find(|i| i.title == "tiny").unwrap();
    let big = items.iter().find(|i| i.title == "big").unwrap();

    assert_eq!(tiny.blurb.as_deref(), Some("Tiny tool!"));
    assert_eq!(tiny.description.as_deref(), Some("Tiny tool!"));
    assert_eq!(big.blurb.as_deref(), Some(SUMMARY));
    assert_eq!(big.tags.as_deref(), Some("rust,cli"));
}

#[tokio::test]
async fn test_resync_reuses_cached_summaries() {
    let (app, calls) = setup().await;

    app.sync(SyncTarget::Github).await.unwrap();
    let again = app.sync(SyncTarget::Github).await.unwrap();

    assert_eq!(again.processed, 2);
    assert_eq!(again.summarized, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.repository.count_items(ItemType::Github).await.unwrap(), 2);
}

#[tokio::test]
async fn test_manual_resummarize_calls_once_then_hits_cache() {
    let (app, calls) = setup().await;
    app.sync(SyncTarget::Github).await.unwrap();

    let tiny = app
        .repository
        .list_items(ItemType::Github, ItemQuery::all_including_hidden())
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.title == "tiny")
        .unwrap();

    let first = app.resummarize_item(tiny.id).await.unwrap();
    assert_eq!(first.summary.as_deref(), Some(SUMMARY));
    assert!(!first.cached);

    let second = app.resummarize_item(tiny.id).await.unwrap();
    assert!(second.cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let refreshed = app.repository.get_item(tiny.id).await.unwrap().unwrap();
    assert_eq!(refreshed.blurb.as_deref(), Some(SUMMARY));
}

#[tokio::test]
async fn test_sync_all_skips_unconfigured_providers() {
    let (app, _) = setup().await;

    let stats = app.sync(SyncTarget::All).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert!(app.sync(SyncTarget::Youtube).await.is_err());
}

#[tokio::test]
async fn test_summarizer_failure_is_reported_and_falls_back() {
    let (config, calls) = github_config(StatusCode::SERVICE_UNAVAILABLE).await;
    let app = app_with(config).await;

    let stats = app.sync(SyncTarget::Github).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.summarized, 0);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].title, "big");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let big = app
        .repository
        .list_items(ItemType::Github, ItemQuery::all_including_hidden())
        .await
        .unwrap()
        .into_iter()
        .find(|i| i.title == "big")
        .unwrap();
    let blurb = big.blurb.clone().unwrap();
    assert!(blurb.contains("A command line tool"));
    assert!(blurb.ends_with('…'));
    assert!(blurb.chars().count() <= 218);

    // A failed call is not cached, and the fallback never replaces a blurb already set.
    app.repository
        .set_item_blurb(big.id, "Written by hand.".to_string())
        .await
        .unwrap();
    let again = app.sync(SyncTarget::Github).await.unwrap();
    assert_eq!(again.errors.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let big = app.repository.get_item(big.id).await.unwrap().unwrap();
    assert_eq!(big.blurb.as_deref(), Some("Written by hand."));
}

#[tokio::test]
async fn test_github_error_status_is_fetch_error() {
    let mut config = Config::default();
    config.github.user = Some("octo".to_string());
    config.github.api_url = broken_github(StatusCode::BAD_GATEWAY, r#"{"message":"down"}"#).await;
    let app = app_with(config).await;

    let err = app.sync(SyncTarget::Github).await.unwrap_err();
    assert!(matches!(err, AppError::Fetch(_)));
    assert!(err.to_string().contains("502"));

    let stats = app.sync(SyncTarget::All).await.unwrap();
    assert_eq!(stats.processed, 0);
    assert_eq!(app.repository.count_items(ItemType::Github).await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_github_payload_is_fetch_error() {
    let mut config = Config::default();
    config.github.user = Some("octo".to_string());
    config.github.api_url = broken_github(StatusCode::OK, r#"{"not":"a list"}"#).await;
    let app = app_with(config).await;

    let err = app.sync(SyncTarget::Github).await.unwrap_err();
    assert!(matches!(err, AppError::Fetch(_)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_youtube_sync_from_channel_feed() {
    let feeds = mock_feeds().await;
    let mut config = Config::default();
    config.youtube.channel_id = Some("UC123".to_string());
    config.youtube.feed_url = format!("{}/feeds/videos.xml", feeds);
    let app = app_with(config).await;

    let stats = app.sync(SyncTarget::Youtube).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.summarized, 0);
    assert!(stats.errors.is_empty());

    let videos = app
        .repository
        .list_items(ItemType::Youtube, ItemQuery::all_including_hidden())
        .await
        .unwrap();
    assert_eq!(videos[0].title, "Building a CRM");
    assert_eq!(videos[0].source_id.as_deref(), Some("abc123"));
    assert_eq!(
        videos[0].image_url.as_deref(),
        Some("https://i.ytimg.com/vi/abc123/hqdefault.jpg")
    );
    assert!(videos[0]
        .embed_html
        .as_deref()
        .unwrap_or_default()
        .contains("https://www.youtube.com/embed/abc123"));
    assert!(videos[0].blurb.as_deref().unwrap_or_default().contains("We build a tiny CRM."));

    let again = app.sync(SyncTarget::Youtube).await.unwrap();
    assert_eq!(again.processed, 2);
    assert_eq!(app.repository.count_items(ItemType::Youtube).await.unwrap(), 2);
}

#[tokio::test]
async fn test_substack_sync_summarizes_long_posts_once() {
    let feeds = mock_feeds().await;
    let (summarizer_url, calls) = summarizer_with(StatusCode::OK).await;
    let mut config = Config::default();
    config.substack.feed_url = Some(format!("{}/letters/feed", feeds));
    config.summarizer.api_key = Some("test-key".to_string());
    config.summarizer.base_url = summarizer_url;
    let app = app_with(config).await;

    let stats = app.sync(SyncTarget::Substack).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.summarized, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let posts = app
        .repository
        .list_items(ItemType::Substack, ItemQuery::all_including_hidden())
        .await
        .unwrap();
    let first = posts.iter().find(|p| p.title == "Issue #1").unwrap();
    let second = posts.iter().find(|p| p.title == "Issue #2").unwrap();
    assert_eq!(first.blurb.as_deref(), Some(SUMMARY));
    assert_eq!(second.blurb.as_deref(), Some("Short note."));

    let again = app.sync(SyncTarget::Substack).await.unwrap();
    assert_eq!(again.summarized, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.repository.count_items(ItemType::Substack).await.unwrap(), 2);
}

#[tokio::test]
async fn test_feed_errors_are_fetch_errors_and_skipped_by_sync_all() {
    let feeds = mock_feeds().await;
    let (mut config, _) = github_config(StatusCode::OK).await;
    config.youtube.channel_id = Some("UCunknown".to_string());
    config.youtube.feed_url = format!("{}/feeds/videos.xml", feeds);
    config.substack.feed_url = Some(format!("{}/broken/feed", feeds));
    let app = app_with(config).await;

    let youtube = app.sync(SyncTarget::Youtube).await.unwrap_err();
    assert!(matches!(youtube, AppError::Fetch(_)));
    assert!(youtube.to_string().contains("404"));
    let substack = app.sync(SyncTarget::Substack).await.unwrap_err();
    assert!(matches!(substack, AppError::Fetch(_)));

    let stats = app.sync(SyncTarget::All).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(app.repository.count_items(ItemType::Github).await.unwrap(), 2);
    assert_eq!(app.repository.count_items(ItemType::Youtube).await.unwrap(), 0);
}
