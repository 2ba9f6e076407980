use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub const DEV_UNSUBSCRIBE_SECRET: &str = "unsubscribe-secret";
pub const DEV_ANALYTICS_SALT: &str = "dev-salt";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Empty disables the admin surface entirely.
    #[serde(default)]
    pub admin_token: String,

    #[serde(default = "default_unsubscribe_secret")]
    pub unsubscribe_secret: String,

    #[serde(default = "default_analytics_salt")]
    pub analytics_salt: String,

    #[serde(default)]
    pub secure_cookies: bool,

    #[serde(default)]
    pub summarizer: SummarizerConfig,

    #[serde(default)]
    pub mailgun: MailgunConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub youtube: YoutubeConfig,

    #[serde(default)]
    pub substack: SubstackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,

    #[serde(default = "default_summarizer_model")]
    pub model: String,

    #[serde(default = "default_summarizer_url")]
    pub base_url: String,

    /// USD per million input tokens.
    #[serde(default = "default_input_price")]
    pub input_price_per_mtok: f64,

    /// USD per million output tokens.
    #[serde(default = "default_output_price")]
    pub output_price_per_mtok: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunConfig {
    pub api_key: Option<String>,
    pub domain: Option<String>,
    pub from: Option<String>,

    #[serde(default = "default_mailgun_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub token: Option<String>,
    pub user: Option<String>,

    #[serde(default = "default_github_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    pub channel_id: Option<String>,

    #[serde(default = "default_youtube_feed_url")]
    pub feed_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubstackConfig {
    pub feed_url: Option<String>,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("personal-hub");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("app.db").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_unsubscribe_secret() -> String {
    DEV_UNSUBSCRIBE_SECRET.to_string()
}

fn default_analytics_salt() -> String {
    DEV_ANALYTICS_SALT.to_string()
}

fn default_summarizer_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_summarizer_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_input_price() -> f64 {
    0.8
}

fn default_output_price() -> f64 {
    4.0
}

fn default_mailgun_url() -> String {
    "https://api.mailgun.net".to_string()
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

fn default_youtube_feed_url() -> String {
    "https://www.youtube.com/feeds/videos.xml".to_string()
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_summarizer_model(),
            base_url: default_summarizer_url(),
            input_price_per_mtok: default_input_price(),
            output_price_per_mtok: default_output_price(),
        }
    }
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            domain: None,
            from: None,
            base_url: default_mailgun_url(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            user: None,
            api_url: default_github_url(),
        }
    }
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            channel_id: None,
            feed_url: default_youtube_feed_url(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            admin_token: String::new(),
            unsubscribe_secret: default_unsubscribe_secret(),
            analytics_salt: default_analytics_salt(),
            secure_cookies: false,
            summarizer: SummarizerConfig::default(),
            mailgun: MailgunConfig::default(),
            github: GithubConfig::default(),
            youtube: YoutubeConfig::default(),
            substack: SubstackConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing out defaults when the file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("personal-hub")
            .join("config.toml")
    }

    /// Log loudly when secrets are still the development defaults.
    pub fn warn_on_dev_secrets(&self) {
        if self.unsubscribe_secret == DEV_UNSUBSCRIBE_SECRET {
            tracing::warn!("unsubscribe_secret is the development default; set it in config.toml");
        }
        if self.analytics_salt == DEV_ANALYTICS_SALT {
            tracing::warn!("analytics_salt is the development default; set it in config.toml");
        }
        if self.admin_token.is_empty() {
            tracing::warn!("admin_token is empty; the admin console is disabled");
        }
    }
}
