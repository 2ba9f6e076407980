use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SummarizerConfig;
use crate::error::{AppError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 300;

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: i64,
    #[serde(default)]
    output_tokens: i64,
}

/// Text and token accounting from one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_cents: i64,
}

/// Thin client for the Messages API. Caching lives in [`super::SummaryCache`].
#[derive(Clone)]
pub struct Summarizer {
    client: Client,
    api_key: String,
    base_url: String,
    input_price_per_mtok: f64,
    output_price_per_mtok: f64,
}

impl Summarizer {
    /// `None` when no API key is configured.
    pub fn from_config(client: Client, config: &SummarizerConfig) -> Option<Self> {
        let api_key = config.api_key.as_ref().filter(|k| !k.trim().is_empty())?;
        Some(Self {
            client,
            api_key: api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            input_price_per_mtok: config.input_price_per_mtok,
            output_price_per_mtok: config.output_price_per_mtok,
        })
    }

    pub async fn complete(&self, model: &str, prompt: &str) -> Result<Completion> {
        let request = MessageRequest {
            model,
            max_tokens: MAX_OUTPUT_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::Summarizer(format!("API error ({}): {}", status, error_text)));
        }

        let message_response: MessageResponse = response.json().await?;

        let text = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        let usage = message_response.usage;
        Ok(Completion {
            text,
            tokens_in: usage.input_tokens,
            tokens_out: usage.output_tokens,
            cost_cents: self.cost_cents(usage.input_tokens, usage.output_tokens),
        })
    }

    fn cost_cents(&self, tokens_in: i64, tokens_out: i64) -> i64 {
        let dollars = (tokens_in as f64 * self.input_price_per_mtok
            + tokens_out as f64 * self.output_price_per_mtok)
            / 1_000_000.0;
        (dollars * 100.0).round() as i64
    }
}
