//! Newsletter signups through the mail provider's subscriber API.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument};

use coinpress_shared::{CoinpressError, NewsletterConfig, Result, eq_fold};

/// RFC 5321 path limit.
const MAX_EMAIL_LEN: usize = 254;

const USER_AGENT: &str = concat!("coinpress/", env!("CARGO_PKG_VERSION"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)+$")
        .expect("valid email regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    email_address: &'a str,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    referrer_url: Option<&'a str>,
}

/// Trim and validate an address, returning the trimmed form.
pub fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() {
        return Err(CoinpressError::validation("email address is required"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(CoinpressError::validation(format!(
            "email address is too long ({} characters, max {MAX_EMAIL_LEN})",
            email.len()
        )));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(CoinpressError::validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}

pub struct NewsletterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    default_tags: Vec<String>,
}

impl NewsletterClient {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CoinpressError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            default_tags: Vec::new(),
        })
    }

    /// Build a client from config, reading the API key from the configured env var.
    pub fn from_config(config: &NewsletterConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CoinpressError::config(format!(
                    "newsletter API key not set (export {})",
                    config.api_key_env
                ))
            })?;

        let mut client = Self::new(&config.endpoint, api_key.trim(), config.timeout_secs)?;
        client.default_tags = config.default_tags.clone();
        Ok(client)
    }

    /// Subscribe `email`, tagging it with the default tags plus `tags`.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn subscribe(
        &self,
        email: &str,
        tags: &[String],
        referrer_url: Option<&str>,
    ) -> Result<SubscribeOutcome> {
        let email = validate_email(email)?;
        let body = SubscribeRequest {
            email_address: email,
            tags: merge_tags(&self.default_tags, tags),
            referrer_url,
        };
        debug!(tags = ?body.tags, "sending signup");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoinpressError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status.is_success() {
            info!("subscribed");
            return Ok(SubscribeOutcome::Subscribed);
        }

        let text = response.text().await.unwrap_or_default();
        if is_already_subscribed(status, &text) {
            info!("address was already subscribed");
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        Err(CoinpressError::Network(format!(
            "{}: HTTP {status}: {}",
            self.endpoint,
            text.trim()
        )))
    }
}

fn is_already_subscribed(status: StatusCode, body: &str) -> bool {
    matches!(status, StatusCode::BAD_REQUEST | StatusCode::CONFLICT)
        && body.to_lowercase().contains("already")
}

/// Trimmed, non-empty tags with case-insensitive duplicates removed.
fn merge_tags(defaults: &[String], extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in defaults.iter().chain(extra) {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| eq_fold(t, tag)) {
            out.push(tag.to_string());
        }
    }
    out
}
