use std::time::Duration;

use async_trait::async_trait;
use casebot_core::config::SlackConfig;
use casebot_core::retry::RetryPolicy;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::blocks::MessageTemplate;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifierError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack api {method} returned status {status}")]
    Http { method: &'static str, status: u16 },
    #[error("slack api {method} rejected the message: {error}")]
    Api { method: &'static str, error: String },
}

impl NotifierError {
    /// Connection failures, rate limiting and 5xx responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Api { error, .. } => error == "ratelimited",
        }
    }
}

/// Best-effort chat delivery. Callers log failures and move on.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError>;

    /// Visible only to `user_id` inside `channel_id`.
    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError>;
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    error: Option<String>,
}

/// `chat.postMessage` / `chat.postEphemeral` over the Slack Web API.
#[derive(Clone)]
pub struct SlackWebNotifier {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: SecretString,
    retry: RetryPolicy,
}

impl SlackWebNotifier {
    pub fn new(http: reqwest::Client, api_base_url: &str, bot_token: SecretString) -> Self {
        Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            bot_token,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &SlackConfig) -> Result<Self, NotifierError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| NotifierError::Transport(error.to_string()))?;
        Ok(Self::new(http, &config.api_base_url, config.bot_token.clone()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call(&self, method: &'static str, payload: &Value) -> Result<(), NotifierError> {
        self.retry
            .run(method, NotifierError::is_transient, || self.call_once(method, payload))
            .await
    }

    async fn call_once(&self, method: &'static str, payload: &Value) -> Result<(), NotifierError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|error| NotifierError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Http { method, status: status.as_u16() });
        }

        let body: SlackApiResponse =
            response.json().await.map_err(|error| NotifierError::Transport(error.to_string()))?;
        if !body.ok {
            return Err(NotifierError::Api {
                method,
                error: body.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }

        debug!(event_name = "slack.posted", method, "slack message delivered");
        Ok(())
    }
}

fn message_payload(channel_id: &str, message: &MessageTemplate) -> Value {
    let mut payload = json!({ "channel": channel_id, "text": message.fallback_text });
    if !message.blocks.is_empty() {
        payload["blocks"] = json!(message.blocks);
    }
    payload
}

#[async_trait]
impl ChatNotifier for SlackWebNotifier {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError> {
        self.call("chat.postMessage", &message_payload(channel_id, message)).await
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError> {
        let mut payload = message_payload(channel_id, message);
        payload["user"] = json!(user_id);
        self.call("chat.postEphemeral", &payload).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel_id: String,
    /// Set for ephemeral posts.
    pub user_id: Option<String>,
    pub text: String,
}

/// In-process notifier that keeps every post. Optionally rejects every post after
/// recording it.
#[derive(Default)]
pub struct RecordingNotifier {
    posted: Mutex<Vec<PostedMessage>>,
    reject_with: Option<NotifierError>,
}

impl RecordingNotifier {
    pub fn rejecting(error: NotifierError) -> Self {
        Self { posted: Mutex::default(), reject_with: Some(error) }
    }

    pub async fn posted(&self) -> Vec<PostedMessage> {
        self.posted.lock().await.clone()
    }

    pub async fn texts(&self) -> Vec<String> {
        self.posted.lock().await.iter().map(|posted| posted.text.clone()).collect()
    }

    async fn record(&self, posted: PostedMessage) -> Result<(), NotifierError> {
        self.posted.lock().await.push(posted);
        match &self.reject_with {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatNotifier for RecordingNotifier {
    async fn post_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError> {
        self.record(PostedMessage {
            channel_id: channel_id.to_string(),
            user_id: None,
            text: message.fallback_text.clone(),
        })
        .await
    }

    async fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<(), NotifierError> {
        self.record(PostedMessage {
            channel_id: channel_id.to_string(),
            user_id: Some(user_id.to_string()),
            text: message.fallback_text.clone(),
        })
        .await
    }
}
