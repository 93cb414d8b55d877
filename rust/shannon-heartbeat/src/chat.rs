//! Chat platform client.
//!
//! The scheduler only needs three calls, none of which may fail loudly: a
//! post that cannot be created is reported as `None` and logged.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A created or updated post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub root_id: String,
    #[serde(default)]
    pub message: String,
}

/// Operations the heartbeat scheduler performs against the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Create a post, optionally as a reply in the thread rooted at `root_id`.
    async fn create_post(
        &self,
        channel_id: &str,
        message: &str,
        root_id: Option<&str>,
    ) -> Option<Post>;

    /// Show a typing indicator, optionally inside a thread.
    async fn send_typing(&self, channel_id: &str, parent_id: Option<&str>);

    /// Replace the text of an existing post.
    async fn update_post(&self, post_id: &str, message: &str) -> Option<Post>;
}

/// Mattermost v4 REST client authenticated with a bot token.
#[derive(Debug, Clone)]
pub struct MattermostClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl MattermostClient {
    /// Request timeout for every platform call.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.base_url)
    }

    async fn send_post(&self, request: reqwest::RequestBuilder, action: &str) -> Option<Post> {
        let response = match request.bearer_auth(&self.token).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(action, error = %e, "Chat request failed");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(action, status = status.as_u16(), body = %body, "Chat request rejected");
            return None;
        }
        match response.json::<Post>().await {
            Ok(post) => Some(post),
            Err(e) => {
                tracing::warn!(action, error = %e, "Unexpected chat response body");
                None
            }
        }
    }
}

#[async_trait]
impl ChatClient for MattermostClient {
    async fn create_post(
        &self,
        channel_id: &str,
        message: &str,
        root_id: Option<&str>,
    ) -> Option<Post> {
        let body = json!({
            "channel_id": channel_id,
            "message": message,
            "root_id": root_id.unwrap_or_default(),
        });
        self.send_post(self.http.post(self.url("/posts")).json(&body), "create_post")
            .await
    }

    async fn send_typing(&self, channel_id: &str, parent_id: Option<&str>) {
        let body = json!({
            "channel_id": channel_id,
            "parent_id": parent_id.unwrap_or_default(),
        });
        let result = self
            .http
            .post(self.url("/users/me/typing"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(e) = result {
            tracing::debug!(channel_id, error = %e, "Typing indicator failed");
        }
    }

    async fn update_post(&self, post_id: &str, message: &str) -> Option<Post> {
        let body = json!({ "message": message });
        let url = self.url(&format!("/posts/{post_id}/patch"));
        self.send_post(self.http.put(url).json(&body), "update_post").await
    }
}
