//! HTTP client for the conversation API.

use crate::conversations::Conversation;
use futures::future::LocalBoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// The authenticated user on whose behalf requests are made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Viewer {
    pub id: i32,
    pub token: String,
}

/// Errors raised by [`ConversationClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No credential, or the server rejected it (401/403)
    Auth,
    /// Connect, timeout, or body read failure
    Network(String),
    /// Any other non-success status, or a body that is not the expected JSON
    Server { status: u16, message: String },
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Auth => write!(f, "Not authenticated"),
            ClientError::Network(msg) => write!(f, "Network error: {}", msg),
            ClientError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for ClientError {}

/// Anything that can list the conversations visible to a viewer.
///
/// The unread indicator depends on this rather than on [`ConversationClient`]
/// so it can run against any source.
pub trait ConversationSource {
    fn list_conversations(
        &self,
        viewer: &Viewer,
    ) -> LocalBoxFuture<'static, Result<Vec<Conversation>, ClientError>>;
}

#[derive(Deserialize)]
struct UnreadTotal {
    total: i64,
}

/// Read-only client for the conversation endpoints.
#[derive(Clone, Debug)]
pub struct ConversationClient {
    http: reqwest::Client,
    base_url: Url,
}

/// `base_url` with a trailing slash, so relative joins keep any path prefix
/// (`https://host/app` serves `https://host/app/api/...`).
pub(crate) fn directory_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

impl ConversationClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: directory_url(&base_url),
        })
    }

    /// Client configured from the `[client]` config section.
    pub fn from_config() -> Result<Self, ClientError> {
        let config = crate::app_config::client();
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Network(format!("invalid base URL: {}", e)))?;

        Self::new(base_url, Duration::from_secs(config.request_timeout_seconds))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `path` is relative to the base URL and must not start with `/`.
    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Network(format!("invalid URL: {}", e)))
    }

    /// Issue an authenticated GET and decode a JSON body.
    async fn get_json<T>(&self, path: &str, token: &str) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        if token.is_empty() {
            return Err(ClientError::Auth);
        }

        let response = self
            .http
            .get(self.endpoint(path)?)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Auth);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ClientError::Server {
            status: status.as_u16(),
            message: format!("malformed response body: {}", e),
        })
    }

    /// Conversations visible to the viewer, in server order.
    pub async fn list_conversations(&self, viewer: &Viewer) -> Result<Vec<Conversation>, ClientError> {
        self.get_json("api/conversations", &viewer.token).await
    }

    /// Server-side unread aggregate.
    pub async fn unread_total(&self, viewer: &Viewer) -> Result<i64, ClientError> {
        let body: UnreadTotal = self
            .get_json("api/conversations/unread", &viewer.token)
            .await?;
        Ok(body.total)
    }

    /// Resolve a bearer token to the viewer it belongs to.
    pub async fn fetch_viewer(&self, token: &str) -> Result<Viewer, ClientError> {
        let profile: ProfileId = self.get_json("api/profile", token).await?;
        Ok(Viewer {
            id: profile.id,
            token: token.to_owned(),
        })
    }
}

/// The only part of `GET /api/profile` the client needs.
#[derive(Deserialize)]
struct ProfileId {
    id: i32,
}

impl ConversationSource for ConversationClient {
    fn list_conversations(
        &self,
        viewer: &Viewer,
    ) -> LocalBoxFuture<'static, Result<Vec<Conversation>, ClientError>> {
        let client = self.clone();
        let viewer = viewer.clone();
        Box::pin(async move { ConversationClient::list_conversations(&client, &viewer).await })
    }
}
