//! REST transport for the client.
//!
//! Provides [`HttpTransport`], which executes [`ApiRequest`]s against the chat
//! backend. This is a thin layer that attaches the bearer token, retries a
//! server error once and maps HTTP outcomes onto [`ApiError`]; synchronization
//! logic remains in the Sans-IO [`Client`](crate::Client).

use std::{sync::Arc, time::Duration};

use chatsync_core::{ApiError, Contact, Conversation, Message, MessagePage};
use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiRequest, ApiResponse};

/// Transport construction errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The base URL does not parse or cannot carry a path.
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl {
        /// URL as configured.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API root, e.g. `https://chat.example.com/api`.
    pub base_url: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Pause before retrying a server error.
    pub retry_delay: Duration,
}

impl TransportConfig {
    /// Defaults for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(15),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Response bodies arrive either wrapped in `{ "data": ... }` or bare.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    token: Arc<str>,
    config: TransportConfig,
}

impl HttpTransport {
    /// Build a transport that authenticates with `token`.
    pub fn new(
        config: TransportConfig,
        token: impl Into<Arc<str>>,
    ) -> Result<Self, TransportError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| TransportError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "not a hierarchical url".to_string(),
            });
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self { http, base_url, token: token.into(), config })
    }

    /// Execute one request.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match request {
            ApiRequest::FindConversation { user_a, user_b } => {
                let url = self.endpoint(&[
                    "conversations",
                    "between",
                    user_a.as_str(),
                    user_b.as_str(),
                ])?;
                self.call::<Conversation>(Method::GET, url, None)
                    .await
                    .map(ApiResponse::Conversation)
            },
            ApiRequest::CreateConversation { participants } => {
                let url = self.endpoint(&["conversations"])?;
                let [a, b] = participants.members();
                let body = json!({ "participant_ids": [a, b] });
                self.call::<Conversation>(Method::POST, url, Some(body))
                    .await
                    .map(ApiResponse::Conversation)
            },
            ApiRequest::FetchMessages { conversation_id, page, limit } => {
                let mut url =
                    self.endpoint(&["messages", "conversation", conversation_id.as_str()])?;
                url.query_pairs_mut()
                    .append_pair("page", &page.to_string())
                    .append_pair("limit", &limit.to_string());
                self.call::<MessagePage>(Method::GET, url, None).await.map(ApiResponse::Messages)
            },
            ApiRequest::PersistMessage(message) => {
                let url = self.endpoint(&["messages"])?;
                let body =
                    serde_json::to_value(&message).map_err(|e| ApiError::Decode(e.to_string()))?;
                self.call::<Message>(Method::POST, url, Some(body)).await.map(ApiResponse::Message)
            },
            ApiRequest::MarkRead { user_id, conversation_id } => {
                let url = self.endpoint(&["messages", user_id.as_str(), "read"])?;
                let body = json!({ "conversation_id": conversation_id });
                self.send_with_retry(&Method::PATCH, &url, Some(&body)).await?;
                Ok(ApiResponse::Empty)
            },
            ApiRequest::ListUsers => {
                let url = self.endpoint(&["users"])?;
                self.call::<Vec<Contact>>(Method::GET, url, None).await.map(ApiResponse::Users)
            },
            ApiRequest::SearchUsers { term } => {
                let mut url = self.endpoint(&["users", "search"])?;
                url.query_pairs_mut().append_pair("term", &term);
                self.call::<Vec<Contact>>(Method::GET, url, None).await.map(ApiResponse::Users)
            },
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Transport("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let text = self.send_with_retry(&method, &url, body.as_ref()).await?;
        decode(&text)
    }

    /// Send once, and once more after `retry_delay` if the server failed.
    async fn send_with_retry(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        match self.send(method, url, body).await {
            Err(ApiError::Server { status, .. }) => {
                warn!(%method, %url, status, "server error, retrying once");
                tokio::time::sleep(self.config.retry_delay).await;
                self.send(method, url, body).await
            },
            other => other,
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<String, ApiError> {
        debug!(%method, %url, "http request");
        let mut builder = self.http.request(method.clone(), url.clone()).bearer_auth(&self.token);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_error(&e))?;
        classify(status, text)
    }

    fn map_error(&self, error: &reqwest::Error) -> ApiError {
        if error.is_timeout() {
            ApiError::Timeout { elapsed: self.config.timeout }
        } else if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

/// Map an HTTP status onto the error taxonomy, passing successful bodies through.
fn classify(status: StatusCode, body: String) -> Result<String, ApiError> {
    if status.is_success() {
        return Ok(body);
    }
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or_default().to_string()
    } else {
        body
    };
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        s if s.is_server_error() => ApiError::Server { status: s.as_u16(), message },
        s => ApiError::Rejected { status: s.as_u16(), message },
    })
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(Envelope::Wrapped { data } | Envelope::Bare(data)) => Ok(data),
        Err(e) => Err(ApiError::Decode(e.to_string())),
    }
}
