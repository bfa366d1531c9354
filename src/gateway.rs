//! Collaborators the console talks to, and their HTTP implementation.
//!
//! The console depends only on [`SessionGateway`] and [`AiGateway`]. The
//! wire types here are shared with the `serve` backend, so the request a
//! console sends is exactly the request the server decodes.
//!
//! # Wire format
//!
//! ```json
//! POST /api/session  {"action": "create"}            -> {"id": "..."}
//! POST /api/chat     {"sessionId": "...", "query": "...", "context": ["..."],
//!                     "messageContent": [{"type": "text", "text": "..."},
//!                                        {"type": "image_url", "image_url": {"url": "data:..."}}]}
//!                                                    -> {"sessionId": "...", "response": "..."}
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::{QueryError, SessionError};
use crate::models::Session;

/// Issues conversation sessions. Called once at console startup.
#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn create_session(&self) -> Result<Session, SessionError>;
}

/// Answers queries.
#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, QueryError>;
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: String,
    pub query: String,
    /// Empty, or a single entry holding the whole assembled context.
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_content: Option<Vec<ContentPart>>,
}

impl ChatRequest {
    pub fn text(session_id: &str, query: &str, context: Vec<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            query: query.to_string(),
            context,
            message_content: None,
        }
    }

    /// Same envelope as [`text`](Self::text) plus the query and image as
    /// multimodal content parts.
    pub fn image(session_id: &str, query: &str, context: Vec<String>, data_url: String) -> Self {
        Self {
            message_content: Some(vec![
                ContentPart::Text {
                    text: query.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
            ..Self::text(session_id, query, context)
        }
    }

    pub fn has_image(&self) -> bool {
        self.message_content
            .as_ref()
            .is_some_and(|parts| parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Body of a successful `POST /api/chat` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    #[serde(default)]
    pub session_id: Option<String>,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRequest {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    #[serde(default)]
    id: String,
}

/// Both gateways over HTTP against a `genterm serve` compatible backend.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(config.query_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SessionGateway for HttpGateway {
    async fn create_session(&self) -> Result<Session, SessionError> {
        let body = SessionRequest {
            action: "create".to_string(),
            id: None,
        };
        let response = self
            .client
            .post(self.url("/api/session"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;
        if created.id.is_empty() {
            return Err(SessionError::InvalidResponse("missing session id".into()));
        }
        Ok(Session { id: created.id })
    }
}

#[async_trait]
impl AiGateway for HttpGateway {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, QueryError> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QueryError::Transport("request timed out".into())
                } else {
                    QueryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| QueryError::InvalidResponse(e.to_string()))
    }
}
