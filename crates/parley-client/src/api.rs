use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{ChatRequest, ChatResponse, HistoryResponse};

/// Declared policy from the widget configuration: 30 s request timeout,
/// three attempts with a flat 1 s backoff.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Default)]
pub struct HistoryParams {
    pub recruiter_id: String,
    pub conversation_id: Option<Uuid>,
    pub before: Option<Uuid>,
    pub page_size: Option<u32>,
}

/// Transport seam between the stores and the chatbot endpoints. Tests
/// script this; production uses [`HttpChatApi`].
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError>;
    async fn fetch_history(&self, params: &HistoryParams) -> Result<HistoryResponse, ClientError>;
}

pub struct HttpChatApi {
    client: Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            csrf_token: None,
        })
    }

    /// Fetch a token from the CSRF endpoint and attach it to all
    /// subsequent mutating requests.
    pub async fn prime_csrf(&mut self) -> Result<(), ClientError> {
        #[derive(serde::Deserialize)]
        struct TokenBody {
            token: String,
        }

        let resp = self
            .client
            .get(format!("{}/api/chatbot/csrf", self.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        let body: TokenBody = resp.json().await?;
        self.csrf_token = Some(body.token);
        Ok(())
    }

    /// Retry transport failures and 5xx responses only. A 2xx or 4xx is a
    /// final answer; retrying a delivered chat message would duplicate it.
    async fn post_with_retry(
        &self,
        url: &str,
        body: &ChatRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let mut last_err = None;

        for attempt in 1..=RETRY_ATTEMPTS {
            let mut req = self.client.post(url).json(body);
            if let Some(token) = &self.csrf_token {
                req = req.header("X-CSRF-Token", token);
            }

            match req.send().await {
                Ok(resp) if resp.status().is_server_error() => {
                    warn!("chat request attempt {} got {}", attempt, resp.status());
                    last_err = Some(ClientError::Status(resp.status().as_u16()));
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    warn!("chat request attempt {} failed: {}", attempt, e);
                    last_err = Some(ClientError::Http(e));
                }
            }

            if attempt < RETRY_ATTEMPTS {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }

        Err(last_err.unwrap_or(ClientError::Status(0)))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let url = format!("{}/api/chatbot/chat", self.base_url);
        let resp = self.post_with_retry(&url, request).await?;

        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }

    async fn fetch_history(&self, params: &HistoryParams) -> Result<HistoryResponse, ClientError> {
        let mut query: Vec<(&str, String)> =
            vec![("recruiterId", params.recruiter_id.clone())];
        if let Some(id) = params.conversation_id {
            query.push(("conversationId", id.to_string()));
        }
        if let Some(before) = params.before {
            query.push(("before", before.to_string()));
        }
        if let Some(size) = params.page_size {
            query.push(("pageSize", size.to_string()));
        }

        let resp = self
            .client
            .get(format!("{}/api/chatbot/history", self.base_url))
            .query(&query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClientError::Status(resp.status().as_u16()));
        }
        Ok(resp.json().await?)
    }
}
