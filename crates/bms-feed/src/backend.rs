use async_trait::async_trait;
use bms_core::feed_contracts::Payload;
use bms_core::Scope;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The session token was rejected; the caller must re-authenticate.
    #[error("session rejected by backend (401)")]
    Unauthorized,
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    Request(String),
}

impl BackendError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized)
    }
}

/// Authoritative pull and write collaborator. Rows are returned raw; shaping
/// into events happens at the controller boundary.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    async fn snapshot(&self, scope: &Scope) -> Result<Vec<Value>, BackendError>;

    /// Returns the created row when the backend echoes it back.
    async fn create(&self, scope: &Scope, payload: &Payload) -> Result<Option<Value>, BackendError>;
}

/// REST backend with bearer-token injection.
pub struct HttpFeedBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpFeedBackend {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, BackendError> {
        let base_url =
            Url::parse(base_url).map_err(|err| BackendError::Request(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Request(format!(
                "api base cannot carry paths: {base_url}"
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Request("api base cannot carry paths".to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn collection(&self, scope: &Scope) -> Result<Url, BackendError> {
        match scope {
            Scope::Department(name) => self.endpoint(&["api", "messages", name.as_str()]),
            Scope::Notifications => self.endpoint(&["api", "notifications"]),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json(response: reqwest::Response) -> Result<Value, BackendError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| BackendError::Decode(err.to_string()))
    }
}

#[async_trait]
impl FeedBackend for HttpFeedBackend {
    async fn snapshot(&self, scope: &Scope) -> Result<Vec<Value>, BackendError> {
        let url = self.collection(scope)?;
        let response = self
            .authorize(self.client.get(url).header("Accept", "application/json"))
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let rows = snapshot_rows(Self::read_json(response).await?);
        debug!(event = "feed_snapshot_fetched", scope = %scope, rows = rows.len());
        Ok(rows)
    }

    async fn create(&self, scope: &Scope, payload: &Payload) -> Result<Option<Value>, BackendError> {
        let (url, body) = match (scope, payload) {
            (Scope::Department(department), Payload::Chat { author, text }) => (
                self.endpoint(&["api", "messages"])?,
                json!({
                    "user_name": author,
                    "department_id": department,
                    "message": text,
                }),
            ),
            (Scope::Notifications, Payload::Notification { kind, message }) => (
                self.endpoint(&["api", "notifications"])?,
                json!({
                    "type": kind.as_str(),
                    "message": message,
                }),
            ),
            _ => {
                return Err(BackendError::Request(format!(
                    "payload does not belong to {scope}"
                )))
            }
        };

        let response = self
            .authorize(self.client.post(url).json(&body))
            .send()
            .await
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        let created = Self::read_json(response).await?;
        Ok(created_row(created))
    }
}

/// Accepts a bare array or the `{ "data": [...] }` envelope of paginated endpoints.
fn snapshot_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn created_row(body: Value) -> Option<Value> {
    match body {
        Value::Object(_) => Some(body),
        _ => None,
    }
}
