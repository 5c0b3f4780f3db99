//! Thin HTTP client over `reqwest` shared by every API service.
//!
//! Responses may be bare JSON or wrapped as
//! `{ "success": bool, "data": T, "message": string }`; both decode to `T`.

use std::{sync::Arc, time::Duration};

use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    tracing::{outgoing_request_id, REQUEST_ID_HEADER},
};

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("orderdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let base_url = config.base_url().map_err(|e| {
            ServiceError::ValidationError(format!("invalid api_base_url: {e}"))
        })?;
        Self::new(base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replaces the bearer token sent with every subsequent request.
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Resolves `path` against the base URL, keeping any base path prefix.
    pub fn endpoint(&self, path: &str) -> Result<Url, ServiceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ServiceError::InternalError(format!("invalid endpoint '{path}': {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ServiceError> {
        let (status, bytes) = self.execute::<()>(Method::GET, path, query, None).await?;
        decode_payload(status, &bytes)
    }

    pub async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ServiceError> {
        let (status, bytes) = self.execute(method, path, &[], body).await?;
        decode_payload(status, &bytes)
    }

    /// Sends a mutation whose only meaningful result is the backend's acknowledgement.
    pub async fn send_command<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ServiceError> {
        let (status, bytes) = self.execute(method, path, &[], body).await?;
        check_acknowledgement(status, &bytes)
    }

    #[instrument(skip(self, query, body), fields(method = %method, path = %path))]
    async fn execute<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<(StatusCode, Vec<u8>), ServiceError> {
        let url = self.endpoint(path)?;
        let request_id = outgoing_request_id();

        let mut request = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, request_id.as_str());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = self.token().await {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(request_id = %request_id, error = %e, "request failed before a response arrived");
            ServiceError::from(e)
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(ServiceError::from)?.to_vec();
        debug!(request_id = %request_id, status = status.as_u16(), len = bytes.len(), "response received");

        if !status.is_success() {
            return Err(ServiceError::from_response(status, error_message(status, &bytes)));
        }
        Ok((status, bytes))
    }
}

/// Best-effort human message from an error body.
fn error_message(status: StatusCode, bytes: &[u8]) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(bytes) {
        for key in ["message", "error"] {
            if let Some(Value::String(msg)) = map.get(key) {
                if !msg.trim().is_empty() {
                    return msg.clone();
                }
            }
        }
    }

    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        text
    }
}

/// `Some(message)` when the body is an envelope explicitly reporting failure.
fn envelope_failure(value: &Value) -> Option<String> {
    match value.get("success") {
        Some(Value::Bool(false)) => Some(
            value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request was not accepted")
                .to_string(),
        ),
        _ => None,
    }
}

fn decode_payload<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> Result<T, ServiceError> {
    let value: Value = serde_json::from_slice(bytes)?;

    if let Some(message) = envelope_failure(&value) {
        return Err(ServiceError::BadRequest(message));
    }

    let payload = match value {
        Value::Object(mut map) if matches!(map.get("success"), Some(Value::Bool(true))) => {
            match map.remove("data") {
                Some(Value::Null) | None => {
                    return Err(ServiceError::NotFound(format!(
                        "backend returned {} without data",
                        status.as_u16()
                    )))
                }
                Some(data) => data,
            }
        }
        Value::Null => {
            return Err(ServiceError::NotFound(
                "backend returned an empty body".to_string(),
            ))
        }
        other => other,
    };

    Ok(serde_json::from_value(payload)?)
}

fn check_acknowledgement(status: StatusCode, bytes: &[u8]) -> Result<(), ServiceError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => match envelope_failure(&value) {
            Some(message) => Err(ServiceError::BadRequest(message)),
            None => Ok(()),
        },
        // A 2xx with a non-JSON body is still an acknowledgement.
        Err(_) => {
            debug!(status = status.as_u16(), "non-JSON acknowledgement body");
            Ok(())
        }
    }
}
