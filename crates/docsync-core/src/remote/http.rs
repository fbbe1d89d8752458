//! HTTP client for a document sync backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{RemoteDraft, RemoteError, RemoteRecord, RemoteReplica, RemoteResult};
use crate::models::EntityKind;
use crate::monitor::UserId;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// Remote replica reached over a JSON REST API.
///
/// Records live under `{base}/v1/users/{user}/{collection}`.
#[derive(Clone)]
pub struct HttpRemote {
    base_url: Url,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemote")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpRemote {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RemoteError::Network(error.to_string()))?;
        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            timeout,
            client,
        })
    }

    fn collection_url(
        &self,
        user: &UserId,
        kind: EntityKind,
        remote_id: Option<&str>,
    ) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                RemoteError::Api(format!("base URL cannot be a base: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["v1", "users", user.as_str(), kind.collection()]);
            if let Some(remote_id) = remote_id {
                segments.push(remote_id);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> RemoteResult<T> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|error| self.transport_error(&error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| RemoteError::InvalidPayload(error.to_string()))
    }

    fn transport_error(&self, error: &reqwest::Error) -> RemoteError {
        if error.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl RemoteReplica for HttpRemote {
    async fn create(&self, user: &UserId, draft: &RemoteDraft) -> RemoteResult<RemoteRecord> {
        let url = self.collection_url(user, draft.kind, None)?;
        tracing::debug!(kind = %draft.kind, local_id = %draft.local_id, "Creating remote record");
        self.send(self.client.post(url).json(draft)).await
    }

    async fn update_by_id(
        &self,
        user: &UserId,
        kind: EntityKind,
        remote_id: &str,
        fields: &Value,
    ) -> RemoteResult<RemoteRecord> {
        let url = self.collection_url(user, kind, Some(remote_id))?;
        tracing::debug!(%kind, remote_id, "Updating remote record");
        self.send(self.client.patch(url).json(&json!({ "fields": fields })))
            .await
    }

    async fn get_by_id(
        &self,
        user: &UserId,
        kind: EntityKind,
        remote_id: &str,
    ) -> RemoteResult<Option<RemoteRecord>> {
        let url = self.collection_url(user, kind, Some(remote_id))?;
        match self.send(self.client.get(url)).await {
            Ok(record) => Ok(Some(record)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn list(
        &self,
        user: &UserId,
        kind: EntityKind,
        updated_since: Option<i64>,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        let mut url = self.collection_url(user, kind, None)?;
        if let Some(updated_since) = updated_since {
            url.query_pairs_mut()
                .append_pair("updatedSince", &updated_since.to_string());
        }
        let page: ListResponse = self.send(self.client.get(url)).await?;
        Ok(page.records)
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RemoteRecord>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn status_error(status: StatusCode, body: &str) -> RemoteError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::InvalidCredentials(message),
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied(message),
        StatusCode::NOT_FOUND => RemoteError::NotFound(message),
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::QuotaExceeded(message)
        }
        _ => RemoteError::Api(message),
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<Url> {
    let base = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Api("remote URL must not be empty".to_string()))?;
    if !is_http_url(&base) {
        return Err(RemoteError::Api(
            "remote URL must include http:// or https://".to_string(),
        ));
    }
    Url::parse(base.trim_end_matches('/'))
        .map_err(|error| RemoteError::Api(format!("invalid remote URL: {error}")))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::remote::RetryClass;

    fn remote() -> HttpRemote {
        HttpRemote::new(
            "https://sync.example.com/",
            Some("secret-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn base_url_requires_http_scheme() {
        assert!(HttpRemote::new("", None, Duration::from_secs(1)).is_err());
        assert!(HttpRemote::new("sync.example.com", None, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn collection_url_encodes_user_and_id() {
        let url = remote()
            .collection_url(&UserId::new("user 1"), EntityKind::Document, Some("abc"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sync.example.com/v1/users/user%201/documents/abc"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", remote());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_json_message() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"bad_request","message":"title too long"}"#,
        );
        assert_eq!(message, "title too long (400)");
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "  "),
            "HTTP 502".to_string()
        );
    }

    #[test]
    fn status_codes_map_to_retry_classes() {
        let cases = [
            (StatusCode::UNAUTHORIZED, RetryClass::Permanent),
            (StatusCode::FORBIDDEN, RetryClass::Permanent),
            (StatusCode::NOT_FOUND, RetryClass::Permanent),
            (StatusCode::TOO_MANY_REQUESTS, RetryClass::Permanent),
            (StatusCode::SERVICE_UNAVAILABLE, RetryClass::Retryable),
            (StatusCode::INTERNAL_SERVER_ERROR, RetryClass::Retryable),
        ];
        for (status, expected) in cases {
            assert_eq!(status_error(status, "").retry_class(), expected, "{status}");
        }
    }
}
