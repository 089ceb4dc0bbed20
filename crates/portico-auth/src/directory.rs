//! API key directory client.
//!
//! API keys live in the identity service. The gateway resolves them with
//! `GET {base}/validate-key/{key}`, which answers:
//!
//! - `200 {status: true, data: <record>}` for a valid key;
//! - `400 {message: "API Key has expired"}` for an expired key;
//! - `400`/`404` with any other message for an unknown key.
//!
//! Everything else (transport errors, timeouts, unexpected statuses, bodies
//! that do not parse) is reported as [`AuthError::DirectoryUnavailable`] so
//! callers can fail closed.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use portico_core::{Principal, TeamId, UserId};

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// Message the identity service uses for expired keys.
const EXPIRED_MESSAGE: &str = "API Key has expired";

/// An API key record as stored by the identity service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    /// Display name of the key.
    pub name: String,
    /// The key value.
    pub key: String,
    /// Id of the user that owns the key.
    pub uuid: String,
    /// Team the key belongs to.
    pub team_id: String,
    /// Origins the key may be used from. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Whether the key is public.
    #[serde(default = "default_is_public")]
    pub is_public: bool,
    /// When the key stops being valid. `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

const fn default_is_public() -> bool {
    true
}

impl ApiKeyRecord {
    /// Whether the key has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Convert the record into a principal.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner or team id is malformed.
    pub fn into_principal(self) -> Result<Principal> {
        let user_id = UserId::new(self.uuid).map_err(|_| AuthError::InvalidUserId)?;
        let team_id = TeamId::new(self.team_id).map_err(|_| AuthError::InvalidTeamId)?;
        Ok(Principal::api_key(
            user_id,
            team_id,
            self.name,
            self.key,
            self.allowed_origins,
            self.is_public,
        ))
    }
}

/// Trait for resolving API keys.
///
/// This trait abstracts the identity service, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Look up and validate an API key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidApiKey` if the key is unknown, `ApiKeyExpired` if it
    /// has expired, and `DirectoryUnavailable` if the lookup itself failed.
    async fn validate_key(&self, key: &str) -> Result<ApiKeyRecord>;
}

/// Successful response body from the validate endpoint.
#[derive(Debug, Deserialize)]
struct ValidateKeyResponse {
    #[serde(default)]
    status: bool,
    data: Option<ApiKeyRecord>,
}

/// Error response body from the validate endpoint.
#[derive(Debug, Deserialize)]
struct ValidateKeyError {
    #[serde(default)]
    message: String,
}

/// HTTP client for the identity service's key validation endpoint.
#[derive(Debug, Clone)]
pub struct HttpKeyDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpKeyDirectory {
    /// Create a directory client from the auth configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.identity_timeout)
            .connect_timeout(config.identity_timeout.min(Duration::from_secs(2)))
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.identity_base_url.clone()))
    }

    /// Create a directory client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn validate_key(&self, key: &str) -> Result<ApiKeyRecord> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AuthError::Internal(format!("invalid identity base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| AuthError::Internal("identity base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["validate-key", key]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::DirectoryUnavailable(format!("request failed: {e}")))?;

        let status = response.status();

        if status.is_success() {
            let body: ValidateKeyResponse = response
                .json()
                .await
                .map_err(|e| AuthError::DirectoryUnavailable(format!("invalid response: {e}")))?;

            return match body.data {
                Some(record) if body.status => Ok(record),
                _ => Err(AuthError::InvalidApiKey),
            };
        }

        match status.as_u16() {
            400 | 404 => {
                let message = response
                    .json::<ValidateKeyError>()
                    .await
                    .map(|e| e.message)
                    .unwrap_or_default();
                if message == EXPIRED_MESSAGE {
                    Err(AuthError::ApiKeyExpired)
                } else {
                    Err(AuthError::InvalidApiKey)
                }
            }
            _ => {
                tracing::warn!(status = %status, "Identity service returned unexpected status");
                Err(AuthError::DirectoryUnavailable(format!("HTTP {status}")))
            }
        }
    }
}

/// An in-memory key directory for testing.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockKeyDirectory {
    records: std::collections::HashMap<String, ApiKeyRecord>,
    unavailable: bool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockKeyDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, keyed by its `key` field.
    #[must_use]
    pub fn with_record(mut self, record: ApiKeyRecord) -> Self {
        self.records.insert(record.key.clone(), record);
        self
    }

    /// Make every lookup fail as if the service were down.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl KeyDirectory for MockKeyDirectory {
    async fn validate_key(&self, key: &str) -> Result<ApiKeyRecord> {
        if self.unavailable {
            return Err(AuthError::DirectoryUnavailable("mock unavailable".to_string()));
        }
        let record = self.records.get(key).ok_or(AuthError::InvalidApiKey)?;
        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::ApiKeyExpired);
        }
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "0b4e7c1a-2f3d-4e5f-8a9b-0c1d2e3f4a5b";

    fn directory(server: &MockServer) -> HttpKeyDirectory {
        HttpKeyDirectory::with_client(reqwest::Client::new(), format!("{}/auth", server.uri()))
    }

    #[tokio::test]
    async fn valid_key_returns_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/auth/validate-key/{KEY}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Api Key is listed successfully",
                "status": true,
                "data": {
                    "_id": "65f1c0ffee0123456789abc0",
                    "name": "ci",
                    "key": KEY,
                    "uuid": "user-1",
                    "teamId": "team-1",
                    "allowedOrigins": ["https://app.example"],
                    "isPublic": false,
                    "expiresAt": "2999-01-01T00:00:00.000Z",
                    "__v": 0
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = directory(&server).validate_key(KEY).await.unwrap();
        assert_eq!(record.team_id, "team-1");
        assert_eq!(record.allowed_origins, vec!["https://app.example".to_string()]);
        assert!(!record.is_public);
        assert!(!record.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn expired_key_maps_to_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "message": "API Key has expired" })),
            )
            .mount(&server)
            .await;

        let err = directory(&server).validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::ApiKeyExpired));
    }

    #[tokio::test]
    async fn unknown_key_maps_to_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid API Key" })),
            )
            .mount(&server)
            .await;

        let err = directory(&server).validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidApiKey));
        assert_eq!(err.http_status_code(), 400);
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = directory(&server).validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
        assert!(err.is_server_fault());
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = directory(&server).validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_directory_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let directory = HttpKeyDirectory::with_client(client, server.uri());

        let err = directory.validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_directory_is_unavailable() {
        // Nothing listens on port 9 on loopback.
        let directory = HttpKeyDirectory::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
        let err = directory.validate_key(KEY).await.unwrap_err();
        assert!(matches!(err, AuthError::DirectoryUnavailable(_)));
    }

    #[test]
    fn record_without_expiry_never_expires() {
        let record: ApiKeyRecord = serde_json::from_value(json!({
            "name": "ci",
            "key": KEY,
            "uuid": "user-1",
            "teamId": "team-1"
        }))
        .unwrap();
        assert!(!record.is_expired_at(Utc::now()));
        assert!(record.is_public);
        assert!(record.allowed_origins.is_empty());
    }

    #[test]
    fn record_into_principal() {
        let record: ApiKeyRecord = serde_json::from_value(json!({
            "name": "ci",
            "key": KEY,
            "uuid": "user-1",
            "teamId": "team-1",
            "allowedOrigins": ["https://a.example"],
            "isPublic": false
        }))
        .unwrap();
        let principal = record.into_principal().unwrap();
        assert_eq!(principal.team_id.as_str(), "team-1");
        assert_eq!(principal.allowed_origins, vec!["https://a.example".to_string()]);
        assert_eq!(principal.key.as_deref(), Some(KEY));
    }

    #[tokio::test]
    async fn mock_directory_checks_expiry() {
        let record: ApiKeyRecord = serde_json::from_value(json!({
            "name": "old",
            "key": KEY,
            "uuid": "user-1",
            "teamId": "team-1",
            "expiresAt": "2000-01-01T00:00:00Z"
        }))
        .unwrap();
        let directory = MockKeyDirectory::new().with_record(record);
        assert!(matches!(
            directory.validate_key(KEY).await,
            Err(AuthError::ApiKeyExpired)
        ));
        assert!(matches!(
            directory.validate_key("other").await,
            Err(AuthError::InvalidApiKey)
        ));
    }
}
