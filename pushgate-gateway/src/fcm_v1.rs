//! FCM v1 adapter
//!
//! The v1 API is OAuth-credentialed: a service-account key signs an
//! RS256 assertion, the token endpoint exchanges it for a short-lived
//! access token, and sends carry the token as a bearer. The access
//! token is cached and refreshed inside a safety window before expiry.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

use pushgate_config::AndroidConfig;
use pushgate_types::{Notification, WorkItem};

use crate::provider::{Provider, ProviderError};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Refresh the access token this many seconds before it expires
const EXPIRY_SAFETY_WINDOW: i64 = 300;

fn send_endpoint(project: &str) -> String {
    format!("https://fcm.googleapis.com/v1/projects/{project}/messages:send")
}

/// Service-account credential subset needed for the JWT bearer flow
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl ServiceAccountKey {
    pub fn from_json(json: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(json).map_err(|e| {
            ProviderError::Credentials(format!("invalid service account JSON: {e}"))
        })
    }

    pub fn from_file(path: &str) -> Result<Self, ProviderError> {
        let bytes = fs::read(path)
            .map_err(|e| ProviderError::Credentials(format!("read {path}: {e}")))?;
        Self::from_json(&bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ProviderError> {
        let bytes = STANDARD.decode(encoded).map_err(|e| {
            ProviderError::Credentials(format!("credentials are not valid Base64: {e}"))
        })?;
        Self::from_json(&bytes)
    }

    /// Load per the configured credential form; the inline Base64 form
    /// wins over the path form when both are set.
    pub fn from_config(android: &AndroidConfig) -> Result<Self, ProviderError> {
        if !android.credentials_json_base64.is_empty() {
            return Self::from_base64(&android.credentials_json_base64);
        }
        Self::from_file(&android.credentials_file)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedAccessToken {
    token: String,
    expires_at: i64,
}

/// The v1 downstream message
#[derive(Debug, Serialize)]
pub struct V1Message {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<V1Notification>,
    pub android: V1AndroidConfig,
}

#[derive(Debug, Serialize)]
pub struct V1Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct V1AndroidConfig {
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<V1Notification>,
}

#[derive(Debug, Serialize)]
struct V1Request {
    message: V1Message,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub(crate) fn message_for(notification: &Notification) -> V1Message {
    let data: BTreeMap<String, String> = notification
        .extend
        .iter()
        .map(|extend| (extend.key.clone(), extend.value.clone()))
        .collect();

    let body = non_empty(&notification.body);
    let title = non_empty(&notification.title);

    V1Message {
        token: notification
            .tokens
            .first()
            .cloned()
            .unwrap_or_default(),
        data: (!data.is_empty()).then_some(data),
        notification: Some(V1Notification {
            title: title.clone(),
            body: body.clone(),
        }),
        android: V1AndroidConfig {
            priority: "high".to_string(),
            collapse_key: non_empty(&notification.collapse_key),
            ttl: (notification.time_to_live > 0)
                .then(|| format!("{}s", notification.time_to_live)),
            notification: Some(V1Notification { title, body }),
        },
    }
}

/// FCM v1 client.
///
/// The reqwest client is safe under parallel sends; only the access
/// token cache is mutex-guarded, so a single refresh runs at a time.
pub struct FcmV1Client {
    http: reqwest::Client,
    endpoint: String,
    token_uri: String,
    client_email: String,
    signing_key: EncodingKey,
    access: Mutex<Option<CachedAccessToken>>,
}

impl FcmV1Client {
    pub fn new(android: &AndroidConfig) -> Result<Self, ProviderError> {
        let creds = ServiceAccountKey::from_config(android)?;

        let project = if !android.project.is_empty() {
            android.project.clone()
        } else {
            creds.project_id.clone().ok_or_else(|| {
                ProviderError::Credentials(
                    "no project configured and credentials carry no project_id".to_string(),
                )
            })?
        };

        let signing_key = EncodingKey::from_rsa_pem(creds.private_key.as_bytes())
            .map_err(|e| {
                ProviderError::Credentials(format!("invalid service-account private key: {e}"))
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(android.timeout))
            .build()?;

        Ok(Self {
            http,
            endpoint: send_endpoint(&project),
            token_uri: creds.token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            client_email: creds.client_email,
            signing_key,
            access: Mutex::new(None),
        })
    }

    /// Point the client at different send/token endpoints. Useful for
    /// mocking the upstream in tests.
    pub fn with_endpoints(
        mut self,
        endpoint: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        self.endpoint = endpoint.into();
        self.token_uri = token_uri.into();
        self
    }

    fn assertion(&self, now: i64) -> Result<String, ProviderError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + 3600,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ProviderError::Auth(format!("assertion signing failed: {e}")))
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let now = unix_now();

        let mut cached = self.access.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - EXPIRY_SAFETY_WINDOW > now {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.assertion(now)?;
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("malformed token response: {e}")))?;

        debug!(expires_in = token.expires_in, "exchanged FCM v1 access token");

        *cached = Some(CachedAccessToken {
            token: token.access_token.clone(),
            expires_at: now + token.expires_in,
        });

        Ok(token.access_token)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Provider for FcmV1Client {
    async fn send(&self, item: &WorkItem) -> Result<(), ProviderError> {
        let access_token = self.access_token().await?;

        debug!(id = item.id, token = item.token(), "sending FCM v1 push");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(&V1Request {
                message: message_for(&item.notification),
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "fcm-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushgate_types::ExtendField;

    fn credentials_json() -> String {
        serde_json::json!({
            "type": "service_account",
            "project_id": "demo-project",
            "client_email": "pusher@demo-project.iam.gserviceaccount.com",
            "private_key": include_str!("../testdata/authkey-rsa.p8"),
        })
        .to_string()
    }

    #[test]
    fn parses_credentials_from_base64() {
        let encoded = STANDARD.encode(credentials_json());
        let creds = ServiceAccountKey::from_base64(&encoded).unwrap();
        assert_eq!(creds.project_id.as_deref(), Some("demo-project"));
        assert_eq!(
            creds.client_email,
            "pusher@demo-project.iam.gserviceaccount.com"
        );
        assert!(creds.token_uri.is_none());
    }

    #[test]
    fn client_builds_from_inline_credentials() {
        let android = AndroidConfig {
            enabled: true,
            api_key: "key".to_string(),
            use_v1: true,
            credentials_json_base64: STANDARD.encode(credentials_json()),
            ..Default::default()
        };

        let client = FcmV1Client::new(&android).unwrap();
        assert_eq!(
            client.endpoint,
            "https://fcm.googleapis.com/v1/projects/demo-project/messages:send"
        );
        assert_eq!(client.token_uri, DEFAULT_TOKEN_URI);
    }

    #[test]
    fn configured_project_wins_over_credentials() {
        let android = AndroidConfig {
            enabled: true,
            api_key: "key".to_string(),
            use_v1: true,
            project: "prod-project".to_string(),
            credentials_json_base64: STANDARD.encode(credentials_json()),
            ..Default::default()
        };

        let client = FcmV1Client::new(&android).unwrap();
        assert_eq!(
            client.endpoint,
            "https://fcm.googleapis.com/v1/projects/prod-project/messages:send"
        );
    }

    #[test]
    fn ttl_set_only_when_positive() {
        let mut notification = Notification {
            tokens: vec!["reg-1".to_string()],
            title: "greeting".to_string(),
            body: "hello".to_string(),
            time_to_live: 60,
            ..Default::default()
        };

        let message = message_for(&notification);
        assert_eq!(message.android.ttl.as_deref(), Some("60s"));

        notification.time_to_live = 0;
        let message = message_for(&notification);
        assert!(message.android.ttl.is_none());
    }

    #[test]
    fn message_mirrors_notification_fields() {
        let notification = Notification {
            tokens: vec!["reg-1".to_string()],
            title: "greeting".to_string(),
            body: "hello".to_string(),
            collapse_key: "k".to_string(),
            extend: vec![ExtendField {
                key: "campaign".to_string(),
                value: "spring".to_string(),
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(V1Request {
            message: message_for(&notification),
        })
        .unwrap();

        assert_eq!(json["message"]["token"], "reg-1");
        assert_eq!(json["message"]["data"]["campaign"], "spring");
        assert_eq!(json["message"]["notification"]["title"], "greeting");
        assert_eq!(json["message"]["notification"]["body"], "hello");
        assert_eq!(json["message"]["android"]["priority"], "high");
        assert_eq!(json["message"]["android"]["collapse_key"], "k");
        assert_eq!(json["message"]["android"]["notification"]["title"], "greeting");
    }

    #[test]
    fn empty_extend_omits_the_data_map() {
        let notification = Notification {
            tokens: vec!["reg-1".to_string()],
            title: "greeting".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(V1Request {
            message: message_for(&notification),
        })
        .unwrap();
        assert!(json["message"].get("data").is_none());
    }
}
