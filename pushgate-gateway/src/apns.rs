//! APNs HTTP/2 adapter
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
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pushgate_config::IosConfig;
use pushgate_types::{Notification, PushType, WorkItem};

use crate::provider::{Provider, ProviderError};
use crate::token::ProviderToken;
use crate::transport::keep_alive_interval;

pub const APNS_PRODUCTION: &str = "https://api.push.apple.com";
pub const APNS_SANDBOX: &str = "https://api.sandbox.push.apple.com";

/// Per-request APNs control headers. An omitted optional field results
/// in an absent header, deferring to the APNs default.
#[derive(Debug)]
pub struct ApnsHeaders {
    /// Notification id; Apple generates one when omitted
    pub id: String,
    /// Replaces an earlier notification with the same id
    pub collapse_id: String,
    /// Topic, usually the app bundle id
    pub topic: String,
    /// UNIX seconds; Apple retries delivery until this time
    pub expiration: i64,
    /// Sends apns-priority 5; when false the header is omitted and the
    /// server defaults to 10
    pub low_priority: bool,
    pub push_type: PushType,
    /// Provider-token bearer; only set for the token-based flavor
    pub bearer: Option<String>,
}

impl Default for ApnsHeaders {
    fn default() -> Self {
        Self {
            id: String::new(),
            collapse_id: String::new(),
            topic: String::new(),
            expiration: 0,
            low_priority: false,
            push_type: PushType::Alert,
            bearer: None,
        }
    }
}

impl ApnsHeaders {
    pub fn from_notification(
        notification: &Notification,
        topic: &str,
        bearer: Option<String>,
    ) -> Self {
        Self {
            id: notification.identifier.clone(),
            topic: topic.to_string(),
            expiration: notification.expiry,
            push_type: PushType::resolve(&notification.push_type),
            bearer,
            ..Default::default()
        }
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();

        if !self.id.is_empty() {
            headers.insert("apns-id", HeaderValue::from_str(&self.id)?);
        }
        if !self.collapse_id.is_empty() {
            headers.insert("apns-collapse-id", HeaderValue::from_str(&self.collapse_id)?);
        }
        if !self.topic.is_empty() {
            headers.insert("apns-topic", HeaderValue::from_str(&self.topic)?);
        }
        if self.expiration != 0 {
            headers.insert(
                "apns-expiration",
                HeaderValue::from_str(&self.expiration.to_string())?,
            );
        }
        if self.low_priority {
            headers.insert("apns-priority", HeaderValue::from_static("5"));
        }
        headers.insert(
            "apns-push-type",
            HeaderValue::from_static(self.push_type.as_str()),
        );
        if let Some(bearer) = &self.bearer {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("bearer {bearer}"))?);
        }

        Ok(headers)
    }
}

#[derive(Serialize)]
struct ApsAlert {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

#[derive(Serialize)]
struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    alert: Option<ApsAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<String>,
    #[serde(rename = "content-available", skip_serializing_if = "Option::is_none")]
    content_available: Option<u8>,
    #[serde(rename = "mutable-content", skip_serializing_if = "Option::is_none")]
    mutable_content: Option<u8>,
}

#[derive(Serialize)]
struct ApnsPayload {
    aps: Aps,
    #[serde(flatten)]
    custom: BTreeMap<String, String>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn payload_for(notification: &Notification) -> ApnsPayload {
    let alert = if notification.title.is_empty()
        && notification.subtitle.is_empty()
        && notification.message.is_empty()
    {
        None
    } else {
        Some(ApsAlert {
            title: non_empty(&notification.title),
            subtitle: non_empty(&notification.subtitle),
            body: non_empty(&notification.message),
        })
    };

    let custom = notification
        .extend
        .iter()
        .map(|extend| (extend.key.clone(), extend.value.clone()))
        .collect();

    ApnsPayload {
        aps: Aps {
            alert,
            badge: (notification.badge != 0).then_some(notification.badge),
            category: non_empty(&notification.category),
            sound: non_empty(&notification.sound),
            content_available: notification.content_available.then_some(1),
            mutable_content: notification.mutable_content.then_some(1),
        },
        custom,
    }
}

enum ApnsAuth {
    Certificate,
    Token(Arc<ProviderToken>),
}

/// APNs HTTP/2 client, certificate-based or provider-token-based
pub struct ApnsClient {
    http: reqwest::Client,
    endpoint: String,
    topic: String,
    auth: ApnsAuth,
}

impl ApnsClient {
    /// Certificate-based provider trust: PEM certificate and key files.
    pub fn from_certificate(ios: &IosConfig) -> Result<Self, ProviderError> {
        if !ios.pem_key_passphrase.is_empty() {
            return Err(ProviderError::Credentials(
                "encrypted PEM keys are not supported; provide an unencrypted key".to_string(),
            ));
        }

        let mut pem_bundle = fs::read(&ios.pem_cert_path).map_err(|e| {
            ProviderError::Credentials(format!("read {}: {}", ios.pem_cert_path, e))
        })?;
        pem_bundle.extend(fs::read(&ios.pem_key_path).map_err(|e| {
            ProviderError::Credentials(format!("read {}: {}", ios.pem_key_path, e))
        })?);

        let identity = reqwest::Identity::from_pem(&pem_bundle)?;
        let http = Self::http2_builder(ios).identity(identity).build()?;

        Ok(Self {
            http,
            endpoint: endpoint_for(ios).to_string(),
            topic: ios.topic.clone(),
            auth: ApnsAuth::Certificate,
        })
    }

    /// Token-based provider trust: shares the provider token, refreshed
    /// per request when expired.
    pub fn from_provider_token(
        ios: &IosConfig,
        token: Arc<ProviderToken>,
    ) -> Result<Self, ProviderError> {
        let http = Self::http2_builder(ios).build()?;

        Ok(Self {
            http,
            endpoint: endpoint_for(ios).to_string(),
            topic: ios.topic.clone(),
            auth: ApnsAuth::Token(token),
        })
    }

    /// Point the client at a different endpoint. Useful for mocking the
    /// upstream in tests.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn http2_builder(ios: &IosConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .use_rustls_tls()
            .http2_prior_knowledge()
            .timeout(Duration::from_secs(ios.timeout))
            .pool_max_idle_per_host(ios.keepalive_conns)
            .pool_idle_timeout(Duration::from_secs(ios.keepalive_timeout))
            .tcp_keepalive(Duration::from_secs(keep_alive_interval(ios.keepalive_timeout)))
    }
}

fn endpoint_for(ios: &IosConfig) -> &'static str {
    if ios.sandbox {
        APNS_SANDBOX
    } else {
        APNS_PRODUCTION
    }
}

#[async_trait]
impl Provider for ApnsClient {
    async fn send(&self, item: &WorkItem) -> Result<(), ProviderError> {
        let token = item.token();

        let bearer = match &self.auth {
            ApnsAuth::Certificate => None,
            ApnsAuth::Token(provider_token) => Some(provider_token.bearer_if_expired()?),
        };

        let headers =
            ApnsHeaders::from_notification(&item.notification, &self.topic, bearer).to_header_map()?;
        let url = format!("{}/3/device/{}", self.endpoint, token);

        debug!(id = item.id, token, "sending APNs push");

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&payload_for(&item.notification))
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
        "apns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushgate_types::ExtendField;

    #[test]
    fn omitted_optional_fields_leave_headers_absent() {
        let headers = ApnsHeaders::default().to_header_map().unwrap();

        assert!(headers.get("apns-id").is_none());
        assert!(headers.get("apns-collapse-id").is_none());
        assert!(headers.get("apns-topic").is_none());
        assert!(headers.get("apns-expiration").is_none());
        assert!(headers.get("apns-priority").is_none());
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get("apns-push-type").unwrap(), "alert");
    }

    #[test]
    fn set_fields_become_headers() {
        let headers = ApnsHeaders {
            id: "4db8e2b1".to_string(),
            collapse_id: "game-score".to_string(),
            topic: "com.example.app".to_string(),
            expiration: 1735689600,
            low_priority: true,
            push_type: PushType::Background,
            bearer: Some("sometoken".to_string()),
        }
        .to_header_map()
        .unwrap();

        assert_eq!(headers.get("apns-id").unwrap(), "4db8e2b1");
        assert_eq!(headers.get("apns-collapse-id").unwrap(), "game-score");
        assert_eq!(headers.get("apns-topic").unwrap(), "com.example.app");
        assert_eq!(headers.get("apns-expiration").unwrap(), "1735689600");
        assert_eq!(headers.get("apns-priority").unwrap(), "5");
        assert_eq!(headers.get("apns-push-type").unwrap(), "background");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "bearer sometoken");
    }

    #[test]
    fn push_type_header_defaults_to_alert() {
        for raw in ["", "alert"] {
            let notification = Notification {
                push_type: raw.to_string(),
                ..Default::default()
            };
            let headers = ApnsHeaders::from_notification(&notification, "", None);
            assert_eq!(headers.push_type, PushType::Alert);
        }

        let notification = Notification {
            push_type: "background".to_string(),
            ..Default::default()
        };
        let headers = ApnsHeaders::from_notification(&notification, "", None);
        assert_eq!(headers.push_type, PushType::Background);
    }

    #[test]
    fn payload_carries_alert_and_custom_data() {
        let notification = Notification {
            message: "hi".to_string(),
            title: "greeting".to_string(),
            badge: 3,
            sound: "default".to_string(),
            mutable_content: true,
            extend: vec![ExtendField {
                key: "campaign".to_string(),
                value: "spring".to_string(),
            }],
            ..Default::default()
        };

        let json = serde_json::to_value(payload_for(&notification)).unwrap();
        assert_eq!(json["aps"]["alert"]["title"], "greeting");
        assert_eq!(json["aps"]["alert"]["body"], "hi");
        assert!(json["aps"]["alert"].get("subtitle").is_none());
        assert_eq!(json["aps"]["badge"], 3);
        assert_eq!(json["aps"]["sound"], "default");
        assert_eq!(json["aps"]["mutable-content"], 1);
        assert!(json["aps"].get("content-available").is_none());
        assert_eq!(json["campaign"], "spring");
    }

    #[test]
    fn silent_payload_has_no_alert() {
        let notification = Notification {
            content_available: true,
            push_type: "background".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(payload_for(&notification)).unwrap();
        assert!(json["aps"].get("alert").is_none());
        assert_eq!(json["aps"]["content-available"], 1);
    }

    #[test]
    fn certificate_flavor_loads_pem_material() {
        let ios = IosConfig {
            enabled: true,
            pem_cert_path: "testdata/apns-cert.pem".to_string(),
            pem_key_path: "testdata/apns-key.pem".to_string(),
            ..Default::default()
        };
        assert!(ApnsClient::from_certificate(&ios).is_ok());
    }

    #[test]
    fn passphrase_protected_keys_are_rejected() {
        let ios = IosConfig {
            enabled: true,
            pem_cert_path: "testdata/apns-cert.pem".to_string(),
            pem_key_path: "testdata/apns-key.pem".to_string(),
            pem_key_passphrase: "secret".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ApnsClient::from_certificate(&ios),
            Err(ProviderError::Credentials(_))
        ));
    }
}
