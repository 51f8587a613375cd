//! Legacy FCM HTTP adapter
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
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use pushgate_config::AndroidConfig;
use pushgate_types::{Notification, WorkItem};

use crate::provider::{Provider, ProviderError};
use crate::transport::tuned_client;

pub const FCM_SEND_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

/// The legacy downstream message. Work items reach the adapter already
/// narrowed to one token, so the single-recipient `to` field applies.
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_while_idle: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub data: BTreeMap<String, String>,
}

pub(crate) fn message_for(notification: &Notification) -> FcmMessage {
    let mut data = BTreeMap::new();
    data.insert("message".to_string(), notification.message.clone());
    for extend in &notification.extend {
        data.insert(extend.key.clone(), extend.value.clone());
    }

    FcmMessage {
        to: notification
            .tokens
            .first()
            .cloned()
            .unwrap_or_default(),
        collapse_key: (!notification.collapse_key.is_empty())
            .then(|| notification.collapse_key.clone()),
        delay_while_idle: notification.delay_while_idle.then_some(true),
        time_to_live: (notification.time_to_live != 0).then_some(notification.time_to_live),
        priority: (!notification.priority.is_empty()).then(|| notification.priority.clone()),
        data,
    }
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: i64,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

/// Legacy FCM client keyed by the shared server API key
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FcmClient {
    pub fn new(android: &AndroidConfig) -> Result<Self, ProviderError> {
        let http = tuned_client(
            android.timeout,
            android.keepalive_conns,
            android.keepalive_timeout,
        )?;

        Ok(Self {
            http,
            endpoint: FCM_SEND_ENDPOINT.to_string(),
            api_key: android.api_key.clone(),
        })
    }

    /// Point the client at a different endpoint. Useful for mocking the
    /// upstream in tests.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Provider for FcmClient {
    async fn send(&self, item: &WorkItem) -> Result<(), ProviderError> {
        debug!(id = item.id, token = item.token(), "sending legacy FCM push");

        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("key={}", self.api_key))
            .json(&message_for(&item.notification))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        // The legacy endpoint reports per-token rejections in a 200 body.
        let fcm_response: FcmResponse = response.json().await?;
        if fcm_response.failure > 0 {
            let reason = fcm_response
                .results
                .iter()
                .filter_map(|result| result.error.as_deref())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: reason,
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushgate_types::ExtendField;

    #[test]
    fn message_carries_delivery_hints() {
        let notification = Notification {
            tokens: vec!["reg-1".to_string()],
            message: "hi".to_string(),
            collapse_key: "k".to_string(),
            time_to_live: 60,
            ..Default::default()
        };

        let json = serde_json::to_value(message_for(&notification)).unwrap();
        assert_eq!(json["to"], "reg-1");
        assert_eq!(json["data"]["message"], "hi");
        assert_eq!(json["collapse_key"], "k");
        assert_eq!(json["time_to_live"], 60);
        assert!(json.get("delay_while_idle").is_none());
        assert!(json.get("priority").is_none());
    }

    #[test]
    fn default_hints_are_omitted() {
        let notification = Notification {
            tokens: vec!["reg-1".to_string()],
            message: "hi".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(message_for(&notification)).unwrap();
        assert!(json.get("collapse_key").is_none());
        assert!(json.get("time_to_live").is_none());
    }

    #[test]
    fn extend_pairs_join_the_data_payload() {
        let notification = Notification {
            tokens: vec!["reg-1".to_string()],
            message: "hi".to_string(),
            extend: vec![
                ExtendField {
                    key: "campaign".to_string(),
                    value: "spring".to_string(),
                },
                ExtendField {
                    key: "deep_link".to_string(),
                    value: "/offers".to_string(),
                },
            ],
            ..Default::default()
        };

        let message = message_for(&notification);
        assert_eq!(message.data.get("message").unwrap(), "hi");
        assert_eq!(message.data.get("campaign").unwrap(), "spring");
        assert_eq!(message.data.get("deep_link").unwrap(), "/offers");
    }
}
