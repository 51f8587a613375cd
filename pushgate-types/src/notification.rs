//! Push request schema and work items
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


use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Raw platform tag for Apple devices
pub const PLATFORM_IOS: i64 = 1;
/// Raw platform tag for Android devices
pub const PLATFORM_ANDROID: i64 = 2;

pub const PUSH_TYPE_ALERT: &str = "alert";
pub const PUSH_TYPE_BACKGROUND: &str = "background";

/// Delivery platform, derived from the raw integer tag.
///
/// The raw value is kept on [`Notification`] so that an out-of-range
/// platform fails validation per notification instead of failing the
/// whole batch at JSON parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn from_raw(raw: i64) -> Option<Platform> {
        match raw {
            PLATFORM_IOS => Some(Platform::Ios),
            PLATFORM_ANDROID => Some(Platform::Android),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

/// APNs push type. Absent or empty input resolves to `Alert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushType {
    Alert,
    Background,
}

impl PushType {
    pub fn resolve(raw: &str) -> PushType {
        if raw == PUSH_TYPE_BACKGROUND {
            PushType::Background
        } else {
            PushType::Alert
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PushType::Alert => PUSH_TYPE_ALERT,
            PushType::Background => PUSH_TYPE_BACKGROUND,
        }
    }
}

/// Custom key/value pair attached to the data payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtendField {
    pub key: String,
    #[serde(rename = "val")]
    pub value: String,
}

/// A batched push request as submitted by callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

/// Response body returned by the HTTP front-end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub message: String,
}

/// A single submitted notification, before splitting per token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notification {
    // Common
    #[serde(rename = "token", default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub platform: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifier: String,
    // Android
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub collapse_key: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delay_while_idle: bool,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub time_to_live: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,
    // Android FCM v1
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    // iOS and Android FCM v1
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subtitle: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub push_type: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub badge: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sound: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub content_available: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mutable_content: bool,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub expiry: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extend: Vec<ExtendField>,
    // meta
    #[serde(rename = "seq_id", default, skip_serializing_if = "is_zero_u64")]
    pub id: u64,
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl Notification {
    /// Check the per-notification admission invariants.
    ///
    /// Rejection applies to this notification only; the rest of the
    /// batch proceeds.
    pub fn validate(&self, allows_empty_message: bool) -> Result<(), ValidationError> {
        for token in &self.tokens {
            if token.is_empty() {
                return Err(ValidationError::EmptyToken);
            }
        }

        if Platform::from_raw(self.platform).is_none() {
            return Err(ValidationError::InvalidPlatform(self.platform));
        }

        if !allows_empty_message && self.message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        if !self.push_type.is_empty()
            && self.push_type != PUSH_TYPE_ALERT
            && self.push_type != PUSH_TYPE_BACKGROUND
        {
            return Err(ValidationError::InvalidPushType(self.push_type.clone()));
        }

        Ok(())
    }
}

/// A notification narrowed to exactly one device token, numbered with a
/// process-unique sequence id. The unit of work consumed by a worker.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: u64,
    pub notification: Notification,
}

impl WorkItem {
    /// Narrow `notification` to a single `token` and stamp it with `id`.
    pub fn narrow(notification: &Notification, token: &str, id: u64) -> WorkItem {
        let mut narrowed = notification.clone();
        narrowed.tokens = vec![token.to_string()];
        narrowed.id = id;
        WorkItem {
            id,
            notification: narrowed,
        }
    }

    pub fn token(&self) -> &str {
        self.notification
            .tokens
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn platform(&self) -> Option<Platform> {
        Platform::from_raw(self.notification.platform)
    }
}
