//! Configuration management for pushgate
//!
//! Layering, lowest precedence first: built-in defaults, a TOML
//! configuration file, `PUSHGATE`-prefixed environment variables
//! (`__` section separator, e.g. `PUSHGATE_CORE__PORT`), and finally
//! the command-line flag overlay applied by the binaries.
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


use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

/// Core gateway configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// TCP port the HTTP front-end listens on
    pub port: String,
    /// Number of long-lived push workers
    pub worker_num: usize,
    /// Capacity of the bounded work-item queue
    pub queue_num: usize,
    /// Maximum number of notifications accepted per request
    pub notification_max: usize,
    /// Accept notifications with an empty message field
    pub allows_empty_message: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            port: "1056".to_string(),
            worker_num: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_num: 8192,
            notification_max: 100,
            allows_empty_message: false,
        }
    }
}

/// Log sink configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when RUST_LOG is unset
    pub level: String,
    /// "console" for development, "json" for production
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

/// APNs configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IosConfig {
    pub enabled: bool,
    // Certificate-based provider trust
    pub pem_cert_path: String,
    pub pem_key_path: String,
    pub pem_key_passphrase: String,
    // Token-based provider trust; the inline Base64 form wins over the
    // path form when both are set
    pub token_auth_key_path: String,
    pub token_auth_key_base64: String,
    pub token_auth_key_id: String,
    pub token_auth_team_id: String,
    /// apns-topic header value, usually the app bundle id
    pub topic: String,
    /// Send through api.sandbox.push.apple.com
    pub sandbox: bool,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub keepalive_conns: usize,
    pub keepalive_timeout: u64,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pem_cert_path: String::new(),
            pem_key_path: String::new(),
            pem_key_passphrase: String::new(),
            token_auth_key_path: String::new(),
            token_auth_key_base64: String::new(),
            token_auth_key_id: String::new(),
            token_auth_team_id: String::new(),
            topic: String::new(),
            sandbox: false,
            timeout: 5,
            keepalive_conns: 100,
            keepalive_timeout: 90,
        }
    }
}

impl IosConfig {
    pub fn is_certificate_based(&self) -> bool {
        !self.pem_cert_path.is_empty() && !self.pem_key_path.is_empty()
    }

    pub fn is_token_based(&self) -> bool {
        (!self.token_auth_key_path.is_empty() || !self.token_auth_key_base64.is_empty())
            && !self.token_auth_key_id.is_empty()
            && !self.token_auth_team_id.is_empty()
    }
}

/// FCM configuration (legacy HTTP and v1)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AndroidConfig {
    pub enabled: bool,
    /// Server key for the legacy send endpoint
    pub api_key: String,
    /// Dispatch through the FCM v1 API instead of the legacy endpoint
    pub use_v1: bool,
    // Service-account credentials for v1; the inline Base64 form wins
    // over the path form when both are set
    pub credentials_file: String,
    pub credentials_json_base64: String,
    /// Firebase project id; falls back to the credentials' project_id
    pub project: String,
    /// Per-request timeout in seconds
    pub timeout: u64,
    pub keepalive_conns: usize,
    pub keepalive_timeout: u64,
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            use_v1: false,
            credentials_file: String::new(),
            credentials_json_base64: String::new(),
            project: String::new(),
            timeout: 5,
            keepalive_conns: 100,
            keepalive_timeout: 90,
        }
    }
}

/// Message-bus configuration for the subscriber binary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub url: String,
    pub subject: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject: "pushgate.push".to_string(),
        }
    }
}

/// Application configuration, immutable after startup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub core: CoreConfig,
    pub log: LogConfig,
    pub ios: IosConfig,
    pub android: AndroidConfig,
    pub bus: BusConfig,
}

impl AppConfig {
    /// Load configuration: defaults, then the optional TOML file, then
    /// environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        builder = builder.add_source(Environment::with_prefix("PUSHGATE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Overlay values supplied on the command line. Flags win over both
    /// the file and the environment.
    pub fn apply_flags(
        &mut self,
        port: Option<String>,
        worker_num: Option<usize>,
        queue_num: Option<usize>,
    ) {
        if let Some(port) = port {
            self.core.port = port;
        }
        if let Some(worker_num) = worker_num {
            self.core.worker_num = worker_num;
        }
        if let Some(queue_num) = queue_num {
            self.core.queue_num = queue_num;
        }
    }
}
