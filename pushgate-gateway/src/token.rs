//! APNs provider authentication token
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


use base64::{engine::general_purpose::STANDARD, Engine as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pushgate_config::IosConfig;
use serde::Serialize;
use std::fs;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// The period of time in seconds that a provider token is served for.
/// APNs rejects pushes whose token was issued more than an hour ago;
/// refreshing at 50 minutes stays clear of boundary rejects.
pub const TOKEN_TIMEOUT: i64 = 3000;

/// Errors when loading a .p8 auth key or signing a bearer
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("auth key must be a valid .p8 PEM file")]
    NotPem,

    #[error("auth key must be an ECDSA private key")]
    NotEcdsa,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("auth key is not valid Base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("bearer signing failed: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("token state lock poisoned")]
    Poisoned,
}

/// Load the ES256 signing key per the configured credential form; the
/// inline Base64 form wins over the path form when both are set.
pub fn auth_key_from_config(ios: &IosConfig) -> Result<EncodingKey, TokenError> {
    if !ios.token_auth_key_base64.is_empty() {
        return auth_key_from_base64(&ios.token_auth_key_base64);
    }
    auth_key_from_file(&ios.token_auth_key_path)
}

/// Load a .p8 key from a local file
pub fn auth_key_from_file(path: &str) -> Result<EncodingKey, TokenError> {
    let bytes = fs::read(path)?;
    auth_key_from_bytes(&bytes)
}

/// Load a .p8 key from its Base64 encoding
pub fn auth_key_from_base64(encoded: &str) -> Result<EncodingKey, TokenError> {
    let bytes = STANDARD.decode(encoded)?;
    auth_key_from_bytes(&bytes)
}

/// Load a .p8 key from an in-memory byte slice
pub fn auth_key_from_bytes(bytes: &[u8]) -> Result<EncodingKey, TokenError> {
    if pem::parse(bytes).is_err() {
        return Err(TokenError::NotPem);
    }
    EncodingKey::from_ec_pem(bytes).map_err(|_| TokenError::NotEcdsa)
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

struct TokenState {
    issued_at: i64,
    bearer: String,
}

/// An Apple provider authentication token.
///
/// `bearer` is always consistent with `issued_at`; both are replaced
/// atomically under the mutex on refresh.
pub struct ProviderToken {
    auth_key: EncodingKey,
    key_id: String,
    team_id: String,
    state: Mutex<TokenState>,
}

impl ProviderToken {
    pub fn new(auth_key: EncodingKey, key_id: String, team_id: String) -> Self {
        Self {
            auth_key,
            key_id,
            team_id,
            state: Mutex::new(TokenState {
                issued_at: 0,
                bearer: String::new(),
            }),
        }
    }

    /// Return the current bearer, signing a fresh one first when the
    /// cached one has expired. A failed signing attempt propagates and
    /// fails the send that needed the bearer; no stale bearer is served.
    pub fn bearer_if_expired(&self) -> Result<String, TokenError> {
        let mut state = self.state.lock().map_err(|_| TokenError::Poisoned)?;

        if expired_at(state.issued_at, unix_now()) {
            let issued_at = unix_now();

            let mut header = Header::new(Algorithm::ES256);
            header.kid = Some(self.key_id.clone());

            let claims = Claims {
                iss: &self.team_id,
                iat: issued_at,
            };

            let bearer = encode(&header, &claims, &self.auth_key)?;
            state.issued_at = issued_at;
            state.bearer = bearer;

            debug!(key_id = self.key_id, "signed new provider token bearer");
        }

        Ok(state.bearer.clone())
    }

    /// UNIX seconds of the last successful signing
    pub fn issued_at(&self) -> i64 {
        self.state.lock().map(|s| s.issued_at).unwrap_or(0)
    }

    /// Whether the cached bearer is past its serving window
    pub fn expired(&self) -> bool {
        expired_at(self.issued_at(), unix_now())
    }

    #[cfg(test)]
    fn force_issued_at(&self, issued_at: i64) {
        if let Ok(mut state) = self.state.lock() {
            state.issued_at = issued_at;
        }
    }
}

fn expired_at(issued_at: i64, now: i64) -> bool {
    now >= issued_at + TOKEN_TIMEOUT
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
