//! The push envelope carried on the message bus

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BusError, Result};

/// A batched push request in transit on the bus.
///
/// `data` is the Base64 encoding of the same JSON body the HTTP
/// front-end accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message_id: Uuid,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub data: String,
}

impl PushEnvelope {
    /// Wrap raw request bytes for publishing.
    pub fn new(payload: &[u8]) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            published_at: Utc::now(),
            data: STANDARD.encode(payload),
        }
    }

    /// Decode the carried request bytes. An envelope without data is
    /// rejected rather than processed.
    pub fn decode_data(&self) -> Result<Vec<u8>> {
        if self.data.is_empty() {
            return Err(BusError::EmptyData);
        }
        let bytes = STANDARD.decode(&self.data)?;
        if bytes.is_empty() {
            return Err(BusError::EmptyData);
        }
        Ok(bytes)
    }
}
