//! Error types for message bus operations

use thiserror::Error;

/// Errors that can occur in message bus operations
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Subscribe error: {0}")]
    Subscribe(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Payload decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("envelope carries no data")]
    EmptyData,
}

pub type Result<T> = std::result::Result<T, BusError>;
