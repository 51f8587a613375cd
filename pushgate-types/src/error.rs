//! Error types for pushgate

use thiserror::Error;

/// Reasons a notification is rejected at admission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty token")]
    EmptyToken,

    #[error("invalid platform: {0}")]
    InvalidPlatform(i64),

    #[error("empty message")]
    EmptyMessage,

    #[error("push_type must be alert or background, got {0:?}")]
    InvalidPushType(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;
