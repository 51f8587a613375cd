//! The capability every upstream adapter exposes to the worker pool

use async_trait::async_trait;
use pushgate_types::WorkItem;
use thiserror::Error;

use crate::token::TokenError;

/// Errors from a single delivery attempt or adapter construction
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("upstream rejected push ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("credentials error: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Auth(String),
}

/// A push upstream. Workers dispatch by platform tag through this
/// trait without referring to concrete adapter types.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Attempt delivery of one work item. A single attempt; the caller
    /// never requeues.
    async fn send(&self, item: &WorkItem) -> Result<(), ProviderError>;

    fn name(&self) -> &'static str;
}
