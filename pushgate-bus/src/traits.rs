//! Traits for message bus operations

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::envelope::PushEnvelope;
use crate::error::BusError;

/// Trait for message bus clients
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish a push envelope to the bus
    async fn publish(&self, envelope: &PushEnvelope) -> Result<(), BusError>;

    /// Subscribe to incoming push envelopes.
    /// Returns a stream of envelopes.
    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = std::result::Result<PushEnvelope, BusError>> + Send + '_>>;

    /// Get the client type name
    fn client_type(&self) -> &str;
}
