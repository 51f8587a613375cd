//! NATS implementation of the bus client
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
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info};

use crate::envelope::PushEnvelope;
use crate::error::{BusError, Result};
use crate::traits::BusClient;

/// NATS message bus client bound to a single push subject
pub struct NatsBus {
    client: Arc<async_nats::Client>,
    subject: String,
}

impl NatsBus {
    /// Connect to a NATS server
    pub async fn new(url: &str, subject: &str) -> Result<Self> {
        info!(url = url, subject = subject, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        info!(subject = subject, "NATS client initialized");

        Ok(Self {
            client: Arc::new(client),
            subject: subject.to_string(),
        })
    }
}

#[async_trait]
impl BusClient for NatsBus {
    async fn publish(&self, envelope: &PushEnvelope) -> Result<()> {
        let payload = serde_json::to_vec(envelope).map_err(BusError::Serialization)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        info!(
            message_id = %envelope.message_id,
            subject = self.subject,
            "Envelope published"
        );

        Ok(())
    }

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Stream<Item = std::result::Result<PushEnvelope, BusError>> + Send + '_>> {
        let subject = self.subject.clone();

        info!(subject = subject, "Subscribing to push envelopes");

        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<PushEnvelope, BusError>>(100);
        let client = Arc::clone(&self.client);

        // Spawn a task to handle the subscription
        tokio::spawn(async move {
            match client.subscribe(subject.clone()).await {
                Ok(mut subscriber) => {
                    info!(subject = subject, "Subscription created, waiting for envelopes");

                    while let Some(nats_msg) = subscriber.next().await {
                        match serde_json::from_slice::<PushEnvelope>(&nats_msg.payload) {
                            Ok(envelope) => {
                                if tx.send(Ok(envelope)).await.is_err() {
                                    error!("Receiver dropped, stopping subscription");
                                    break;
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to deserialize envelope");
                                let _ = tx.send(Err(BusError::Serialization(e))).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to create subscription");
                    let _ = tx.send(Err(BusError::Subscribe(e.to_string()))).await;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_publish_and_subscribe() {
        let bus = NatsBus::new("nats://localhost:4222", "pushgate.push.test")
            .await
            .unwrap();

        let envelope = PushEnvelope::new(br#"{"notifications":[]}"#);

        let mut stream = bus.subscribe();
        bus.publish(&envelope).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.message_id, envelope.message_id);
    }
}
