//! Envelope processing
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


use anyhow::anyhow;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

use pushgate_bus::{BusClient, PushEnvelope};
use pushgate_gateway::Gateway;
use pushgate_types::PushRequest;

/// Bus-driven front-end over the same admission pipeline as HTTP
pub struct Subscriber {
    bus: Arc<dyn BusClient>,
    gateway: Arc<Gateway>,
}

impl Subscriber {
    pub fn new(bus: Arc<dyn BusClient>, gateway: Arc<Gateway>) -> Self {
        Self { bus, gateway }
    }

    /// Consume envelopes until the stream ends. Each envelope is fully
    /// delivered before the next one is taken.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut envelope_stream = self.bus.subscribe();

        info!("Waiting for push envelopes...");

        while let Some(result) = envelope_stream.next().await {
            match result {
                Ok(envelope) => {
                    if let Err(err) = self.process_envelope(&envelope).await {
                        error!(
                            message_id = %envelope.message_id,
                            error = %err,
                            "Failed to process push envelope"
                        );
                    }
                }
                Err(err) => {
                    error!(error = %err, "Error receiving envelope from message bus");
                    // Continue processing - don't crash on individual envelope errors
                }
            }
        }

        warn!("Envelope stream ended");
        Ok(())
    }

    /// Decode, admit, and deliver one envelope. Returns only after the
    /// queue has drained and every accepted work item was attempted, so
    /// the bus caller never acks undelivered work.
    pub async fn process_envelope(&self, envelope: &PushEnvelope) -> anyhow::Result<()> {
        let bytes = envelope.decode_data()?;

        let request: PushRequest = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow!("Request-body is malformed: {}", e))?;

        self.gateway.check_batch(&request.notifications)?;

        info!(
            message_id = %envelope.message_id,
            notifications = request.notifications.len(),
            "Processing push envelope"
        );

        self.gateway
            .enqueue_notifications(request.notifications)
            .await;
        self.gateway.drain().await;

        info!(message_id = %envelope.message_id, "Push envelope drained");

        Ok(())
    }
}
