//! Gateway lifecycle and admission
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


use anyhow::{bail, Context};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use pushgate_config::AppConfig;
use pushgate_types::{Notification, Platform, WorkItem};

use crate::access::{self, STATUS_ACCEPTED_PUSH, STATUS_DISABLED_PUSH};
use crate::apns::ApnsClient;
use crate::fcm::FcmClient;
use crate::fcm_v1::FcmV1Client;
use crate::provider::Provider;
use crate::stats::{Stats, StatsSnapshot};
use crate::token::{self, ProviderToken};
use crate::worker::{Dispatch, WorkerPool};

/// Batch-level rejections, before any notification is admitted
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AdmitError {
    #[error("empty notification")]
    Empty,

    #[error("number of notifications({count}) over limit({max})")]
    TooMany { count: usize, max: usize },
}

/// The gateway context threaded through the front-ends: configuration,
/// stats, the sequence counter, the queue, and the worker pool. Built
/// once at startup, immutable thereafter.
pub struct Gateway {
    config: AppConfig,
    stats: Arc<Stats>,
    seq: AtomicU64,
    sender: Mutex<Option<mpsc::Sender<WorkItem>>>,
    workers: Mutex<Option<WorkerPool>>,
}

impl Gateway {
    /// Build the provider adapters from configuration and start the
    /// pipeline. Every failure here is fatal to startup.
    pub fn init(config: AppConfig) -> anyhow::Result<Gateway> {
        if !config.ios.enabled && !config.android.enabled {
            bail!("no platform has been enabled");
        }

        let dispatch = build_dispatch(&config)?;
        Ok(Gateway::with_dispatch(config, dispatch))
    }

    /// Start the pipeline with an explicit dispatch table. Entry point
    /// for embedders supplying their own providers.
    pub fn with_dispatch(config: AppConfig, dispatch: Dispatch) -> Gateway {
        let stats = Arc::new(Stats::new());
        let (sender, receiver) = mpsc::channel(config.core.queue_num);
        let workers = WorkerPool::spawn(
            config.core.worker_num,
            receiver,
            Arc::new(dispatch),
            Arc::clone(&stats),
        );

        info!(
            workers = config.core.worker_num,
            queue = config.core.queue_num,
            "push pipeline started"
        );

        Gateway {
            config,
            stats,
            seq: AtomicU64::new(0),
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Some(workers)),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Batch-level size checks, applied by both front-ends before
    /// admission.
    pub fn check_batch(&self, notifications: &[Notification]) -> Result<(), AdmitError> {
        if notifications.is_empty() {
            return Err(AdmitError::Empty);
        }
        let max = self.config.core.notification_max;
        if notifications.len() > max {
            return Err(AdmitError::TooMany {
                count: notifications.len(),
                max,
            });
        }
        Ok(())
    }

    /// Validate, split per token, number, and enqueue. Invalid
    /// notifications are logged and skipped; the rest of the batch
    /// proceeds. Blocks when the queue is full; that backpressure is
    /// the admission-control knob.
    pub async fn enqueue_notifications(&self, notifications: Vec<Notification>) {
        let Some(sender) = self.sender_snapshot() else {
            error!("queue is closed; dropping batch");
            return;
        };

        for notification in notifications {
            if let Err(err) = notification.validate(self.config.core.allows_empty_message) {
                error!(error = %err, "invalid notification");
                continue;
            }

            let enabled_push = match Platform::from_raw(notification.platform) {
                Some(Platform::Ios) => self.config.ios.enabled,
                Some(Platform::Android) => self.config.android.enabled,
                None => false,
            };

            for token in notification.tokens.clone() {
                let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
                let item = WorkItem::narrow(&notification, &token, id);

                if enabled_push {
                    access::log_push(id, STATUS_ACCEPTED_PUSH, &token, 0.0, &item.notification, None);
                    self.stats.mark_accepted();
                    if sender.send(item).await.is_err() {
                        self.stats.mark_abandoned();
                        error!(id, "queue closed while enqueuing");
                        return;
                    }
                } else {
                    access::log_push(id, STATUS_DISABLED_PUSH, &token, 0.0, &item.notification, None);
                }
            }
        }
    }

    /// Wait until every accepted work item has been attempted.
    pub async fn drain(&self) {
        self.stats.drained().await;
    }

    /// Close the queue and wait for producers, then workers, to finish.
    pub async fn shutdown(&self) {
        {
            let mut sender = lock_recovering(&self.sender);
            sender.take();
        }

        let workers = lock_recovering(&self.workers).take();
        if let Some(workers) = workers {
            workers.join().await;
        }

        info!("push pipeline stopped");
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        let (queue_max, queue_usage) = match lock_recovering(&self.sender).as_ref() {
            Some(sender) => (
                sender.max_capacity(),
                sender.max_capacity() - sender.capacity(),
            ),
            None => (self.config.core.queue_num, 0),
        };
        self.stats.snapshot(queue_max, queue_usage)
    }

    fn sender_snapshot(&self) -> Option<mpsc::Sender<WorkItem>> {
        lock_recovering(&self.sender).clone()
    }
}

fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn build_dispatch(config: &AppConfig) -> anyhow::Result<Dispatch> {
    let mut ios: Option<Arc<dyn Provider>> = None;
    if config.ios.enabled {
        if config.ios.is_certificate_based() && config.ios.is_token_based() {
            bail!("you can use only one of certificate-based or token-based provider trust");
        }

        if config.ios.is_certificate_based() {
            let client = ApnsClient::from_certificate(&config.ios)
                .context("failed to init http client for APNs")?;
            ios = Some(Arc::new(client));
        } else if config.ios.is_token_based() {
            let auth_key = token::auth_key_from_config(&config.ios)
                .context("the auth key for iOS was not loading")?;
            let provider_token = Arc::new(ProviderToken::new(
                auth_key,
                config.ios.token_auth_key_id.clone(),
                config.ios.token_auth_team_id.clone(),
            ));
            let client = ApnsClient::from_provider_token(&config.ios, provider_token)
                .context("failed to init http client for APNs")?;
            ios = Some(Arc::new(client));
        } else {
            bail!("the certificate files or the auth key for iOS were not found");
        }
    }

    let mut android: Option<Arc<dyn Provider>> = None;
    if config.android.enabled {
        if config.android.api_key.is_empty() {
            bail!("the api key for Android cannot be empty");
        }

        if config.android.use_v1 {
            let client =
                FcmV1Client::new(&config.android).context("failed to init fcm v1 client")?;
            android = Some(Arc::new(client));
        } else {
            let client = FcmClient::new(&config.android).context("failed to init fcm client")?;
            android = Some(Arc::new(client));
        }
    }

    Ok(Dispatch { ios, android })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, ProviderError};
    use async_trait::async_trait;
    use pushgate_types::PLATFORM_IOS;

    struct RecordingProvider {
        items: Mutex<Vec<WorkItem>>,
        fail: bool,
    }

    impl RecordingProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn recorded(&self) -> Vec<WorkItem> {
            self.items.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        async fn send(&self, item: &WorkItem) -> Result<(), ProviderError> {
            self.items.lock().unwrap().push(item.clone());
            if self.fail {
                Err(ProviderError::Upstream {
                    status: 400,
                    body: "BadDeviceToken".to_string(),
                })
            } else {
                Ok(())
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn ios_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ios.enabled = true;
        config.core.worker_num = 2;
        config.core.queue_num = 16;
        config
    }

    fn notification(tokens: &[&str], platform: i64) -> Notification {
        Notification {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            platform,
            message: "hi".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn batch_size_limits() {
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: None,
                android: None,
            },
        );

        assert_eq!(gateway.check_batch(&[]), Err(AdmitError::Empty));

        let max = gateway.config().core.notification_max;
        let at_limit: Vec<Notification> =
            (0..max).map(|_| notification(&["t"], PLATFORM_IOS)).collect();
        assert_eq!(gateway.check_batch(&at_limit), Ok(()));

        let over: Vec<Notification> = (0..max + 1)
            .map(|_| notification(&["t"], PLATFORM_IOS))
            .collect();
        assert_eq!(
            gateway.check_batch(&over),
            Err(AdmitError::TooMany {
                count: max + 1,
                max
            })
        );
    }

    #[tokio::test]
    async fn splits_per_token_with_increasing_ids() {
        let provider = RecordingProvider::new(false);
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: Some(provider.clone()),
                android: None,
            },
        );

        gateway
            .enqueue_notifications(vec![notification(&["t1", "t2"], PLATFORM_IOS)])
            .await;
        gateway.drain().await;

        let mut items = provider.recorded();
        items.sort_by_key(|item| item.id);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].notification.tokens.len(), 1);
        assert_eq!(items[1].notification.tokens.len(), 1);
        assert!(items[0].id > 0);
        assert_eq!(items[1].id, items[0].id + 1);
        assert_eq!(items[0].token(), "t1");
        assert_eq!(items[1].token(), "t2");

        let snapshot = gateway.stats_snapshot();
        assert_eq!(snapshot.ios.push_success, 2);
        assert_eq!(snapshot.ios.push_error, 0);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test]
    async fn invalid_notifications_are_skipped_not_fatal() {
        let provider = RecordingProvider::new(false);
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: Some(provider.clone()),
                android: None,
            },
        );

        gateway
            .enqueue_notifications(vec![
                notification(&[""], PLATFORM_IOS),
                notification(&["ok"], PLATFORM_IOS),
            ])
            .await;
        gateway.drain().await;

        let items = provider.recorded();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].token(), "ok");
    }

    #[tokio::test]
    async fn disabled_platform_drops_without_dispatch() {
        let provider = RecordingProvider::new(false);
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: Some(provider.clone()),
                android: None,
            },
        );

        gateway
            .enqueue_notifications(vec![notification(&["droid"], 2)])
            .await;
        gateway.drain().await;

        assert!(provider.recorded().is_empty());
        let snapshot = gateway.stats_snapshot();
        assert_eq!(snapshot.android.push_success, 0);
        assert_eq!(snapshot.android.push_error, 0);
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test]
    async fn failed_attempts_are_counted_not_retried() {
        let provider = RecordingProvider::new(true);
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: Some(provider.clone()),
                android: None,
            },
        );

        gateway
            .enqueue_notifications(vec![notification(&["bad"], PLATFORM_IOS)])
            .await;
        gateway.drain().await;

        assert_eq!(provider.recorded().len(), 1);
        let snapshot = gateway.stats_snapshot();
        assert_eq!(snapshot.ios.push_error, 1);
        assert_eq!(snapshot.ios.push_success, 0);
    }

    #[tokio::test]
    async fn shutdown_joins_workers_after_draining() {
        let provider = RecordingProvider::new(false);
        let gateway = Gateway::with_dispatch(
            ios_config(),
            Dispatch {
                ios: Some(provider.clone()),
                android: None,
            },
        );

        gateway
            .enqueue_notifications(vec![notification(&["t1", "t2", "t3"], PLATFORM_IOS)])
            .await;
        gateway.shutdown().await;

        assert_eq!(provider.recorded().len(), 3);
        // the queue is closed afterwards
        gateway
            .enqueue_notifications(vec![notification(&["late"], PLATFORM_IOS)])
            .await;
        assert_eq!(provider.recorded().len(), 3);
    }
}
