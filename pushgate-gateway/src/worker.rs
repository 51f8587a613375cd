//! Worker pool driving provider sends
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


use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use pushgate_types::{Platform, WorkItem};

use crate::access::{self, STATUS_FAILED_PUSH, STATUS_SUCCEEDED_PUSH};
use crate::provider::Provider;
use crate::stats::Stats;

/// Configured upstream per platform tag
pub struct Dispatch {
    pub ios: Option<Arc<dyn Provider>>,
    pub android: Option<Arc<dyn Provider>>,
}

/// `worker_num` long-lived tasks draining the bounded queue. Each
/// worker exits when the queue is closed and empty.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        worker_num: usize,
        receiver: mpsc::Receiver<WorkItem>,
        dispatch: Arc<Dispatch>,
        stats: Arc<Stats>,
    ) -> WorkerPool {
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..worker_num)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let dispatch = Arc::clone(&dispatch);
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    debug!(worker_id, "push worker started");
                    loop {
                        let item = { receiver.lock().await.recv().await };
                        let Some(item) = item else { break };
                        deliver(&dispatch, &stats, item).await;
                    }
                    debug!(worker_id, "push worker stopped");
                })
            })
            .collect();

        WorkerPool { handles }
    }

    /// Wait for every worker to finish. Returns once the queue has been
    /// closed and fully drained.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// One delivery attempt: time it, count it, log it. Never requeues.
async fn deliver(dispatch: &Dispatch, stats: &Stats, item: WorkItem) {
    let Some(platform) = item.platform() else {
        warn!(id = item.id, "work item has no resolvable platform");
        stats.mark_abandoned();
        return;
    };

    let provider = match platform {
        Platform::Ios => dispatch.ios.as_ref(),
        Platform::Android => dispatch.android.as_ref(),
    };
    let Some(provider) = provider else {
        warn!(
            id = item.id,
            platform = platform.as_str(),
            "no provider configured for platform"
        );
        stats.mark_abandoned();
        return;
    };

    let stime = Instant::now();
    let result = provider.send(&item).await;
    let ptime = stime.elapsed().as_secs_f64();

    match result {
        Ok(()) => {
            access::log_push(
                item.id,
                STATUS_SUCCEEDED_PUSH,
                item.token(),
                ptime,
                &item.notification,
                None,
            );
            stats.mark_result(platform, true);
        }
        Err(err) => {
            access::log_push(
                item.id,
                STATUS_FAILED_PUSH,
                item.token(),
                ptime,
                &item.notification,
                Some(&err),
            );
            stats.mark_result(platform, false);
        }
    }
}
