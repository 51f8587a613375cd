//! Delivery counters and the drain gauge
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


use pushgate_types::Platform;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
struct PlatformStats {
    push_success: AtomicI64,
    push_error: AtomicI64,
}

/// Process-wide delivery counters.
///
/// `pending` counts work items that were accepted into the queue and
/// not yet resolved; it is the drain barrier for the event adapter and
/// shutdown.
pub struct Stats {
    ios: PlatformStats,
    android: PlatformStats,
    pending: AtomicI64,
    drain_notify: Notify,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            ios: PlatformStats::default(),
            android: PlatformStats::default(),
            pending: AtomicI64::new(0),
            drain_notify: Notify::new(),
        }
    }

    /// A work item was accepted for enqueueing.
    pub fn mark_accepted(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// A dispatched attempt finished; count it and release the drain
    /// barrier when it was the last one in flight.
    pub fn mark_result(&self, platform: Platform, ok: bool) {
        let counters = match platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
        };
        if ok {
            counters.push_success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.push_error.fetch_add(1, Ordering::Relaxed);
        }
        self.resolve_pending();
    }

    /// An accepted item will never reach a provider (queue closed,
    /// no adapter for its platform). It leaves the pending gauge
    /// without touching the attempt counters.
    pub fn mark_abandoned(&self) {
        self.resolve_pending();
    }

    fn resolve_pending(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drain_notify.notify_waiters();
        }
    }

    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every accepted work item has been resolved.
    pub async fn drained(&self) {
        loop {
            let notified = self.drain_notify.notified();
            tokio::pin!(notified);
            // register before the check so a wake between the two is not lost
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn snapshot(&self, queue_max: usize, queue_usage: usize) -> StatsSnapshot {
        StatsSnapshot {
            queue_max,
            queue_usage,
            pending: self.pending(),
            ios: PlatformSnapshot {
                push_success: self.ios.push_success.load(Ordering::Relaxed),
                push_error: self.ios.push_error.load(Ordering::Relaxed),
            },
            android: PlatformSnapshot {
                push_success: self.android.push_success.load(Ordering::Relaxed),
                push_error: self.android.push_error.load(Ordering::Relaxed),
            },
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformSnapshot {
    pub push_success: i64,
    pub push_error: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub queue_max: usize,
    pub queue_usage: usize,
    pub pending: i64,
    pub ios: PlatformSnapshot,
    pub android: PlatformSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counters_track_dispatched_attempts() {
        let stats = Stats::new();
        for _ in 0..3 {
            stats.mark_accepted();
        }
        stats.mark_result(Platform::Ios, true);
        stats.mark_result(Platform::Ios, false);
        stats.mark_result(Platform::Android, true);

        let snapshot = stats.snapshot(8192, 0);
        assert_eq!(snapshot.ios.push_success, 1);
        assert_eq!(snapshot.ios.push_error, 1);
        assert_eq!(snapshot.android.push_success, 1);
        assert_eq!(snapshot.android.push_error, 0);
        assert_eq!(
            snapshot.ios.push_success
                + snapshot.ios.push_error
                + snapshot.android.push_success
                + snapshot.android.push_error,
            3
        );
        assert_eq!(snapshot.pending, 0);
    }

    #[tokio::test]
    async fn drained_returns_immediately_when_nothing_pending() {
        let stats = Stats::new();
        stats.drained().await;
    }

    #[tokio::test]
    async fn drained_wakes_after_the_last_result() {
        let stats = Arc::new(Stats::new());
        stats.mark_accepted();
        stats.mark_accepted();

        let waiter = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move { stats.drained().await })
        };
        tokio::task::yield_now().await;

        stats.mark_result(Platform::Ios, true);
        stats.mark_abandoned();

        waiter.await.unwrap();
        assert_eq!(stats.pending(), 0);
    }
}
