//! Shared HTTP transport tuning for the provider adapters

use std::time::Duration;

const MIN_INTERVAL: u64 = 30;
const MAX_INTERVAL: u64 = 90;

/// TCP keep-alive probe cadence derived from the configured idle
/// timeout: short enough to detect an idle hang before the upstream
/// closes the connection, infrequent enough to avoid probe churn.
pub fn keep_alive_interval(keep_alive_timeout: u64) -> u64 {
    if keep_alive_timeout <= MIN_INTERVAL {
        return keep_alive_timeout;
    }
    (keep_alive_timeout / 3).clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// HTTP/1.1 client with the connection-reuse knobs the FCM adapters use
pub fn tuned_client(
    timeout_secs: u64,
    keepalive_conns: usize,
    keepalive_timeout: u64,
) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(keepalive_conns)
        .pool_idle_timeout(Duration::from_secs(keepalive_timeout))
        .tcp_keepalive(Duration::from_secs(keep_alive_interval(keepalive_timeout)))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_timeouts_pass_through() {
        assert_eq!(keep_alive_interval(0), 0);
        assert_eq!(keep_alive_interval(10), 10);
        assert_eq!(keep_alive_interval(30), 30);
    }

    #[test]
    fn longer_timeouts_probe_at_a_third_within_bounds() {
        assert_eq!(keep_alive_interval(31), 30);
        assert_eq!(keep_alive_interval(90), 30);
        assert_eq!(keep_alive_interval(120), 40);
        assert_eq!(keep_alive_interval(270), 90);
        assert_eq!(keep_alive_interval(600), 90);
    }

    #[test]
    fn interval_stays_within_the_documented_range() {
        for t in 0..=1000 {
            let interval = keep_alive_interval(t);
            assert!(interval >= t.min(MIN_INTERVAL));
            assert!(interval <= MAX_INTERVAL.max(t.min(MIN_INTERVAL)));
            if t <= MIN_INTERVAL {
                assert_eq!(interval, t);
            }
        }
    }
}
