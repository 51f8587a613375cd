//! Per-attempt delivery access log
//!
//! One line per work item per stage, under [`ACCESS_TARGET`] so the
//! subscriber can filter the access log apart from diagnostics.

use pushgate_logging::ACCESS_TARGET;
use pushgate_types::Notification;
use tracing::{error, info};

pub const STATUS_ACCEPTED_PUSH: &str = "accepted-push";
pub const STATUS_DISABLED_PUSH: &str = "disabled-push";
pub const STATUS_SUCCEEDED_PUSH: &str = "succeeded-push";
pub const STATUS_FAILED_PUSH: &str = "failed-push";

/// Emit one access-log line for a delivery stage. Failed attempts log
/// at error level, everything else at info.
pub fn log_push(
    id: u64,
    status: &str,
    token: &str,
    ptime: f64,
    notification: &Notification,
    err: Option<&dyn std::fmt::Display>,
) {
    let request = serde_json::to_string(notification).unwrap_or_default();

    match err {
        Some(err) => error!(
            target: ACCESS_TARGET,
            id,
            status,
            token,
            ptime,
            request,
            error = %err,
            "push"
        ),
        None => info!(
            target: ACCESS_TARGET,
            id,
            status,
            token,
            ptime,
            request,
            "push"
        ),
    }
}
