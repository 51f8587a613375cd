//! HTTP front-end
//!
//! `POST /push` accepts a batched push request and returns as soon as
//! admission is dispatched; delivery outcome is observable through the
//! access log and `GET /stat/app`, not the response.
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


use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use pushgate_types::{PushRequest, PushResponse};

use crate::gateway::Gateway;

pub const SERVER_NAME: &str = "pushgate";

fn server_header() -> String {
    format!("{}/{}", SERVER_NAME, env!("CARGO_PKG_VERSION"))
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/push", any(push_handler))
        .route("/health", get(health_handler))
        .route("/stat/app", get(stats_handler))
        .with_state(gateway)
}

/// Serve the front-end until a shutdown signal arrives, then close the
/// queue and wait for in-flight deliveries.
pub async fn serve(gateway: Arc<Gateway>, listener: TcpListener) -> anyhow::Result<()> {
    let app = router(Arc::clone(&gateway));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("http server error: {}", e))?;

    info!("front-end stopped, draining");
    gateway.shutdown().await;
    Ok(())
}

async fn push_handler(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    if request.method() != Method::POST {
        return respond("method must be POST", StatusCode::BAD_REQUEST);
    }

    let body = match to_bytes(request.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(_) => return respond("failed to read request-body", StatusCode::INTERNAL_SERVER_ERROR),
    };
    if body.is_empty() {
        return respond("request body is empty", StatusCode::BAD_REQUEST);
    }

    let push_request: PushRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "malformed push request");
            return respond("Request-body is malformed", StatusCode::BAD_REQUEST);
        }
    };

    if let Err(err) = gateway.check_batch(&push_request.notifications) {
        error!(error = %err, "rejected push request");
        return respond(&err.to_string(), StatusCode::BAD_REQUEST);
    }

    // Admission runs detached; the response never waits on queue capacity.
    tokio::spawn(async move {
        gateway.enqueue_notifications(push_request.notifications).await;
    });

    respond("ok", StatusCode::OK)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": SERVER_NAME,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn stats_handler(State(gateway): State<Arc<Gateway>>) -> Json<crate::stats::StatsSnapshot> {
    Json(gateway.stats_snapshot())
}

fn respond(message: &str, code: StatusCode) -> Response {
    let body = serde_json::to_string(&PushResponse {
        message: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"message":"Response-body could not be created"}"#.to_string());

    Response::builder()
        .status(code)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header(header::SERVER, server_header())
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}
