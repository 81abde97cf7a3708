//! Health and inspection HTTP server
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


use crate::sender::NotificationSender;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

pub struct HealthServer {
    port: u16,
    sender: Arc<NotificationSender>,
}

impl HealthServer {
    pub fn new(port: u16, sender: Arc<NotificationSender>) -> Self {
        Self { port, sender }
    }

    /// Start the server and run until a shutdown signal arrives
    pub async fn start(self) -> anyhow::Result<()> {
        let app = router(self.sender);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await
            .map_err(|e| anyhow::anyhow!("Failed to bind health check server to {}: {}", addr, e))?;

        info!(port = self.port, "Health check server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| anyhow::anyhow!("Health check server error: {}", e))?;

        info!("Health check server stopped");
        Ok(())
    }
}

/// `/health`, `/status`, `/deliveries` and `/deliveries/:id`
pub fn router(sender: Arc<NotificationSender>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/status", get(status))
        .route("/deliveries", get(list_deliveries))
        .route("/deliveries/:id", get(get_delivery))
        .with_state(sender)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "notification-worker",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(sender): State<Arc<NotificationSender>>) -> Json<serde_json::Value> {
    let stats = sender.ledger().stats().await;
    let channels = sender.verify_channels().await;

    Json(json!({
        "service": "notification-worker",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "ledger": stats,
        "channels": channels,
    }))
}

async fn list_deliveries(State(sender): State<Arc<NotificationSender>>) -> Json<serde_json::Value> {
    let records = sender.ledger().list().await;
    Json(json!({
        "count": records.len(),
        "deliveries": records,
    }))
}

async fn get_delivery(
    State(sender): State<Arc<NotificationSender>>,
    Path(id): Path<String>,
) -> Response {
    match sender.ledger().get(&id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not found", "id": id })),
        )
            .into_response(),
    }
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
