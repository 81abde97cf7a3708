//! Notification Worker
//!
//! Consumes `notification.requested` and `subscription.requested` events from
//! the message bus, delivers them over the configured channels and publishes
//! `notification.sent`, `notification.failed` or `subscription.updated`.

use anyhow::Result;
use herald_config::AppConfig;
use herald_logging::{init_with_format, LogFormat};
use message_bus_client::{memory::InMemoryBus, nats::NatsClient, traits::MessageBusClient};
use notification_worker::{health::HealthServer, sender::NotificationSender, worker::NotificationWorker};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let (format, format_error) = LogFormat::from_setting(config.log_format());
    init_with_format("notification-worker", config.log_level(), format);

    info!("Starting Notification Worker");
    if let Some(e) = format_error {
        warn!(error = %e, "Invalid LOG_FORMAT, using console output");
    }
    info!(
        message_bus_url = config.message_bus_url(),
        email_channels = config.channels.email.len(),
        push_channels = config.channels.push.len(),
        sink_enabled = config.delivery.sink_enabled,
        "Configuration loaded"
    );

    // Connect to message bus
    let message_bus: Arc<dyn MessageBusClient> =
        if config.message_bus_url().starts_with("memory://") {
            warn!("Using in-memory message bus; events are not shared with other processes");
            Arc::new(InMemoryBus::new())
        } else {
            let client = NatsClient::with_subject_prefix(
                config.message_bus_url(),
                config.message_bus.stream_name.clone(),
                config.subject_prefix(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to message bus: {}", e))?;
            Arc::new(client)
        };

    info!("Connected to message bus");

    let sender = Arc::new(NotificationSender::from_config(&config)?);

    // Start health check server
    let health_server = HealthServer::new(config.health_port, sender.clone());
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.start().await {
            error!(error = %e, "Health check server error");
        }
    });

    // Start processing events
    info!("Starting event processing");
    let worker = NotificationWorker::new(message_bus, sender);
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            error!(error = %e, "Worker error");
        }
    });

    // Wait for shutdown signal
    info!("Notification Worker running. Press Ctrl+C to stop.");
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(err) => {
            error!(error = %err, "Unable to listen for shutdown signal");
        }
    }

    worker_handle.abort();
    health_handle.abort();
    info!("Notification Worker stopped");

    Ok(())
}
