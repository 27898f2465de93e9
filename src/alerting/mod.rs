//! Alerting module for webhook notifications
//!
//! Denied logins can be pushed to Discord or generic JSON webhooks. The
//! dispatcher runs as a tokio task; the synchronous login path only hands
//! records to an [`AlertQueue`].

use crate::config::{AlertConfig, DiscordConfig, WebhookConfig};
use crate::models::{AuditRecord, DenyReason};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during alert dispatch
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Whether a record warrants an alert under this configuration
pub fn should_alert(config: &AlertConfig, record: &AuditRecord) -> bool {
    if !config.enabled {
        return false;
    }
    match record.reason {
        None => false,
        Some(DenyReason::NotWhitelisted) => config.notify_not_whitelisted,
        Some(DenyReason::OriginDrift) | Some(DenyReason::LookupFailure) => true,
    }
}

/// Async alert dispatcher
pub struct AlertDispatcher {
    config: AlertConfig,
    client: Client,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        AlertDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a channel for queueing alerts
    pub fn create_channel() -> (mpsc::Sender<AuditRecord>, mpsc::Receiver<AuditRecord>) {
        mpsc::channel(100)
    }

    /// Run the alert dispatch loop until every sender is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<AuditRecord>) {
        log::info!("Alert dispatcher started");

        while let Some(record) = rx.recv().await {
            if !should_alert(&self.config, &record) {
                log::debug!("Skipping alert for '{}'", record.username);
                continue;
            }

            if let Err(e) = self.dispatch_alert(&record).await {
                log::error!("Failed to dispatch alert: {}", e);
            }
        }

        log::info!("Alert dispatcher stopped");
    }

    /// Dispatch an alert to all configured channels
    async fn dispatch_alert(&self, record: &AuditRecord) -> Result<(), AlertError> {
        let mut errors = Vec::new();

        if let Some(ref discord) = self.config.discord {
            if let Err(e) = self.send_discord_alert(discord, record).await {
                log::error!("Discord alert failed: {}", e);
                errors.push(e);
            }
        }

        for webhook in &self.config.webhooks {
            if let Err(e) = self.send_generic_webhook(webhook, record).await {
                log::error!("Webhook {} failed: {}", webhook.name, e);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }

    async fn send_discord_alert(
        &self,
        config: &DiscordConfig,
        record: &AuditRecord,
    ) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&config.webhook_url)
            .json(&discord_payload(config, record))
            .send()
            .await?;

        if !response.status().is_success() {
            log::warn!("Discord returned non-success status: {}", response.status());
        }

        Ok(())
    }

    async fn send_generic_webhook(
        &self,
        config: &WebhookConfig,
        record: &AuditRecord,
    ) -> Result<(), AlertError> {
        let method = config.method.as_deref().unwrap_or("POST");

        let mut request = match method.to_uppercase().as_str() {
            "PUT" => self.client.put(&config.url),
            _ => self.client.post(&config.url),
        };

        if let Some(ref headers) = config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(record).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Webhook {} returned non-success status: {}",
                config.name,
                response.status()
            );
        }

        Ok(())
    }
}

fn discord_payload(config: &DiscordConfig, record: &AuditRecord) -> serde_json::Value {
    let (title, color) = match record.reason {
        Some(DenyReason::OriginDrift) => ("Origin drift", 0xFF6600),
        Some(DenyReason::LookupFailure) => ("Origin lookup failed", 0xFFCC00),
        Some(DenyReason::NotWhitelisted) => ("Not whitelisted", 0x00CCFF),
        None => ("Login allowed", 0x00FF00),
    };

    serde_json::json!({
        "username": config.username.as_deref().unwrap_or("loginfence"),
        "embeds": [{
            "title": format!(":shield: {}", title),
            "description": record.describe(),
            "color": color,
            "fields": [
                { "name": "Player", "value": &record.username, "inline": true },
                { "name": "Address", "value": &record.origin, "inline": true },
                { "name": "Trusted", "value": record.trusted_origin.as_deref().unwrap_or("N/A"), "inline": true },
            ],
            "timestamp": record.timestamp.to_rfc3339(),
        }]
    })
}

/// Synchronous handle for queueing alerts from the login path
#[derive(Clone)]
pub struct AlertQueue {
    tx: mpsc::Sender<AuditRecord>,
}

impl AlertQueue {
    pub fn new(tx: mpsc::Sender<AuditRecord>) -> Self {
        AlertQueue { tx }
    }

    /// Queue an alert without blocking; drops it if the queue is full
    pub fn queue_alert(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    log::warn!("Alert queue full, dropping alert");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("Alert queue closed");
                }
            }
        }
    }

}
