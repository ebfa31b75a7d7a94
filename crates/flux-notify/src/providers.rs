use crate::channel::{ChannelConfig, NotificationChannel, SendResult};
use crate::transport::{ConsoleSink, MailTransport, WebhookTransport};
use async_trait::async_trait;
use flux_types::NotificationPayload;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// 控制台通知
// ============================================================================

pub struct ConsoleChannel {
    config: ChannelConfig,
    sink: Arc<dyn ConsoleSink>,
}

impl ConsoleChannel {
    pub fn new(config: ChannelConfig, sink: Arc<dyn ConsoleSink>) -> Self {
        Self { config, sink }
    }

    fn format_line(payload: &NotificationPayload) -> String {
        format!(
            "[{}] {} at {}: {}",
            payload.severity,
            payload.rule.name(),
            payload.formatted_time(),
            payload.message
        )
    }
}

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> &str {
        "console"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, payload: &NotificationPayload) -> SendResult {
        self.sink.write_line(&Self::format_line(payload));
        SendResult::success(&self.config.id)
    }
}

// ============================================================================
// Webhook 通知
// ============================================================================

pub struct WebhookChannel {
    config: ChannelConfig,
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookChannel {
    pub fn new(config: ChannelConfig, transport: Arc<dyn WebhookTransport>) -> Self {
        Self { config, transport }
    }

    fn headers(&self) -> HashMap<String, String> {
        self.config
            .config
            .get("headers")
            .and_then(Value::as_object)
            .map(|headers| {
                headers
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, payload: &NotificationPayload) -> SendResult {
        let Some(url) = self.config.get_str("url") else {
            return SendResult::failure(
                &self.config.id,
                format!("webhook channel {} missing required config: url", self.config.id),
            );
        };

        match self.transport.post(url, &self.headers(), payload).await {
            Ok(()) => {
                info!(channel_id = %self.config.id, url = %url, "Webhook notification sent");
                SendResult::success(&self.config.id)
            }
            Err(e) => {
                error!(channel_id = %self.config.id, error = %e, "Webhook notification failed");
                SendResult::failure(&self.config.id, e.to_string())
            }
        }
    }
}

// ============================================================================
// 邮件通知
// ============================================================================

pub struct EmailChannel {
    config: ChannelConfig,
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    pub fn new(config: ChannelConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self { config, transport }
    }

    /// `to` 可以是单个地址或地址列表
    fn recipients(&self) -> Vec<String> {
        let to = match self.config.config.get("to") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        to.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn channel_type(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn send(&self, payload: &NotificationPayload) -> SendResult {
        let recipients = self.recipients();
        if recipients.is_empty() {
            return SendResult::failure(
                &self.config.id,
                format!("email channel {} missing required config: to", self.config.id),
            );
        }

        match self.transport.send(&recipients, payload).await {
            Ok(()) => {
                info!(channel_id = %self.config.id, recipients = ?recipients, "Email notification sent");
                SendResult::success(&self.config.id)
            }
            Err(e) => {
                error!(channel_id = %self.config.id, error = %e, "Email notification failed");
                SendResult::failure(&self.config.id, e.to_string())
            }
        }
    }
}
