//! 外部投递协作者：HTTP、SMTP 以及控制台输出。
//!
//! 渠道本身只负责校验配置并委托给这里的 trait，默认实现分别基于
//! `reqwest`、`lettre` 和标准输出，测试中可替换为内存实现。

use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use flux_types::NotificationPayload;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Webhook 投递
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        payload: &NotificationPayload,
    ) -> Result<()>;
}

/// 邮件投递
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, recipients: &[String], payload: &NotificationPayload) -> Result<()>;
}

/// 控制台输出
pub trait ConsoleSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// 基于 reqwest 的 webhook 投递
#[derive(Debug, Clone, Default)]
pub struct ReqwestWebhookTransport {
    client: reqwest::Client,
}

impl ReqwestWebhookTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn post(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        payload: &NotificationPayload,
    ) -> Result<()> {
        let mut request = self.client.post(url);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        if response.status().is_success() {
            debug!(url = %url, "Webhook delivered");
            Ok(())
        } else {
            Err(NotifyError::Http(format!(
                "Webhook failed with status: {}",
                response.status()
            )))
        }
    }
}

/// 基于 lettre 的 SMTP 投递，连接参数来自渠道配置
#[derive(Debug, Clone, Default)]
pub struct SmtpMailTransport {
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
}

impl SmtpMailTransport {
    pub fn from_config(config: &Map<String, Value>) -> Self {
        let get = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            smtp_host: get("smtp_host"),
            smtp_port: config
                .get("smtp_port")
                .and_then(Value::as_u64)
                .and_then(|p| u16::try_from(p).ok()),
            username: get("username"),
            password: get("password"),
            from: get("from"),
        }
    }

    fn build_message(&self, recipients: &[String], payload: &NotificationPayload) -> Result<Message> {
        let from = self.from.as_deref().unwrap_or("flux-alert@localhost");
        let mut builder = Message::builder()
            .from(from.parse().map_err(|e| NotifyError::Email(format!("invalid from address: {e}")))?)
            .subject(format!("[{}] {}", payload.severity, payload.rule.name()))
            .header(ContentType::TEXT_PLAIN);

        for recipient in recipients {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| NotifyError::Email(format!("invalid recipient {recipient}: {e}")))?);
        }

        builder
            .body(format_email_body(payload))
            .map_err(|e| NotifyError::Email(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, recipients: &[String], payload: &NotificationPayload) -> Result<()> {
        let host = self
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Email("smtp_host not configured".to_string()))?;

        let email = self.build_message(recipients, payload)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        if let Some(port) = self.smtp_port {
            builder = builder.port(port);
        }
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        builder
            .build()
            .send(email)
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;

        debug!(host = %host, recipients = recipients.len(), "Email delivered");
        Ok(())
    }
}

fn format_email_body(payload: &NotificationPayload) -> String {
    let rule = &payload.rule;
    let mut body = format!("Alert: {}\n\n", rule.name());
    body.push_str(&format!("Severity: {}\n", payload.severity));
    body.push_str(&format!("Message: {}\n\n", payload.message));
    body.push_str(&format!("Fired at: {}\n", payload.formatted_time()));

    if !rule.description().is_empty() {
        body.push_str(&format!("\n{}\n", rule.description()));
    }

    if !rule.labels().is_empty() {
        body.push_str("\nLabels:\n");
        for (k, v) in rule.labels() {
            body.push_str(&format!("  {}: {}\n", k, v));
        }
    }

    body
}

/// 写入标准输出
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_line(&self, line: &str) {
        println!("{line}");
    }
}

/// 写入内存，便于测试与嵌入式场景读取输出
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ConsoleSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
    }
}
