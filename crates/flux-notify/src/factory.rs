use crate::channel::{ChannelConfig, NotificationChannel};
use crate::error::{NotifyError, Result};
use crate::providers::{ConsoleChannel, EmailChannel, WebhookChannel};
use crate::transport::{
    ConsoleSink, MailTransport, ReqwestWebhookTransport, SmtpMailTransport, StdoutSink,
    WebhookTransport,
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// 内置渠道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Console,
    Webhook,
    Email,
}

impl FromStr for ChannelType {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "webhook" => Ok(Self::Webhook),
            "email" => Ok(Self::Email),
            other => Err(NotifyError::UnsupportedChannelType(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::Webhook => write!(f, "webhook"),
            Self::Email => write!(f, "email"),
        }
    }
}

/// 自定义渠道构造函数
pub type ChannelConstructor =
    Arc<dyn Fn(&ChannelConfig) -> Result<Arc<dyn NotificationChannel>> + Send + Sync>;

/// 渠道工厂
///
/// 根据配置中的类型创建具体渠道，未知类型在创建时直接失败。
/// 传输实现可替换：未指定邮件传输时，每个邮件渠道使用由自身配置构建的 SMTP 传输。
#[derive(Clone)]
pub struct ChannelFactory {
    webhook_transport: Arc<dyn WebhookTransport>,
    mail_transport: Option<Arc<dyn MailTransport>>,
    console_sink: Arc<dyn ConsoleSink>,
    custom: HashMap<String, ChannelConstructor>,
}

impl ChannelFactory {
    pub fn new() -> Self {
        Self {
            webhook_transport: Arc::new(ReqwestWebhookTransport::default()),
            mail_transport: None,
            console_sink: Arc::new(StdoutSink),
            custom: HashMap::new(),
        }
    }

    pub fn with_webhook_transport(mut self, transport: Arc<dyn WebhookTransport>) -> Self {
        self.webhook_transport = transport;
        self
    }

    pub fn with_mail_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.mail_transport = Some(transport);
        self
    }

    pub fn with_console_sink(mut self, sink: Arc<dyn ConsoleSink>) -> Self {
        self.console_sink = sink;
        self
    }

    /// 注册自定义渠道类型，内置类型不可覆盖
    pub fn register<F>(&mut self, channel_type: impl Into<String>, constructor: F)
    where
        F: Fn(&ChannelConfig) -> Result<Arc<dyn NotificationChannel>> + Send + Sync + 'static,
    {
        let channel_type = channel_type.into().trim().to_ascii_lowercase();
        debug!(channel_type = %channel_type, "Registered custom channel type");
        self.custom.insert(channel_type, Arc::new(constructor));
    }

    pub fn supports(&self, channel_type: &str) -> bool {
        channel_type.parse::<ChannelType>().is_ok()
            || self.custom.contains_key(&channel_type.trim().to_ascii_lowercase())
    }

    pub fn create(&self, config: &ChannelConfig) -> Result<Arc<dyn NotificationChannel>> {
        match config.channel_type.parse::<ChannelType>() {
            Ok(ChannelType::Console) => Ok(Arc::new(ConsoleChannel::new(
                config.clone(),
                self.console_sink.clone(),
            ))),
            Ok(ChannelType::Webhook) => Ok(Arc::new(WebhookChannel::new(
                config.clone(),
                self.webhook_transport.clone(),
            ))),
            Ok(ChannelType::Email) => {
                let transport = match &self.mail_transport {
                    Some(transport) => transport.clone(),
                    None => Arc::new(SmtpMailTransport::from_config(&config.config)),
                };
                Ok(Arc::new(EmailChannel::new(config.clone(), transport)))
            }
            Err(err) => {
                let key = config.channel_type.trim().to_ascii_lowercase();
                match self.custom.get(&key) {
                    Some(constructor) => constructor(config),
                    None => Err(err),
                }
            }
        }
    }
}

impl Default for ChannelFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut custom: Vec<_> = self.custom.keys().collect();
        custom.sort();
        f.debug_struct("ChannelFactory")
            .field("custom_types", &custom)
            .field("shared_mail_transport", &self.mail_transport.is_some())
            .finish()
    }
}
