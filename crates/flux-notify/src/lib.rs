//! 告警通知渠道：控制台、Webhook、邮件，以及根据配置创建渠道的工厂。

pub mod channel;
pub mod error;
pub mod factory;
pub mod providers;
pub mod transport;

pub use channel::{ChannelConfig, NotificationChannel, SendResult};
pub use error::NotifyError;
pub use factory::{ChannelConstructor, ChannelFactory, ChannelType};
pub use providers::{ConsoleChannel, EmailChannel, WebhookChannel};
pub use transport::{
    ConsoleSink, MailTransport, MemorySink, ReqwestWebhookTransport, SmtpMailTransport,
    StdoutSink, WebhookTransport,
};
