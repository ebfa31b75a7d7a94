use thiserror::Error;

/// 通知错误
#[derive(Error, Debug)]
pub enum NotifyError {
    /// 不支持的渠道类型（注册时即失败）
    #[error("Unsupported channel type: {0}")]
    UnsupportedChannelType(String),

    /// 缺少必需配置项
    #[error("Channel {channel} missing required config: {key}")]
    MissingConfig { channel: String, key: String },

    /// 配置项格式错误
    #[error("Invalid config for channel {channel}: {reason}")]
    InvalidConfig { channel: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Email send failed: {0}")]
    Email(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotifyError {
    pub fn missing_config(channel: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingConfig {
            channel: channel.into(),
            key: key.into(),
        }
    }

    pub fn invalid_config(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
