use flux_notify::NotifyError;
use flux_types::RuleError;
use thiserror::Error;

/// 告警引擎错误
#[derive(Error, Debug)]
pub enum AlertError {
    /// 规则已存在
    #[error("Rule already exists: {0}")]
    DuplicateRule(String),

    /// 规则未找到
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// 渠道已存在
    #[error("Channel already exists: {0}")]
    DuplicateChannel(String),

    #[error("Invalid rule: {0}")]
    Rule(#[from] RuleError),

    #[error("Channel error: {0}")]
    Notify(#[from] NotifyError),

    /// 配置校验失败
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl AlertError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
