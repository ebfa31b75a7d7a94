use async_trait::async_trait;
use chrono::Utc;
use flux_types::NotificationPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 渠道配置
///
/// `config` 为自由格式的键值配置，例如 webhook 的 `url`、邮件的 `to`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", alias = "channel_type")]
    pub channel_type: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl ChannelConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        channel_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            channel_type: channel_type.into(),
            enabled: true,
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 读取非空字符串配置项
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// 单次发送结果，发送失败不会以错误形式返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub channel_id: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn success(channel_id: impl Into<String>) -> Self {
        Self {
            success: true,
            channel_id: channel_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            error: None,
        }
    }

    pub fn failure(channel_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel_id: channel_id.into(),
            timestamp: Utc::now().timestamp_millis(),
            error: Some(error.into()),
        }
    }
}

/// 通知渠道
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// 渠道类型标识，例如 `"webhook"`
    fn channel_type(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// 发送通知，所有失败路径都返回 `success = false` 的结果
    async fn send(&self, payload: &NotificationPayload) -> SendResult;
}
