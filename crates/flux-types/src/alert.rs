use crate::rule::{AlertRule, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 告警实例
///
/// 仅在规则触发且不处于冷却期时生成，写入历史后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Alert {
    pub fn new(rule: &AlertRule, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule.id().to_string(),
            rule_name: rule.name().to_string(),
            severity: rule.severity(),
            message: message.into(),
            timestamp,
            labels: rule.labels().clone(),
        }
    }

    pub fn fired_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// 发送给每个通知渠道的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub alert_id: String,
    pub rule: AlertRule,
    pub severity: Severity,
    pub message: String,
    pub timestamp: i64,
}

impl NotificationPayload {
    pub fn new(alert: &Alert, rule: AlertRule) -> Self {
        Self {
            alert_id: alert.id.clone(),
            severity: alert.severity,
            message: alert.message.clone(),
            timestamp: alert.timestamp,
            rule,
        }
    }

    /// RFC 3339 格式的时间，时间戳越界时回退为毫秒数
    pub fn formatted_time(&self) -> String {
        DateTime::from_timestamp_millis(self.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| format!("{}ms", self.timestamp))
    }
}
