use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 评估上下文：调用方提供的指标快照
///
/// `metric_values` 中每个指标只保留调用方认为"近期"的样本，`timestamp` 为毫秒时间戳。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(alias = "metricValues")]
    pub metric_values: HashMap<String, Vec<f64>>,
    pub timestamp: i64,
}

impl EvaluationContext {
    pub fn new(timestamp: i64) -> Self {
        Self {
            metric_values: HashMap::new(),
            timestamp,
        }
    }

    /// 以当前时间创建上下文
    pub fn now() -> Self {
        Self::new(Utc::now().timestamp_millis())
    }

    pub fn with_metric(mut self, metric: impl Into<String>, samples: Vec<f64>) -> Self {
        self.metric_values.insert(metric.into(), samples);
        self
    }

    pub fn insert(&mut self, metric: impl Into<String>, samples: Vec<f64>) {
        self.metric_values.insert(metric.into(), samples);
    }

    pub fn samples(&self, metric: &str) -> Option<&[f64]> {
        self.metric_values.get(metric).map(Vec::as_slice)
    }
}
