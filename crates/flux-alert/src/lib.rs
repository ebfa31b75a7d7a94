//! 时序指标告警引擎
//!
//! - 阈值规则：聚合、比较、持续时间门控，多条件逻辑与
//! - 冷却去抖与有界告警历史
//! - 多渠道通知扇出（控制台 / Webhook / 邮件）
//! - 基于滚动统计的异常检测

pub mod aggregator;
pub mod anomaly;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod manager;
pub mod metrics;

pub use aggregator::aggregate;
pub use anomaly::{Anomaly, AnomalyDetector, AnomalyProfile, AnomalyType};
pub use condition::{evaluate_condition, ConditionResult, ConditionState};
pub use config::{AlertConfig, AnomalyConfig, ConfigLoader};
pub use context::EvaluationContext;
pub use error::{AlertError, Result};
pub use evaluator::{EvaluationResult, RuleEvaluator};
pub use history::AlertHistory;
pub use manager::{
    AlertManager, AlertStats, AutoEvaluationHandle, ContextProvider, DeliveryRecord,
    SeverityCounts,
};
pub use metrics::AlertMetrics;
