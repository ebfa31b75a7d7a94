//! 告警系统共享数据模型：规则、条件、告警与通知负载。

pub mod alert;
pub mod condition;
pub mod error;
pub mod rule;

pub use alert::{Alert, NotificationPayload};
pub use condition::{Aggregation, AlertCondition, Operator};
pub use error::RuleError;
pub use rule::{AlertRule, AlertRuleBuilder, Severity};
