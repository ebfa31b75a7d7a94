use thiserror::Error;

/// 规则构建错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// 规则至少需要一个条件
    #[error("Rule {0} has no conditions")]
    NoConditions(String),

    /// 规则 ID 为空
    #[error("Rule id must not be empty")]
    EmptyId,

    /// 无法识别的比较运算符
    #[error("Unknown operator: {0}")]
    InvalidOperator(String),

    /// 无法识别的聚合函数
    #[error("Unknown aggregation: {0}")]
    InvalidAggregation(String),

    /// 无法识别的告警级别
    #[error("Unknown severity: {0}")]
    InvalidSeverity(String),
}

pub type Result<T> = std::result::Result<T, RuleError>;
