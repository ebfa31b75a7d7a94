use crate::aggregator::aggregate;
use flux_types::{Aggregation, AlertCondition, Operator};
use serde::Serialize;
use std::fmt;

/// 单个条件的持续状态，记录瞬时比较最近一次由假变真的时间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionState {
    became_true_at: Option<i64>,
}

impl ConditionState {
    pub fn became_true_at(&self) -> Option<i64> {
        self.became_true_at
    }

    pub fn is_active(&self) -> bool {
        self.became_true_at.is_some()
    }

    pub fn clear(&mut self) {
        self.became_true_at = None;
    }
}

/// 单个条件的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionResult {
    pub metric: String,
    pub operator: Operator,
    pub aggregation: Aggregation,
    /// 聚合值，无数据时为 `None`
    pub value: Option<f64>,
    pub threshold: f64,
    /// 瞬时比较结果
    pub matched: bool,
    /// 瞬时比较已连续成立的时间（毫秒）
    pub held_for_ms: i64,
    pub duration_ms: u64,
    /// 比较成立且持续时间满足要求
    pub met: bool,
}

impl ConditionResult {
    /// 比较已成立但持续时间尚未达到
    pub fn is_pending(&self) -> bool {
        self.matched && !self.met
    }
}

impl fmt::Display for ConditionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(value) = self.value else {
            return write!(f, "{}: no data", self.metric);
        };

        let expr = format!(
            "{}({})={:.2} {} {}",
            self.aggregation, self.metric, value, self.operator, self.threshold
        );
        if self.met {
            write!(f, "{} held {}ms", expr, self.held_for_ms)
        } else if self.matched {
            write!(f, "{} pending {}/{}ms", expr, self.held_for_ms, self.duration_ms)
        } else {
            write!(f, "{} not met", expr)
        }
    }
}

/// 评估单个条件并更新其持续状态
///
/// 比较成立时若尚无起始时间则记录 `now`；不成立（含无数据）时清除。
/// 只有比较成立且 `now - 起始时间 >= duration` 才算满足，边界包含。
pub fn evaluate_condition(
    condition: &AlertCondition,
    samples: Option<&[f64]>,
    now: i64,
    state: &mut ConditionState,
) -> ConditionResult {
    let value = samples.and_then(|s| aggregate(condition.aggregation, s));
    let matched = value.is_some_and(|v| condition.operator.compare(v, condition.threshold));

    let held_for_ms = if matched {
        let since = *state.became_true_at.get_or_insert(now);
        now.saturating_sub(since)
    } else {
        state.clear();
        0
    };

    let duration = i64::try_from(condition.duration_ms).unwrap_or(i64::MAX);
    let met = matched && held_for_ms >= duration;

    ConditionResult {
        metric: condition.metric.clone(),
        operator: condition.operator,
        aggregation: condition.aggregation,
        value,
        threshold: condition.threshold,
        matched,
        held_for_ms,
        duration_ms: condition.duration_ms,
        met,
    }
}
