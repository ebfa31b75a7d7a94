use crate::condition::{evaluate_condition, ConditionResult, ConditionState};
use crate::context::EvaluationContext;
use flux_types::AlertRule;
use serde::Serialize;
use std::collections::HashMap;
use tracing::trace;

/// 规则评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub rule_id: String,
    /// 所有条件均满足
    pub triggered: bool,
    pub conditions: Vec<ConditionResult>,
    pub timestamp: i64,
    pub message: Option<String>,
}

impl EvaluationResult {
    pub fn failed_conditions(&self) -> impl Iterator<Item = &ConditionResult> {
        self.conditions.iter().filter(|c| !c.met)
    }
}

/// 规则评估器
///
/// 持有每条规则各条件的持续状态（按规则 ID 与条件下标索引），跨多次评估保留。
#[derive(Debug, Default)]
pub struct RuleEvaluator {
    states: HashMap<String, Vec<ConditionState>>,
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 评估规则的全部条件，结果为各条件的逻辑与
    ///
    /// 上下文中缺失的指标按不满足处理。所有条件都会被评估，
    /// 以保证每个条件的持续状态都得到更新。
    pub fn evaluate(&mut self, rule: &AlertRule, context: &EvaluationContext) -> EvaluationResult {
        let conditions = rule.conditions();
        let states = self
            .states
            .entry(rule.id().to_string())
            .or_default();
        states.resize(conditions.len(), ConditionState::default());

        let results: Vec<ConditionResult> = conditions
            .iter()
            .zip(states.iter_mut())
            .map(|(condition, state)| {
                evaluate_condition(
                    condition,
                    context.samples(&condition.metric),
                    context.timestamp,
                    state,
                )
            })
            .collect();

        let triggered = !results.is_empty() && results.iter().all(|r| r.met);
        let message = summarize(rule, triggered, &results);

        trace!(rule_id = %rule.id(), triggered, "Rule evaluated");

        EvaluationResult {
            rule_id: rule.id().to_string(),
            triggered,
            conditions: results,
            timestamp: context.timestamp,
            message: Some(message),
        }
    }

    pub fn condition_state(&self, rule_id: &str, index: usize) -> Option<ConditionState> {
        self.states.get(rule_id).and_then(|s| s.get(index)).copied()
    }

    /// 清除某条规则的所有条件状态
    pub fn reset_rule(&mut self, rule_id: &str) -> bool {
        self.states.remove(rule_id).is_some()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }

    pub fn tracked_rules(&self) -> usize {
        self.states.len()
    }
}

fn summarize(rule: &AlertRule, triggered: bool, results: &[ConditionResult]) -> String {
    let details = results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");

    if triggered {
        format!("{} triggered: {}", rule.name(), details)
    } else {
        format!("{} not triggered: {}", rule.name(), details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_types::{AlertCondition, Operator};

    fn two_condition_rule() -> AlertRule {
        AlertRule::builder("hot-and-busy", "Hot and busy")
            .condition(AlertCondition::new("temp", Operator::GreaterThan, 70.0))
            .condition(
                AlertCondition::new("load", Operator::GreaterEqual, 4.0).with_duration_ms(500),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_and_combination() {
        let rule = two_condition_rule();
        let mut evaluator = RuleEvaluator::new();

        let ctx = EvaluationContext::new(0)
            .with_metric("temp", vec![75.0])
            .with_metric("load", vec![5.0]);
        let result = evaluator.evaluate(&rule, &ctx);
        assert!(!result.triggered);
        assert!(result.conditions[0].met);
        assert!(result.conditions[1].is_pending());
        assert_eq!(result.failed_conditions().count(), 1);

        let ctx = EvaluationContext::new(500)
            .with_metric("temp", vec![75.0])
            .with_metric("load", vec![5.0]);
        let result = evaluator.evaluate(&rule, &ctx);
        assert!(result.triggered);
        assert!(result.message.unwrap().starts_with("Hot and busy triggered"));
    }

    #[test]
    fn test_missing_metric_not_met() {
        let rule = two_condition_rule();
        let mut evaluator = RuleEvaluator::new();

        let ctx = EvaluationContext::new(0).with_metric("temp", vec![75.0]);
        let result = evaluator.evaluate(&rule, &ctx);

        assert!(!result.triggered);
        assert_eq!(result.conditions[1].value, None);
        assert!(result.message.unwrap().contains("load: no data"));
    }

    #[test]
    fn test_state_persists_and_resets() {
        let rule = two_condition_rule();
        let mut evaluator = RuleEvaluator::new();
        let ctx = EvaluationContext::new(100)
            .with_metric("temp", vec![75.0])
            .with_metric("load", vec![5.0]);

        evaluator.evaluate(&rule, &ctx);
        assert_eq!(
            evaluator.condition_state("hot-and-busy", 1).and_then(|s| s.became_true_at()),
            Some(100)
        );

        assert!(evaluator.reset_rule("hot-and-busy"));
        assert!(evaluator.condition_state("hot-and-busy", 1).is_none());
        assert!(!evaluator.reset_rule("hot-and-busy"));
    }

    #[test]
    fn test_resized_rule_keeps_matching_indices() {
        let mut evaluator = RuleEvaluator::new();
        let rule = two_condition_rule();
        let ctx = EvaluationContext::new(0)
            .with_metric("temp", vec![75.0])
            .with_metric("load", vec![5.0]);
        evaluator.evaluate(&rule, &ctx);

        let shrunk = AlertRule::builder("hot-and-busy", "Hot")
            .condition(AlertCondition::new("temp", Operator::GreaterThan, 70.0))
            .build()
            .unwrap();
        let result = evaluator.evaluate(&shrunk, &ctx);
        assert_eq!(result.conditions.len(), 1);
        assert!(evaluator.condition_state("hot-and-busy", 1).is_none());
    }
}
