use flux_types::Alert;
use std::collections::VecDeque;

/// 有界告警历史，超出容量时丢弃最旧的记录
#[derive(Debug, Clone)]
pub struct AlertHistory {
    capacity: usize,
    entries: VecDeque<Alert>,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// 追加一条告警，返回被淘汰的最旧记录
    pub fn push(&mut self, alert: Alert) -> Option<Alert> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(alert);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最近的 `limit` 条记录，按时间从旧到新；`None` 返回全部
    pub fn recent(&self, limit: Option<usize>) -> Vec<Alert> {
        let skip = limit.map_or(0, |limit| self.entries.len().saturating_sub(limit));
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn for_rule(&self, rule_id: &str) -> Vec<Alert> {
        self.entries
            .iter()
            .filter(|alert| alert.rule_id == rule_id)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_types::{AlertCondition, AlertRule, Operator};

    fn alert(rule_id: &str, ts: i64) -> Alert {
        let rule = AlertRule::builder(rule_id, rule_id)
            .condition(AlertCondition::new("cpu", Operator::GreaterThan, 80.0))
            .build()
            .unwrap();
        Alert::new(&rule, format!("fired at {ts}"), ts)
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = AlertHistory::new(3);
        for ts in 0..5 {
            history.push(alert("r", ts));
        }

        assert_eq!(history.len(), 3);
        let timestamps: Vec<i64> = history.iter().map(|a| a.timestamp).collect();
        assert_eq!(timestamps, vec![2, 3, 4]);
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut history = AlertHistory::new(1);
        assert!(history.push(alert("r", 1)).is_none());
        let evicted = history.push(alert("r", 2)).unwrap();
        assert_eq!(evicted.timestamp, 1);
    }

    #[test]
    fn test_recent_and_filter() {
        let mut history = AlertHistory::new(10);
        history.push(alert("a", 1));
        history.push(alert("b", 2));
        history.push(alert("a", 3));

        let recent = history.recent(Some(2));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, 2);
        assert_eq!(recent[1].timestamp, 3);

        assert_eq!(history.recent(None).len(), 3);
        assert_eq!(history.recent(Some(10)).len(), 3);
        assert_eq!(history.for_rule("a").len(), 2);

        history.clear();
        assert!(history.is_empty());
    }
}
