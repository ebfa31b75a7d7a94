use flux_types::Severity;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

/// 告警引擎自身的运行指标
pub struct AlertMetrics {
    // 评估指标
    evaluations_total: Counter,
    evaluation_duration: Histogram,
    rules_triggered_total: CounterVec,

    // 告警指标
    alerts_fired_total: CounterVec,
    alerts_suppressed_total: CounterVec,

    // 通知指标
    notifications_total: CounterVec,

    // 异常指标
    anomalies_detected_total: CounterVec,

    registry: Registry,
}

impl AlertMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // 评估指标
        let evaluations_total =
            Counter::new("alert_evaluations_total", "Total number of evaluation passes")?;
        registry.register(Box::new(evaluations_total.clone()))?;

        let evaluation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "alert_evaluation_duration_seconds",
                "Duration of a single evaluation pass",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.1, 1.0]),
        )?;
        registry.register(Box::new(evaluation_duration.clone()))?;

        let rules_triggered_total = CounterVec::new(
            Opts::new(
                "alert_rules_triggered_total",
                "Total number of times a rule evaluated as triggered",
            ),
            &["rule_id"],
        )?;
        registry.register(Box::new(rules_triggered_total.clone()))?;

        // 告警指标
        let alerts_fired_total = CounterVec::new(
            Opts::new("alerts_fired_total", "Total number of alerts fired"),
            &["severity"],
        )?;
        registry.register(Box::new(alerts_fired_total.clone()))?;

        let alerts_suppressed_total = CounterVec::new(
            Opts::new(
                "alerts_suppressed_total",
                "Total number of triggered rules suppressed by cooldown",
            ),
            &["rule_id"],
        )?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;

        // 通知指标
        let notifications_total = CounterVec::new(
            Opts::new("notifications_total", "Total number of notification attempts"),
            &["channel_type", "status"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        // 异常指标
        let anomalies_detected_total = CounterVec::new(
            Opts::new("anomalies_detected_total", "Total number of anomalies detected"),
            &["anomaly_type"],
        )?;
        registry.register(Box::new(anomalies_detected_total.clone()))?;

        Ok(Self {
            evaluations_total,
            evaluation_duration,
            rules_triggered_total,
            alerts_fired_total,
            alerts_suppressed_total,
            notifications_total,
            anomalies_detected_total,
            registry,
        })
    }

    // 评估指标记录
    pub fn record_evaluation(&self, duration: f64) {
        self.evaluations_total.inc();
        self.evaluation_duration.observe(duration);
    }

    pub fn record_rule_triggered(&self, rule_id: &str) {
        self.rules_triggered_total
            .with_label_values(&[rule_id])
            .inc();
    }

    // 告警指标记录
    pub fn record_alert_fired(&self, severity: Severity) {
        self.alerts_fired_total
            .with_label_values(&[severity_label(severity)])
            .inc();
    }

    pub fn record_alert_suppressed(&self, rule_id: &str) {
        self.alerts_suppressed_total
            .with_label_values(&[rule_id])
            .inc();
    }

    // 通知指标记录
    pub fn record_notification(&self, channel_type: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        self.notifications_total
            .with_label_values(&[channel_type, status])
            .inc();
    }

    // 异常指标记录
    pub fn record_anomaly(&self, anomaly_type: &str) {
        self.anomalies_detected_total
            .with_label_values(&[anomaly_type])
            .inc();
    }

    // 读取
    pub fn evaluations(&self) -> u64 {
        self.evaluations_total.get() as u64
    }

    pub fn rules_triggered(&self, rule_id: &str) -> u64 {
        self.rules_triggered_total
            .with_label_values(&[rule_id])
            .get() as u64
    }

    pub fn alerts_fired(&self, severity: Severity) -> u64 {
        self.alerts_fired_total
            .with_label_values(&[severity_label(severity)])
            .get() as u64
    }

    pub fn alerts_suppressed(&self, rule_id: &str) -> u64 {
        self.alerts_suppressed_total
            .with_label_values(&[rule_id])
            .get() as u64
    }

    pub fn notifications(&self, channel_type: &str, success: bool) -> u64 {
        let status = if success { "success" } else { "failure" };
        self.notifications_total
            .with_label_values(&[channel_type, status])
            .get() as u64
    }

    pub fn anomalies(&self, anomaly_type: &str) -> u64 {
        self.anomalies_detected_total
            .with_label_values(&[anomaly_type])
            .get() as u64
    }

    // 导出指标
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl std::fmt::Debug for AlertMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertMetrics")
            .field("evaluations", &self.evaluations())
            .finish_non_exhaustive()
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Critical => "critical",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = AlertMetrics::new().unwrap();
        assert!(!metrics.export().unwrap().is_empty());
    }

    #[test]
    fn test_alert_metrics() {
        let metrics = AlertMetrics::new().unwrap();

        metrics.record_rule_triggered("cpu-high");
        metrics.record_alert_fired(Severity::Critical);
        metrics.record_alert_suppressed("cpu-high");
        metrics.record_alert_suppressed("cpu-high");

        assert_eq!(metrics.rules_triggered("cpu-high"), 1);
        assert_eq!(metrics.alerts_fired(Severity::Critical), 1);
        assert_eq!(metrics.alerts_fired(Severity::Info), 0);
        assert_eq!(metrics.alerts_suppressed("cpu-high"), 2);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("alerts_fired_total"));
        assert!(exported.contains("alerts_suppressed_total"));
    }

    #[test]
    fn test_notification_metrics() {
        let metrics = AlertMetrics::new().unwrap();

        metrics.record_notification("webhook", true);
        metrics.record_notification("webhook", false);
        metrics.record_notification("webhook", false);

        assert_eq!(metrics.notifications("webhook", true), 1);
        assert_eq!(metrics.notifications("webhook", false), 2);
        assert!(metrics.export().unwrap().contains("notifications_total"));
    }

    #[test]
    fn test_evaluation_metrics() {
        let metrics = AlertMetrics::new().unwrap();

        metrics.record_evaluation(0.002);
        metrics.record_anomaly("spike");

        assert_eq!(metrics.evaluations(), 1);
        assert_eq!(metrics.anomalies("spike"), 1);
        assert!(metrics
            .export()
            .unwrap()
            .contains("alert_evaluation_duration_seconds"));
    }
}
