use async_trait::async_trait;
use flux_alert::{
    AlertConfig, AlertError, AlertManager, AnomalyConfig, AnomalyType, ConfigLoader,
    EvaluationContext,
};
use flux_notify::{
    ChannelConfig, ChannelFactory, MemorySink, NotificationChannel, NotifyError, SendResult,
};
use flux_types::{
    Aggregation, AlertCondition, AlertRule, NotificationPayload, Operator, Severity,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

fn setup(max_history_size: usize) -> (AlertManager, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let factory = ChannelFactory::new().with_console_sink(sink.clone());
    let config = AlertConfig {
        max_history_size,
        channels: vec![ChannelConfig::new("console", "Console", "console")],
        ..Default::default()
    };
    (assert_ok!(AlertManager::with_factory(config, factory)), sink)
}

fn threshold_rule(id: &str, duration_ms: u64, cooldown_ms: u64) -> AlertRule {
    AlertRule::builder(id, format!("{id} rule"))
        .severity(Severity::Warning)
        .condition(
            AlertCondition::new("m", Operator::GreaterThan, 80.0)
                .with_duration_ms(duration_ms)
                .with_aggregation(Aggregation::Average),
        )
        .cooldown_ms(cooldown_ms)
        .action("console")
        .build()
        .unwrap()
}

fn reading(ts: i64, value: f64) -> EvaluationContext {
    EvaluationContext::new(ts).with_metric("m", vec![value])
}

/// 持续时间门控 + 冷却的完整流程
#[tokio::test]
async fn test_end_to_end_duration_and_cooldown() {
    let (manager, sink) = setup(100);
    manager.add_rule(threshold_rule("r", 1000, 2000)).await.unwrap();

    let results = manager.evaluate(&reading(0, 85.0)).await;
    assert!(!results[0].triggered);
    assert!(manager.get_history(None).await.is_empty());

    let results = manager.evaluate(&reading(1500, 90.0)).await;
    assert!(results[0].triggered);
    manager.wait_for_dispatches().await;
    assert_eq!(manager.get_history(None).await.len(), 1);
    assert_eq!(sink.lines().len(), 1);

    let results = manager.evaluate(&reading(1800, 90.0)).await;
    assert!(results[0].triggered);
    manager.wait_for_dispatches().await;
    assert_eq!(manager.get_history(None).await.len(), 1);
    assert_eq!(sink.lines().len(), 1);

    manager.evaluate(&reading(4000, 90.0)).await;
    manager.wait_for_dispatches().await;
    let history = manager.get_history(None).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].timestamp, 1500);
    assert_eq!(history[1].timestamp, 4000);
    assert_eq!(sink.lines().len(), 2);
}

/// 管理器释放后已发起的投递仍会完成
#[tokio::test]
async fn test_dispatch_survives_manager_drop() {
    let (manager, sink) = setup(10);
    manager.add_rule(threshold_rule("r", 0, 0)).await.unwrap();

    let results = manager.evaluate(&reading(0, 99.0)).await;
    assert!(results[0].triggered);
    assert_eq!(manager.get_history(None).await.len(), 1);
    drop(manager);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test]
async fn test_fires_once_per_cooldown_window() {
    let (manager, _) = setup(100);
    manager.add_rule(threshold_rule("r", 0, 5000)).await.unwrap();

    for ts in [0, 1000, 2500, 4999] {
        manager.evaluate(&reading(ts, 99.0)).await;
    }
    assert_eq!(manager.get_history(None).await.len(), 1);

    manager.evaluate(&reading(5000, 99.0)).await;
    assert_eq!(manager.get_history_for_rule("r").await.len(), 2);
    assert_eq!(manager.metrics().alerts_suppressed("r"), 3);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let (manager, _) = setup(3);
    manager.add_rule(threshold_rule("r", 0, 0)).await.unwrap();

    for ts in 0..5 {
        manager.evaluate(&reading(ts * 10, 99.0)).await;
    }

    let history = manager.get_history(None).await;
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].timestamp, 20);
    assert_eq!(manager.get_history(Some(1)).await[0].timestamp, 40);

    manager.wait_for_dispatches().await;
    assert_eq!(manager.get_deliveries(None).await.len(), 3);

    manager.clear_history().await;
    assert_eq!(manager.get_stats().await.total_alerts, 0);
}

#[tokio::test]
async fn test_bogus_channel_rejected_at_registration() {
    let (manager, _) = setup(10);
    let result = manager
        .add_channel(ChannelConfig::new("b", "Bogus", "bogus"))
        .await;

    assert!(matches!(
        result,
        Err(AlertError::Notify(NotifyError::UnsupportedChannelType(_)))
    ));
    assert!(manager.get_channel("b").await.is_none());
}

#[tokio::test]
async fn test_unregistered_channel_skipped() {
    let (manager, sink) = setup(10);
    let rule = threshold_rule("r", 0, 0)
        .to_builder()
        .action("missing")
        .build()
        .unwrap();
    manager.add_rule(rule).await.unwrap();
    manager.add_rule(threshold_rule("other", 0, 0)).await.unwrap();

    let results = manager.evaluate(&reading(0, 99.0)).await;
    assert!(results.iter().all(|r| r.triggered));
    manager.wait_for_dispatches().await;

    assert_eq!(manager.get_history(None).await.len(), 2);
    assert_eq!(sink.lines().len(), 2);

    let record = manager
        .get_deliveries(None)
        .await
        .into_iter()
        .find(|d| d.rule_id == "r")
        .unwrap();
    assert_eq!(record.results.len(), 2);
    assert!(record.results[0].success);
    assert!(!record.results[1].success);
    assert_eq!(record.results[1].error.as_deref(), Some("channel not registered"));
}

struct FailingChannel {
    id: String,
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn channel_type(&self) -> &str {
        "flaky"
    }

    async fn send(&self, _payload: &NotificationPayload) -> SendResult {
        SendResult::failure(&self.id, "connection refused")
    }
}

/// 投递失败不回滚已生成的告警
#[tokio::test]
async fn test_delivery_failure_keeps_alert() {
    let mut factory = ChannelFactory::new();
    factory.register("flaky", |config: &ChannelConfig| {
        Ok(Arc::new(FailingChannel {
            id: config.id.clone(),
        }) as Arc<dyn NotificationChannel>)
    });
    let manager = AlertManager::with_factory(AlertConfig::default(), factory).unwrap();
    manager
        .add_channel(ChannelConfig::new("hook", "Flaky hook", "flaky"))
        .await
        .unwrap();

    let rule = AlertRule::builder("r", "r")
        .condition(AlertCondition::new("m", Operator::GreaterThan, 0.0))
        .action("hook")
        .build()
        .unwrap();
    manager.add_rule(rule).await.unwrap();

    manager.evaluate(&reading(0, 1.0)).await;
    manager.wait_for_dispatches().await;

    assert_eq!(manager.get_history(None).await.len(), 1);
    let deliveries = manager.get_deliveries(None).await;
    assert!(!deliveries[0].all_succeeded());
    assert_eq!(manager.metrics().notifications("flaky", false), 1);
}

#[tokio::test]
async fn test_disabled_channel_not_invoked() {
    let (manager, sink) = setup(10);
    manager
        .add_channel(ChannelConfig::new("quiet", "Quiet", "console").with_enabled(false))
        .await
        .unwrap();
    let rule = AlertRule::builder("r", "r")
        .condition(AlertCondition::new("m", Operator::GreaterThan, 0.0))
        .action("quiet")
        .build()
        .unwrap();
    manager.add_rule(rule).await.unwrap();

    manager.evaluate(&reading(0, 1.0)).await;
    manager.wait_for_dispatches().await;

    assert_eq!(manager.get_history(None).await.len(), 1);
    assert!(sink.lines().is_empty());
    assert!(manager.get_deliveries(None).await.is_empty());
}

#[tokio::test]
async fn test_remove_rule_clears_state() {
    let (manager, _) = setup(10);
    manager.add_rule(threshold_rule("r", 1000, 0)).await.unwrap();
    manager.evaluate(&reading(0, 90.0)).await;

    assert!(manager.remove_rule("r").await);
    manager.add_rule(threshold_rule("r", 1000, 0)).await.unwrap();

    // 持续计时从头开始
    let results = manager.evaluate(&reading(1500, 90.0)).await;
    assert!(!results[0].triggered);

    let results = manager.evaluate(&reading(2500, 90.0)).await;
    assert!(results[0].triggered);
}

#[tokio::test]
async fn test_remove_rule_clears_cooldown() {
    let (manager, _) = setup(10);
    manager.add_rule(threshold_rule("r", 0, 60_000)).await.unwrap();
    manager.evaluate(&reading(0, 90.0)).await;

    manager.remove_rule("r").await;
    manager.add_rule(threshold_rule("r", 0, 60_000)).await.unwrap();
    manager.evaluate(&reading(100, 90.0)).await;

    assert_eq!(manager.get_history_for_rule("r").await.len(), 2);
}

#[tokio::test]
async fn test_missing_metric_is_not_met() {
    let (manager, _) = setup(10);
    let rule = AlertRule::builder("both", "Both")
        .condition(AlertCondition::new("m", Operator::GreaterThan, 80.0))
        .condition(AlertCondition::new("n", Operator::LessThan, 10.0))
        .build()
        .unwrap();
    manager.add_rule(rule).await.unwrap();

    let results = manager.evaluate(&reading(0, 99.0)).await;
    assert!(!results[0].triggered);
    assert_eq!(results[0].failed_conditions().count(), 1);

    let context = reading(10, 99.0).with_metric("n", vec![5.0]);
    assert!(manager.evaluate(&context).await[0].triggered);
}

#[tokio::test]
async fn test_stats() {
    let (manager, _) = setup(10);
    manager.add_rule(threshold_rule("warn", 0, 0)).await.unwrap();
    manager
        .add_rule(
            threshold_rule("crit", 0, 0)
                .to_builder()
                .severity(Severity::Critical)
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    manager
        .add_rule(threshold_rule("off", 0, 0).to_builder().enabled(false).build().unwrap())
        .await
        .unwrap();

    manager.evaluate(&reading(0, 99.0)).await;
    manager.evaluate(&reading(1, 99.0)).await;

    let stats = manager.get_stats().await;
    assert_eq!(stats.total_rules, 3);
    assert_eq!(stats.active_rules, 2);
    assert_eq!(stats.total_channels, 1);
    assert_eq!(stats.total_alerts, 4);
    assert_eq!(stats.by_severity.critical, 2);
    assert_eq!(stats.by_severity.warning, 2);
    assert_eq!(stats.by_severity.info, 0);
}

#[tokio::test]
async fn test_auto_evaluation_stops() {
    let config = AlertConfig {
        evaluation_interval_ms: 20,
        ..Default::default()
    };
    let manager = Arc::new(AlertManager::new(config).unwrap());
    manager.add_rule(threshold_rule("r", 0, 0)).await.unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let started = manager
        .start_auto_evaluation(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            EvaluationContext::now().with_metric("m", vec![99.0])
        })
        .await;
    assert!(started);
    assert!(!manager.start_auto_evaluation(EvaluationContext::now).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.stop_auto_evaluation().await;
    assert!(!manager.is_auto_evaluating().await);

    let observed = ticks.load(Ordering::SeqCst);
    assert!(observed >= 1);
    assert!(!manager.get_history(None).await.is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), observed);

    manager.stop_auto_evaluation().await;
}

#[tokio::test]
async fn test_anomaly_detection_through_manager() {
    let config = AlertConfig {
        enable_anomaly_detection: true,
        anomaly: Some(AnomalyConfig {
            min_data_points: 20,
            ..Default::default()
        }),
        ..Default::default()
    };
    let manager = AlertManager::new(config).unwrap();

    for i in 0..20 {
        let value = if i % 2 == 0 { 50.0 } else { 51.0 };
        assert!(manager.detect_anomalies("cpu", value, i * 1000).await.is_empty());
    }

    let anomalies = manager.detect_anomalies("cpu", 500.0, 20_000).await;
    assert!(anomalies.iter().any(|a| a.anomaly_type == AnomalyType::Spike));
    assert_eq!(manager.metrics().anomalies("spike"), 1);

    manager.reset_anomaly_profiles().await;
    assert!(manager.detect_anomalies("cpu", 500.0, 21_000).await.is_empty());
}

#[tokio::test]
async fn test_manager_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(ConfigLoader::FILE_NAME),
        r#"
evaluation_interval_ms = 5000
max_history_size = 50

[[channels]]
id = "console"
name = "Console"
type = "console"

[[rules]]
id = "disk"
name = "Disk full"
severity = "critical"
actions = ["console"]

[[rules.conditions]]
metric = "disk.used"
operator = ">="
threshold = 95.0
"#,
    )
    .unwrap();

    let config = ConfigLoader::new(dir.path()).load().unwrap();
    let manager = AlertManager::from_config(config).unwrap();

    assert_eq!(manager.evaluation_interval(), Duration::from_secs(5));
    assert_eq!(manager.get_all_rules().await.len(), 1);
    assert_eq!(manager.get_channels().await.len(), 1);

    let context = EvaluationContext::new(0).with_metric("disk.used", vec![97.0]);
    assert!(manager.evaluate(&context).await[0].triggered);
    assert_eq!(manager.get_history(None).await[0].severity, Severity::Critical);
}
