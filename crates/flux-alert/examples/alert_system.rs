use flux_alert::{AlertConfig, AlertManager, AnomalyConfig, EvaluationContext};
use flux_notify::ChannelConfig;
use flux_types::{Aggregation, AlertCondition, AlertRule, Operator, Severity};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("=== FLUX IOT 告警系统示例 ===\n");

    // 1. 创建告警管理器
    println!("1. 创建告警管理器");
    let config = AlertConfig {
        enable_anomaly_detection: true,
        anomaly: Some(AnomalyConfig {
            min_data_points: 10,
            ..Default::default()
        }),
        evaluation_interval_ms: 200,
        channels: vec![ChannelConfig::new("console", "Console", "console")],
        ..Default::default()
    };
    let manager = Arc::new(AlertManager::new(config)?);

    // 2. 添加规则
    println!("2. 添加告警规则");
    manager
        .add_rule(
            AlertRule::builder("high_cpu", "High CPU")
                .severity(Severity::Warning)
                .condition(
                    AlertCondition::new("cpu.usage", Operator::GreaterThan, 80.0)
                        .with_duration_ms(300)
                        .with_aggregation(Aggregation::Average),
                )
                .cooldown_ms(1_000)
                .label("component", "system")
                .action("console")
                .build()?,
        )
        .await?;
    manager
        .add_rule(
            AlertRule::builder("high_memory", "High memory")
                .severity(Severity::Critical)
                .condition(AlertCondition::new("memory.usage", Operator::GreaterEqual, 90.0))
                .action("console")
                .action("pager")
                .build()?,
        )
        .await?;
    println!("已添加 {} 条告警规则\n", manager.get_all_rules().await.len());

    // 3. 手动评估
    println!("3. 手动评估");
    let context = EvaluationContext::now()
        .with_metric("cpu.usage", vec![70.0, 75.0])
        .with_metric("memory.usage", vec![92.0]);
    for result in manager.evaluate(&context).await {
        println!("  {}: {}", result.rule_id, result.message.unwrap_or_default());
    }
    manager.wait_for_dispatches().await;

    // 4. 自动评估
    println!("\n4. 自动评估");
    let load = Arc::new(AtomicU64::new(70));
    let source = load.clone();
    manager
        .start_auto_evaluation(move || {
            let cpu = source.fetch_add(5, Ordering::Relaxed) as f64;
            EvaluationContext::now().with_metric("cpu.usage", vec![cpu])
        })
        .await;
    sleep(Duration::from_secs(2)).await;
    manager.stop_auto_evaluation().await;
    manager.wait_for_dispatches().await;

    // 5. 异常检测
    println!("\n5. 异常检测");
    for i in 0..10 {
        manager
            .detect_anomalies("temperature", 20.0 + (i % 2) as f64, i * 1000)
            .await;
    }
    for anomaly in manager.detect_anomalies("temperature", 45.0, 10_000).await {
        println!("  [{}] {}", anomaly.anomaly_type, anomaly.message);
    }

    // 6. 统计
    println!("\n6. 统计");
    let stats = manager.get_stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for record in manager.get_deliveries(Some(5)).await {
        println!(
            "  alert {} -> {}/{} delivered",
            record.alert_id,
            record.results.iter().filter(|r| r.success).count(),
            record.results.len()
        );
    }

    Ok(())
}
