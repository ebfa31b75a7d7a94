use crate::anomaly::{Anomaly, AnomalyDetector};
use crate::config::AlertConfig;
use crate::context::EvaluationContext;
use crate::error::{AlertError, Result};
use crate::evaluator::{EvaluationResult, RuleEvaluator};
use crate::history::AlertHistory;
use crate::metrics::AlertMetrics;
use flux_notify::{ChannelConfig, ChannelFactory, NotificationChannel, SendResult};
use flux_types::{Alert, AlertRule, NotificationPayload, Severity};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 自动评估时提供最新指标的数据源
pub trait ContextProvider: Send + Sync + 'static {
    fn context(&self) -> EvaluationContext;
}

impl<F> ContextProvider for F
where
    F: Fn() -> EvaluationContext + Send + Sync + 'static,
{
    fn context(&self) -> EvaluationContext {
        self()
    }
}

/// 单条告警的投递结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRecord {
    pub alert_id: String,
    pub rule_id: String,
    /// 按规则 actions 顺序排列
    pub results: Vec<SendResult>,
}

impl DeliveryRecord {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// 按严重级别统计的告警数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

/// 告警管理器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub total_rules: usize,
    /// 已启用的规则数
    pub active_rules: usize,
    pub total_channels: usize,
    /// 历史中保留的告警数
    pub total_alerts: usize,
    pub by_severity: SeverityCounts,
}

/// 自动评估任务句柄
pub struct AutoEvaluationHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl AutoEvaluationHandle {
    /// 通知任务退出并等待正在进行的评估完成
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join_handle.await;
    }
}

struct RegisteredChannel {
    config: ChannelConfig,
    channel: Arc<dyn NotificationChannel>,
}

#[derive(Default)]
struct Registry {
    /// 按注册顺序评估
    rules: Vec<Arc<AlertRule>>,
    channels: HashMap<String, RegisteredChannel>,
}

impl Registry {
    fn rule_index(&self, rule_id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.id() == rule_id)
    }
}

/// 评估期间独占的可变状态
#[derive(Default)]
struct EngineState {
    evaluator: RuleEvaluator,
    last_fired: HashMap<String, i64>,
}

enum Target {
    Channel(Arc<dyn NotificationChannel>),
    Missing(String),
}

/// 告警管理器
///
/// 持有规则与渠道注册表、条件持续状态、冷却时间戳和告警历史。
/// 评估过程串行执行；触发的告警在评估结束后异步扇出到各渠道，
/// 投递失败不会回滚已写入历史的告警。
pub struct AlertManager {
    evaluation_interval: Duration,
    max_history_size: usize,
    factory: ChannelFactory,
    registry: RwLock<Registry>,
    engine: Mutex<EngineState>,
    history: RwLock<AlertHistory>,
    deliveries: Arc<RwLock<VecDeque<DeliveryRecord>>>,
    dispatches: Mutex<JoinSet<()>>,
    anomaly: Option<Mutex<AnomalyDetector>>,
    metrics: Arc<AlertMetrics>,
    auto_task: Mutex<Option<AutoEvaluationHandle>>,
}

impl AlertManager {
    pub fn new(config: AlertConfig) -> Result<Self> {
        Self::with_factory(config, ChannelFactory::new())
    }

    /// 使用指定的渠道工厂创建，配置中的渠道和规则会立即注册
    pub fn with_factory(config: AlertConfig, factory: ChannelFactory) -> Result<Self> {
        config.validate()?;

        let mut registry = Registry::default();
        for channel_config in &config.channels {
            if registry.channels.contains_key(&channel_config.id) {
                return Err(AlertError::DuplicateChannel(channel_config.id.clone()));
            }
            let channel = factory.create(channel_config)?;
            registry.channels.insert(
                channel_config.id.clone(),
                RegisteredChannel {
                    config: channel_config.clone(),
                    channel,
                },
            );
        }
        for rule in &config.rules {
            if registry.rule_index(rule.id()).is_some() {
                return Err(AlertError::DuplicateRule(rule.id().to_string()));
            }
            registry.rules.push(Arc::new(rule.clone()));
        }

        let anomaly = config
            .enable_anomaly_detection
            .then(|| Mutex::new(AnomalyDetector::new(config.anomaly_config())));

        info!(
            rules = registry.rules.len(),
            channels = registry.channels.len(),
            anomaly_detection = config.enable_anomaly_detection,
            "Alert manager created"
        );

        Ok(Self {
            evaluation_interval: Duration::from_millis(config.evaluation_interval_ms),
            max_history_size: config.max_history_size,
            factory,
            registry: RwLock::new(registry),
            engine: Mutex::new(EngineState::default()),
            history: RwLock::new(AlertHistory::new(config.max_history_size)),
            deliveries: Arc::new(RwLock::new(VecDeque::new())),
            dispatches: Mutex::new(JoinSet::new()),
            anomaly,
            metrics: Arc::new(AlertMetrics::new()?),
            auto_task: Mutex::new(None),
        })
    }

    pub fn from_config(config: AlertConfig) -> Result<Self> {
        Self::new(config)
    }

    pub fn metrics(&self) -> &AlertMetrics {
        &self.metrics
    }

    pub fn evaluation_interval(&self) -> Duration {
        self.evaluation_interval
    }

    // 规则注册表

    pub async fn add_rule(&self, rule: AlertRule) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.rule_index(rule.id()).is_some() {
            return Err(AlertError::DuplicateRule(rule.id().to_string()));
        }
        info!(rule_id = %rule.id(), "Rule added");
        registry.rules.push(Arc::new(rule));
        Ok(())
    }

    /// 替换规则定义，重置其条件状态，冷却时间戳保留
    pub async fn update_rule(&self, rule: AlertRule) -> Result<()> {
        // 与 evaluate 相同的加锁顺序：先 engine 后 registry
        let mut engine = self.engine.lock().await;
        {
            let mut registry = self.registry.write().await;
            let index = registry
                .rule_index(rule.id())
                .ok_or_else(|| AlertError::RuleNotFound(rule.id().to_string()))?;
            registry.rules[index] = Arc::new(rule.clone());
        }

        engine.evaluator.reset_rule(rule.id());
        info!(rule_id = %rule.id(), "Rule updated");
        Ok(())
    }

    /// 删除规则，同时清除其条件状态和冷却时间戳
    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut engine = self.engine.lock().await;
        let removed = {
            let mut registry = self.registry.write().await;
            match registry.rule_index(rule_id) {
                Some(index) => {
                    registry.rules.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            engine.evaluator.reset_rule(rule_id);
            engine.last_fired.remove(rule_id);
            info!(rule_id = %rule_id, "Rule removed");
        }
        removed
    }

    pub async fn get_rule(&self, rule_id: &str) -> Option<AlertRule> {
        let registry = self.registry.read().await;
        registry
            .rule_index(rule_id)
            .map(|index| registry.rules[index].as_ref().clone())
    }

    pub async fn get_all_rules(&self) -> Vec<AlertRule> {
        self.registry
            .read()
            .await
            .rules
            .iter()
            .map(|r| r.as_ref().clone())
            .collect()
    }

    // 渠道注册表

    /// 注册渠道，未知类型或重复 ID 立即失败
    pub async fn add_channel(&self, config: ChannelConfig) -> Result<()> {
        let mut registry = self.registry.write().await;
        if registry.channels.contains_key(&config.id) {
            return Err(AlertError::DuplicateChannel(config.id));
        }

        let channel = self.factory.create(&config)?;
        info!(channel_id = %config.id, channel_type = %config.channel_type, "Channel added");
        registry
            .channels
            .insert(config.id.clone(), RegisteredChannel { config, channel });
        Ok(())
    }

    pub async fn remove_channel(&self, channel_id: &str) -> bool {
        let removed = self
            .registry
            .write()
            .await
            .channels
            .remove(channel_id)
            .is_some();
        if removed {
            info!(channel_id = %channel_id, "Channel removed");
        }
        removed
    }

    pub async fn get_channel(&self, channel_id: &str) -> Option<ChannelConfig> {
        self.registry
            .read()
            .await
            .channels
            .get(channel_id)
            .map(|c| c.config.clone())
    }

    pub async fn get_channels(&self) -> Vec<ChannelConfig> {
        let mut configs: Vec<ChannelConfig> = self
            .registry
            .read()
            .await
            .channels
            .values()
            .map(|c| c.config.clone())
            .collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    // 评估

    /// 对所有已启用规则执行一次评估
    ///
    /// 返回每条已启用规则的评估结果。触发且不在冷却期的规则生成告警并写入历史，
    /// 通知在评估结束后异步发送，可用 [`AlertManager::wait_for_dispatches`] 等待。
    pub async fn evaluate(&self, context: &EvaluationContext) -> Vec<EvaluationResult> {
        let started = Instant::now();
        let now = context.timestamp;

        let mut engine = self.engine.lock().await;
        let (rules, channels) = {
            let registry = self.registry.read().await;
            let channels: HashMap<String, Arc<dyn NotificationChannel>> = registry
                .channels
                .iter()
                .map(|(id, c)| (id.clone(), Arc::clone(&c.channel)))
                .collect();
            (registry.rules.clone(), channels)
        };

        let mut results = Vec::with_capacity(rules.len());
        let mut fired = Vec::new();

        for rule in rules.iter().filter(|r| r.is_enabled()) {
            let result = engine.evaluator.evaluate(rule, context);

            if result.triggered {
                self.metrics.record_rule_triggered(rule.id());

                let cooldown = i64::try_from(rule.cooldown_ms()).unwrap_or(i64::MAX);
                let cooling_down = engine
                    .last_fired
                    .get(rule.id())
                    .is_some_and(|&fired_at| now.saturating_sub(fired_at) < cooldown);

                if cooling_down {
                    debug!(rule_id = %rule.id(), "Alert suppressed by cooldown");
                    self.metrics.record_alert_suppressed(rule.id());
                } else {
                    let message = result
                        .message
                        .clone()
                        .unwrap_or_else(|| format!("{} triggered", rule.name()));
                    let alert = Alert::new(rule, message, now);
                    engine.last_fired.insert(rule.id().to_string(), now);
                    self.metrics.record_alert_fired(alert.severity);

                    info!(
                        rule_id = %rule.id(),
                        alert_id = %alert.id,
                        severity = %alert.severity,
                        "Alert fired"
                    );

                    self.history.write().await.push(alert.clone());
                    fired.push((alert, Arc::clone(rule)));
                }
            }

            results.push(result);
        }
        drop(engine);

        self.metrics
            .record_evaluation(started.elapsed().as_secs_f64());

        if !fired.is_empty() {
            let mut dispatches = self.dispatches.lock().await;
            while let Some(joined) = dispatches.try_join_next() {
                if let Err(e) = joined {
                    error!("Dispatch task failed: {}", e);
                }
            }
            for (alert, rule) in fired {
                self.dispatch(&mut dispatches, alert, &rule, &channels);
            }
        }

        results
    }

    fn dispatch(
        &self,
        dispatches: &mut JoinSet<()>,
        alert: Alert,
        rule: &AlertRule,
        channels: &HashMap<String, Arc<dyn NotificationChannel>>,
    ) {
        let mut targets = Vec::with_capacity(rule.actions().len());
        for channel_id in rule.actions() {
            match channels.get(channel_id) {
                Some(channel) if channel.is_enabled() => {
                    targets.push(Target::Channel(Arc::clone(channel)));
                }
                Some(_) => {
                    debug!(channel_id = %channel_id, rule_id = %rule.id(), "Skipping disabled channel");
                }
                None => {
                    warn!(channel_id = %channel_id, rule_id = %rule.id(), "Channel not registered, skipping");
                    targets.push(Target::Missing(channel_id.clone()));
                }
            }
        }

        if targets.is_empty() {
            return;
        }

        let payload = NotificationPayload::new(&alert, rule.clone());
        let metrics = Arc::clone(&self.metrics);
        let deliveries = Arc::clone(&self.deliveries);
        let capacity = self.max_history_size;

        dispatches.spawn(async move {
            let payload = &payload;
            let metrics = &metrics;
            let sends = targets.into_iter().map(|target| async move {
                match target {
                    Target::Channel(channel) => {
                        let result = channel.send(payload).await;
                        metrics.record_notification(channel.channel_type(), result.success);
                        if let Some(err) = &result.error {
                            error!(
                                channel_id = %channel.id(),
                                alert_id = %payload.alert_id,
                                "Notification failed: {}",
                                err
                            );
                        }
                        result
                    }
                    Target::Missing(channel_id) => {
                        SendResult::failure(channel_id, "channel not registered")
                    }
                }
            });
            let results = join_all(sends).await;

            let mut records = deliveries.write().await;
            if records.len() >= capacity {
                records.pop_front();
            }
            records.push_back(DeliveryRecord {
                alert_id: alert.id,
                rule_id: alert.rule_id,
                results,
            });
        });
    }

    /// 等待所有已发起的通知完成
    pub async fn wait_for_dispatches(&self) {
        let mut pending = std::mem::take(&mut *self.dispatches.lock().await);
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                error!("Dispatch task failed: {}", e);
            }
        }
    }

    // 只读视图

    /// 最近的 `limit` 条告警，按时间从旧到新
    pub async fn get_history(&self, limit: Option<usize>) -> Vec<Alert> {
        self.history.read().await.recent(limit)
    }

    pub async fn get_history_for_rule(&self, rule_id: &str) -> Vec<Alert> {
        self.history.read().await.for_rule(rule_id)
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }

    /// 最近的 `limit` 条投递记录，按完成顺序
    pub async fn get_deliveries(&self, limit: Option<usize>) -> Vec<DeliveryRecord> {
        let records = self.deliveries.read().await;
        let skip = limit.map_or(0, |limit| records.len().saturating_sub(limit));
        records.iter().skip(skip).cloned().collect()
    }

    pub async fn get_stats(&self) -> AlertStats {
        let (total_rules, active_rules, total_channels) = {
            let registry = self.registry.read().await;
            (
                registry.rules.len(),
                registry.rules.iter().filter(|r| r.is_enabled()).count(),
                registry.channels.len(),
            )
        };

        let history = self.history.read().await;
        let mut by_severity = SeverityCounts::default();
        for alert in history.iter() {
            match alert.severity {
                Severity::Critical => by_severity.critical += 1,
                Severity::Warning => by_severity.warning += 1,
                Severity::Info => by_severity.info += 1,
            }
        }

        AlertStats {
            total_rules,
            active_rules,
            total_channels,
            total_alerts: history.len(),
            by_severity,
        }
    }

    // 异常检测

    pub fn anomaly_detection_enabled(&self) -> bool {
        self.anomaly.is_some()
    }

    /// 将一条读数交给异常检测器，未启用异常检测时返回空列表
    pub async fn detect_anomalies(&self, metric: &str, value: f64, timestamp: i64) -> Vec<Anomaly> {
        let Some(detector) = &self.anomaly else {
            return Vec::new();
        };

        let anomalies = detector.lock().await.detect(metric, value, timestamp);
        for anomaly in &anomalies {
            self.metrics.record_anomaly(anomaly.anomaly_type.as_str());
            info!(
                metric = %metric,
                anomaly_type = %anomaly.anomaly_type,
                confidence = anomaly.confidence,
                "{}",
                anomaly.message
            );
        }
        anomalies
    }

    pub async fn reset_anomaly_profiles(&self) {
        if let Some(detector) = &self.anomaly {
            detector.lock().await.reset();
        }
    }

    // 自动评估

    /// 按配置的间隔自动评估，每次从 `provider` 获取最新上下文
    ///
    /// 首次评估发生在一个间隔之后。已在运行时返回 `false`。
    pub async fn start_auto_evaluation<P: ContextProvider>(self: &Arc<Self>, provider: P) -> bool {
        let mut slot = self.auto_task.lock().await;
        if slot.is_some() {
            warn!("Auto evaluation already running");
            return false;
        }

        let period = self.evaluation_interval;
        let manager: Weak<Self> = Arc::downgrade(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        let context = provider.context();
                        manager.evaluate(&context).await;
                    }
                }
            }

            debug!("Auto evaluation loop exited");
        });

        *slot = Some(AutoEvaluationHandle {
            shutdown_tx,
            join_handle,
        });
        info!(interval_ms = period.as_millis() as u64, "Auto evaluation started");
        true
    }

    /// 停止自动评估；返回后不会再开始新的评估，可重复调用
    pub async fn stop_auto_evaluation(&self) {
        let handle = self.auto_task.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Auto evaluation stopped");
        }
    }

    pub async fn is_auto_evaluating(&self) -> bool {
        self.auto_task.lock().await.is_some()
    }
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        // 未完成的投递继续在运行时中执行，不随管理器一起取消
        self.dispatches.get_mut().detach_all();
    }
}
