//! 滚动统计异常检测。
//!
//! 每个指标维护一个有界窗口，新读数先与插入前的窗口统计比较，再写入窗口：
//!
//! - spike / drop：z-score 超过有效阈值（方向性）
//! - outlier：相对窗口线性趋势预测值的残差超过有效阈值
//! - trend_change：最近子窗口与前一子窗口的斜率方向反转且幅度足够
//!
//! 有效阈值为 `std_dev_threshold * (1.5 - sensitivity)`。窗口样本数不足
//! `min_data_points` 时只记录、不检测。

use crate::config::AnomalyConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::iter;
use tracing::debug;

/// 异常类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Spike,
    Drop,
    TrendChange,
    Outlier,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spike => "spike",
            Self::Drop => "drop",
            Self::TrendChange => "trend_change",
            Self::Outlier => "outlier",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 检测到的异常
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub metric: String,
    pub anomaly_type: AnomalyType,
    pub value: f64,
    /// 期望值（均值、趋势预测值或延续前一趋势的值）
    pub expected: f64,
    /// 以标准差为单位的偏离程度
    pub deviation: f64,
    /// 置信度，范围 (0, 1]
    pub confidence: f64,
    pub timestamp: i64,
    pub message: String,
}

/// 单个指标的滚动窗口
#[derive(Debug, Clone)]
pub struct AnomalyProfile {
    window: VecDeque<(f64, i64)>,
    capacity: usize,
    sum: f64,
    slope_sign: i8,
}

impl AnomalyProfile {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
            slope_sign: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.sum / self.window.len() as f64
    }

    /// 总体标准差
    pub fn std_dev(&self) -> f64 {
        let n = self.window.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .window
            .iter()
            .map(|&(v, _)| (v - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        variance.sqrt()
    }

    /// 最近一次斜率估计的方向：1 上升，-1 下降，0 持平或未知
    pub fn slope_sign(&self) -> i8 {
        self.slope_sign
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().map(|&(v, _)| v)
    }

    fn push(&mut self, value: f64, timestamp: i64) {
        if self.window.len() >= self.capacity {
            if let Some((old, _)) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.window.push_back((value, timestamp));
        self.sum += value;
    }

    /// 浮点比较容差，随数据量级缩放
    fn tolerance(&self) -> f64 {
        1e-9 * self.mean().abs().max(self.std_dev()).max(1.0)
    }

    fn sign(&self, slope: f64) -> i8 {
        let tolerance = self.tolerance();
        if slope > tolerance {
            1
        } else if slope < -tolerance {
            -1
        } else {
            0
        }
    }

    /// 以窗口拟合的直线预测 `timestamp` 处的值，返回 (预测值, 残差标准差)
    ///
    /// 横轴优先使用时间戳，时间戳全部相同时退化为样本下标。
    fn predict(&self, timestamp: i64) -> Option<(f64, f64)> {
        let n = self.window.len();
        if n < 3 {
            return None;
        }

        let origin = self.window.front()?.1;
        let use_time = self.window.iter().any(|&(_, t)| t != origin);
        let points: Vec<(f64, f64)> = self
            .window
            .iter()
            .enumerate()
            .map(|(i, &(v, t))| {
                let x = if use_time { (t - origin) as f64 } else { i as f64 };
                (x, v)
            })
            .collect();
        let x_new = if use_time {
            (timestamp - origin) as f64
        } else {
            n as f64
        };

        let (intercept, slope) = linear_fit(&points)?;
        let residual_variance = points
            .iter()
            .map(|&(x, y)| (y - (intercept + slope * x)).powi(2))
            .sum::<f64>()
            / n as f64;

        Some((intercept + slope * x_new, residual_variance.sqrt()))
    }

    /// 前一子窗口与最近子窗口（含新读数）的斜率
    fn sub_window_slopes(&self, value: f64, trend_window: usize) -> Option<(f64, f64)> {
        let n = self.window.len();
        if trend_window < 2 || n + 1 < 2 * trend_window {
            return None;
        }

        let recent: Vec<f64> = self
            .values()
            .skip(n + 1 - trend_window)
            .chain(iter::once(value))
            .collect();
        let prior: Vec<f64> = self
            .values()
            .skip(n + 1 - 2 * trend_window)
            .take(trend_window)
            .collect();

        Some((index_slope(&prior)?, index_slope(&recent)?))
    }
}

/// 最小二乘拟合，返回 (截距, 斜率)
fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();

    let slope = sxy / sxx;
    Some((mean_y - slope * mean_x, slope))
}

fn index_slope(values: &[f64]) -> Option<f64> {
    let points: Vec<(f64, f64)> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v))
        .collect();
    linear_fit(&points).map(|(_, slope)| slope)
}

/// 以 `scale` 为单位表示偏差，`scale` 近似为 0 时任何非零偏差都视为无穷大
fn standardize(diff: f64, scale: f64, tolerance: f64) -> f64 {
    if scale > tolerance {
        diff / scale
    } else if diff.abs() <= tolerance {
        0.0
    } else {
        diff.signum() * f64::INFINITY
    }
}

fn confidence(deviation: f64, threshold: f64) -> f64 {
    (deviation.abs() / (2.0 * threshold)).min(1.0)
}

/// 异常检测器
#[derive(Debug)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
    profiles: HashMap<String, AnomalyProfile>,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            config,
            profiles: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// 检测一条新读数，返回本次发现的全部异常（可能为空或多个）
    pub fn detect(&mut self, metric: &str, value: f64, timestamp: i64) -> Vec<Anomaly> {
        if !value.is_finite() {
            debug!(metric = %metric, "Ignoring non-finite reading");
            return Vec::new();
        }

        let config = &self.config;
        let capacity = config.window_size.max(config.min_data_points).max(1);
        let profile = self
            .profiles
            .entry(metric.to_string())
            .or_insert_with(|| AnomalyProfile::new(capacity));

        if profile.len() < config.min_data_points {
            profile.push(value, timestamp);
            return Vec::new();
        }

        let threshold = config.effective_threshold();
        let mean = profile.mean();
        let std_dev = profile.std_dev();
        let tolerance = profile.tolerance();
        let z = standardize(value - mean, std_dev, tolerance);

        let mut anomalies = Vec::new();
        let mut report = |anomaly_type: AnomalyType, expected: f64, deviation: f64, message: String| {
            anomalies.push(Anomaly {
                metric: metric.to_string(),
                anomaly_type,
                value,
                expected,
                deviation,
                confidence: confidence(deviation, threshold),
                timestamp,
                message,
            });
        };

        if config.enable_spike && z > threshold {
            report(
                AnomalyType::Spike,
                mean,
                z,
                format!("{metric} spiked to {value:.2} ({z:.2} std devs above mean {mean:.2})"),
            );
        }

        if config.enable_drop && z < -threshold {
            report(
                AnomalyType::Drop,
                mean,
                z,
                format!(
                    "{metric} dropped to {value:.2} ({:.2} std devs below mean {mean:.2})",
                    -z
                ),
            );
        }

        if config.enable_outlier {
            if let Some((predicted, residual_std)) = profile.predict(timestamp) {
                let residual_z = standardize(value - predicted, residual_std, tolerance);
                if residual_z.abs() > threshold {
                    report(
                        AnomalyType::Outlier,
                        predicted,
                        residual_z,
                        format!(
                            "{metric} value {value:.2} diverges from trend prediction {predicted:.2} ({residual_z:.2} residual std devs)"
                        ),
                    );
                }
            }
        }

        let slopes = profile.sub_window_slopes(value, config.trend_window);
        if config.enable_trend_change {
            if let Some((prior, recent)) = slopes {
                let (prior_sign, recent_sign) = (profile.sign(prior), profile.sign(recent));
                if prior_sign != 0 && recent_sign != 0 && prior_sign != recent_sign {
                    let scale = std_dev.max(tolerance);
                    let magnitude = (recent - prior).abs() * config.trend_window as f64 / scale;
                    if magnitude > threshold {
                        let expected = profile.values().last().unwrap_or(mean) + prior;
                        report(
                            AnomalyType::TrendChange,
                            expected,
                            magnitude,
                            format!(
                                "{metric} trend reversed (slope {prior:.3} -> {recent:.3})"
                            ),
                        );
                    }
                }
            }
        }

        if let Some((_, recent)) = slopes {
            profile.slope_sign = profile.sign(recent);
        }
        profile.push(value, timestamp);

        anomalies
    }

    pub fn profile(&self, metric: &str) -> Option<&AnomalyProfile> {
        self.profiles.get(metric)
    }

    pub fn tracked_metrics(&self) -> usize {
        self.profiles.len()
    }

    /// 清除所有指标的窗口
    pub fn reset(&mut self) {
        self.profiles.clear();
    }

    pub fn reset_metric(&mut self, metric: &str) -> bool {
        self.profiles.remove(metric).is_some()
    }
}
