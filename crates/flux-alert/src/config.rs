use crate::error::{AlertError, Result};
use config::{Config, File, FileFormat};
use flux_notify::ChannelConfig;
use flux_types::AlertRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 异常检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// 灵敏度（0-1），越高有效阈值越低
    pub sensitivity: f64,
    #[serde(alias = "minDataPoints")]
    pub min_data_points: usize,
    #[serde(alias = "stdDevThreshold")]
    pub std_dev_threshold: f64,
    #[serde(alias = "enableSpike")]
    pub enable_spike: bool,
    #[serde(alias = "enableDrop")]
    pub enable_drop: bool,
    #[serde(alias = "enableTrendChange")]
    pub enable_trend_change: bool,
    #[serde(alias = "enableOutlier")]
    pub enable_outlier: bool,
    /// 每个指标保留的滚动窗口上限
    #[serde(alias = "windowSize")]
    pub window_size: usize,
    /// 趋势检测的子窗口长度
    #[serde(alias = "trendWindow")]
    pub trend_window: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            min_data_points: 20,
            std_dev_threshold: 3.0,
            enable_spike: true,
            enable_drop: true,
            enable_trend_change: true,
            enable_outlier: true,
            window_size: 100,
            trend_window: 5,
        }
    }
}

impl AnomalyConfig {
    /// 按灵敏度缩放后的标准差倍数，灵敏度 0.5 时等于 `std_dev_threshold`
    pub fn effective_threshold(&self) -> f64 {
        self.std_dev_threshold * (1.5 - self.sensitivity)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(AlertError::config(format!(
                "sensitivity must be within [0, 1], got {}",
                self.sensitivity
            )));
        }
        if self.min_data_points < 2 {
            return Err(AlertError::config("min_data_points must be at least 2"));
        }
        if self.std_dev_threshold.is_nan() || self.std_dev_threshold <= 0.0 {
            return Err(AlertError::config("std_dev_threshold must be greater than 0"));
        }
        if self.window_size < self.min_data_points {
            return Err(AlertError::config(format!(
                "window_size ({}) cannot be smaller than min_data_points ({})",
                self.window_size, self.min_data_points
            )));
        }
        if self.trend_window < 2 {
            return Err(AlertError::config("trend_window must be at least 2"));
        }
        Ok(())
    }
}

/// 告警系统配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    #[serde(alias = "enableAnomalyDetection")]
    pub enable_anomaly_detection: bool,
    #[serde(alias = "anomalyConfig")]
    pub anomaly: Option<AnomalyConfig>,
    /// 自动评估间隔（毫秒）
    #[serde(alias = "evaluationInterval")]
    pub evaluation_interval_ms: u64,
    #[serde(alias = "maxHistorySize")]
    pub max_history_size: usize,
    pub channels: Vec<ChannelConfig>,
    pub rules: Vec<AlertRule>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enable_anomaly_detection: false,
            anomaly: None,
            evaluation_interval_ms: 10_000,
            max_history_size: 1000,
            channels: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval_ms == 0 {
            return Err(AlertError::config("evaluation_interval_ms must be greater than 0"));
        }
        if self.max_history_size == 0 {
            return Err(AlertError::config("max_history_size must be at least 1"));
        }
        if let Some(anomaly) = &self.anomaly {
            anomaly.validate()?;
        }
        Ok(())
    }

    /// 启用异常检测时使用的配置，未显式给出时取默认值
    pub fn anomaly_config(&self) -> AnomalyConfig {
        self.anomaly.clone().unwrap_or_default()
    }
}

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub const FILE_NAME: &'static str = "alerting.toml";

    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// 加载并校验 `alerting.toml`，文件不存在时返回默认配置
    pub fn load(&self) -> Result<AlertConfig> {
        let config_path = self.config_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(AlertConfig::default());
        }

        Self::load_file(&config_path)
    }

    pub fn load_file(path: &Path) -> Result<AlertConfig> {
        let path_str = path
            .to_str()
            .ok_or_else(|| AlertError::config("Invalid config path"))?;

        let config: AlertConfig = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}
