use crate::condition::AlertCondition;
use crate::error::{Result, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// 告警级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = RuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(RuleError::InvalidSeverity(other.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// 告警规则
///
/// 通过 [`AlertRuleBuilder`] 构建，构建后不可变。条件之间按逻辑与组合，
/// `actions` 为需要通知的渠道 ID 列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AlertRuleDef")]
pub struct AlertRule {
    id: String,
    name: String,
    description: String,
    severity: Severity,
    conditions: Vec<AlertCondition>,
    cooldown_ms: u64,
    tags: BTreeSet<String>,
    labels: BTreeMap<String, String>,
    actions: Vec<String>,
    enabled: bool,
}

impl AlertRule {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> AlertRuleBuilder {
        AlertRuleBuilder::new(id, name)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn conditions(&self) -> &[AlertCondition] {
        &self.conditions
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// 需要通知的渠道 ID（保持声明顺序）
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// 基于当前规则创建构建器，用于生成修改后的新规则
    pub fn to_builder(&self) -> AlertRuleBuilder {
        AlertRuleBuilder {
            def: AlertRuleDef {
                id: self.id.clone(),
                name: self.name.clone(),
                description: self.description.clone(),
                severity: self.severity,
                conditions: self.conditions.clone(),
                cooldown_ms: self.cooldown_ms,
                tags: self.tags.clone(),
                labels: self.labels.clone(),
                actions: self.actions.clone(),
                enabled: self.enabled,
            },
        }
    }
}

/// 规则的原始定义，反序列化时经过校验再转换为 [`AlertRule`]
#[derive(Debug, Clone, Deserialize)]
struct AlertRuleDef {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: Severity,
    #[serde(default)]
    conditions: Vec<AlertCondition>,
    #[serde(default, alias = "cooldown")]
    cooldown_ms: u64,
    #[serde(default)]
    tags: BTreeSet<String>,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<AlertRuleDef> for AlertRule {
    type Error = RuleError;

    fn try_from(def: AlertRuleDef) -> Result<Self> {
        if def.id.trim().is_empty() {
            return Err(RuleError::EmptyId);
        }
        if def.conditions.is_empty() {
            return Err(RuleError::NoConditions(def.id));
        }

        let mut actions: Vec<String> = Vec::with_capacity(def.actions.len());
        for action in def.actions {
            if !actions.contains(&action) {
                actions.push(action);
            }
        }

        Ok(Self {
            id: def.id,
            name: def.name,
            description: def.description,
            severity: def.severity,
            conditions: def.conditions,
            cooldown_ms: def.cooldown_ms,
            tags: def.tags,
            labels: def.labels,
            actions,
            enabled: def.enabled,
        })
    }
}

/// 告警规则构建器
#[derive(Debug, Clone)]
pub struct AlertRuleBuilder {
    def: AlertRuleDef,
}

impl AlertRuleBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            def: AlertRuleDef {
                id: id.into(),
                name: name.into(),
                description: String::new(),
                severity: Severity::default(),
                conditions: Vec::new(),
                cooldown_ms: 0,
                tags: BTreeSet::new(),
                labels: BTreeMap::new(),
                actions: Vec::new(),
                enabled: true,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.def.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.def.description = description.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.def.severity = severity;
        self
    }

    pub fn condition(mut self, condition: AlertCondition) -> Self {
        self.def.conditions.push(condition);
        self
    }

    pub fn clear_conditions(mut self) -> Self {
        self.def.conditions.clear();
        self
    }

    pub fn cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.def.cooldown_ms = cooldown_ms;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.def.tags.insert(tag.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.def.labels.insert(key.into(), value.into());
        self
    }

    pub fn action(mut self, channel_id: impl Into<String>) -> Self {
        self.def.actions.push(channel_id.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.def.enabled = enabled;
        self
    }

    pub fn build(self) -> Result<AlertRule> {
        AlertRule::try_from(self.def)
    }
}
