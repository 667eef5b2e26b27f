//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 流控规则模型
//!
//! 每条流控规则由三个要素组成：
//! - **grade**: 阈值类型（QPS 或并发线程数）
//! - **strategy**: 基于调用关系的流控模式（直接、关联、链路）
//! - **control_behavior**: 超过阈值时的流量整形效果
//!
//! 规则是构造后不可变的值；绑定的流控器不属于规则本身，
//! 相等性与哈希只覆盖配置字段。

use crate::constants::{
    DEFAULT_CLUSTER_SAMPLE_COUNT, DEFAULT_CLUSTER_WINDOW_INTERVAL_MS,
    DEFAULT_MAX_QUEUEING_TIME_MS, DEFAULT_WARM_UP_PERIOD_SEC, LIMIT_APP_DEFAULT,
};
use crate::error::FlowGuardError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// 阈值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    /// 并发线程数
    ThreadCount,
    /// 每秒请求数
    #[default]
    Qps,
}

/// 流控模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// 直接：按资源自身（或来源）的统计限流
    #[default]
    Direct,
    /// 关联：按关联资源的统计限流
    Relate,
    /// 链路：只统计从指定入口资源进入的调用
    Chain,
}

/// 流量整形效果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlBehavior {
    /// 直接拒绝
    #[default]
    Reject,
    /// 预热
    WarmUp,
    /// 匀速排队
    RateLimiter,
    /// 预热 + 匀速排队
    WarmUpRateLimiter,
}

impl ControlBehavior {
    /// 是否包含预热阶段
    pub fn uses_warm_up(&self) -> bool {
        matches!(
            self,
            ControlBehavior::WarmUp | ControlBehavior::WarmUpRateLimiter
        )
    }
}

/// 集群阈值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterThresholdType {
    /// 阈值按单机计算，集群总量均摊到每个实例
    #[default]
    AvgLocal,
    /// 阈值为集群总量
    Global,
}

/// 集群流控配置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterFlowConfig {
    /// 全局唯一的 flow id
    pub flow_id: Option<u64>,
    /// 阈值类型
    pub threshold_type: ClusterThresholdType,
    /// 统计窗口分桶数
    pub sample_count: u32,
    /// 统计窗口长度（毫秒）
    pub window_interval_ms: u32,
}

impl Default for ClusterFlowConfig {
    fn default() -> Self {
        Self {
            flow_id: None,
            threshold_type: ClusterThresholdType::default(),
            sample_count: DEFAULT_CLUSTER_SAMPLE_COUNT,
            window_interval_ms: DEFAULT_CLUSTER_WINDOW_INTERVAL_MS,
        }
    }
}

impl ClusterFlowConfig {
    pub fn new(flow_id: u64) -> Self {
        Self {
            flow_id: Some(flow_id),
            ..Default::default()
        }
    }

    pub fn threshold_type(mut self, threshold_type: ClusterThresholdType) -> Self {
        self.threshold_type = threshold_type;
        self
    }

    /// 返回可用的 flow id；配置不完整时返回 None
    pub fn valid_flow_id(&self) -> Option<u64> {
        let flow_id = self.flow_id.filter(|id| *id > 0)?;
        let window_ok = self.sample_count > 0
            && self.window_interval_ms > 0
            && self.window_interval_ms % self.sample_count == 0;
        window_ok.then_some(flow_id)
    }
}

/// 流控规则
///
/// # 示例
/// ```rust
/// use flowguard::rule::{ControlBehavior, FlowRule, Grade};
///
/// let rule = FlowRule::new("order-api")
///     .with_grade(Grade::Qps)
///     .with_count(100.0)
///     .with_control_behavior(ControlBehavior::RateLimiter);
/// assert!(rule.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRule {
    resource: String,
    limit_app: String,
    grade: Grade,
    count: f64,
    strategy: Strategy,
    ref_resource: Option<String>,
    control_behavior: ControlBehavior,
    warm_up_period_sec: u32,
    max_queueing_time_ms: u32,
    cluster_mode: bool,
    cluster_config: Option<ClusterFlowConfig>,
}

impl Default for FlowRule {
    fn default() -> Self {
        Self {
            resource: String::new(),
            limit_app: LIMIT_APP_DEFAULT.to_string(),
            grade: Grade::default(),
            count: 0.0,
            strategy: Strategy::default(),
            ref_resource: None,
            control_behavior: ControlBehavior::default(),
            warm_up_period_sec: DEFAULT_WARM_UP_PERIOD_SEC,
            max_queueing_time_ms: DEFAULT_MAX_QUEUEING_TIME_MS,
            cluster_mode: false,
            cluster_config: None,
        }
    }
}

impl FlowRule {
    /// 为资源创建一条默认规则（QPS、直接、直接拒绝）
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Default::default()
        }
    }

    pub fn with_limit_app(mut self, limit_app: impl Into<String>) -> Self {
        self.limit_app = limit_app.into();
        self
    }

    pub fn with_grade(mut self, grade: Grade) -> Self {
        self.grade = grade;
        self
    }

    pub fn with_count(mut self, count: f64) -> Self {
        self.count = count;
        self
    }

    /// 设置流控模式及其引用资源（关联资源或入口资源）
    pub fn with_strategy(mut self, strategy: Strategy, ref_resource: Option<&str>) -> Self {
        self.strategy = strategy;
        self.ref_resource = ref_resource.map(str::to_string);
        self
    }

    pub fn with_control_behavior(mut self, control_behavior: ControlBehavior) -> Self {
        self.control_behavior = control_behavior;
        self
    }

    pub fn with_warm_up_period_sec(mut self, warm_up_period_sec: u32) -> Self {
        self.warm_up_period_sec = warm_up_period_sec;
        self
    }

    pub fn with_max_queueing_time_ms(mut self, max_queueing_time_ms: u32) -> Self {
        self.max_queueing_time_ms = max_queueing_time_ms;
        self
    }

    /// 开启集群模式
    pub fn with_cluster(mut self, cluster_config: ClusterFlowConfig) -> Self {
        self.cluster_mode = true;
        self.cluster_config = Some(cluster_config);
        self
    }

    pub fn with_cluster_mode(mut self, cluster_mode: bool) -> Self {
        self.cluster_mode = cluster_mode;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn limit_app(&self) -> &str {
        &self.limit_app
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn ref_resource(&self) -> Option<&str> {
        self.ref_resource.as_deref()
    }

    pub fn control_behavior(&self) -> ControlBehavior {
        self.control_behavior
    }

    pub fn warm_up_period_sec(&self) -> u32 {
        self.warm_up_period_sec
    }

    pub fn max_queueing_time_ms(&self) -> u32 {
        self.max_queueing_time_ms
    }

    pub fn is_cluster_mode(&self) -> bool {
        self.cluster_mode
    }

    pub fn cluster_config(&self) -> Option<&ClusterFlowConfig> {
        self.cluster_config.as_ref()
    }

    /// 空白的 limit_app 视为 "default"
    pub(crate) fn normalized(mut self) -> Self {
        if self.limit_app.trim().is_empty() {
            self.limit_app = LIMIT_APP_DEFAULT.to_string();
        }
        self
    }

    /// 校验规则
    pub fn validate(&self) -> Result<(), FlowGuardError> {
        let invalid = |reason: &str| FlowGuardError::InvalidRule {
            resource: self.resource.clone(),
            reason: reason.to_string(),
        };

        if self.resource.trim().is_empty() {
            return Err(invalid("资源名不能为空"));
        }

        if !self.count.is_finite() || self.count < 0.0 {
            return Err(invalid("阈值必须是非负有限数"));
        }

        let has_ref = self
            .ref_resource
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        match self.strategy {
            Strategy::Direct if has_ref => {
                return Err(invalid("直接模式不能设置引用资源"));
            }
            Strategy::Relate | Strategy::Chain if !has_ref => {
                return Err(invalid("关联/链路模式必须设置引用资源"));
            }
            _ => {}
        }

        if self.control_behavior.uses_warm_up() && self.warm_up_period_sec == 0 {
            return Err(invalid("预热时长必须大于0"));
        }

        Ok(())
    }
}

impl PartialEq for FlowRule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.limit_app == other.limit_app
            && self.grade == other.grade
            && self.count.to_bits() == other.count.to_bits()
            && self.strategy == other.strategy
            && self.ref_resource == other.ref_resource
            && self.control_behavior == other.control_behavior
            && self.warm_up_period_sec == other.warm_up_period_sec
            && self.max_queueing_time_ms == other.max_queueing_time_ms
            && self.cluster_mode == other.cluster_mode
            && self.cluster_config == other.cluster_config
    }
}

impl Eq for FlowRule {}

impl Hash for FlowRule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.limit_app.hash(state);
        self.grade.hash(state);
        self.count.to_bits().hash(state);
        self.strategy.hash(state);
        self.ref_resource.hash(state);
        self.control_behavior.hash(state);
        self.warm_up_period_sec.hash(state);
        self.max_queueing_time_ms.hash(state);
        self.cluster_mode.hash(state);
        self.cluster_config.hash(state);
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FlowRule{{resource={}, limit_app={}, grade={:?}, count={}, strategy={:?}, ref_resource={:?}, control_behavior={:?}, cluster_mode={}}}",
            self.resource,
            self.limit_app,
            self.grade,
            self.count,
            self.strategy,
            self.ref_resource,
            self.control_behavior,
            self.cluster_mode
        )
    }
}
