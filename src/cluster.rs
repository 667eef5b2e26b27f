//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 集群模式适配
//!
//! 集群模式的规则用集群聚合计数替换本地统计节点。集群计数不可用、
//! 配置不完整或未配置计数服务时，回退到本地统计继续限流，从不放开限制。

use crate::error::{ClusterError, FlowGuardError};
use crate::node::StatNode;
use crate::rule::{ClusterThresholdType, FlowRule};
use tracing::{debug, warn};

/// 集群计数能力（由外部集群通信组件实现）
pub trait ClusterCounter: Send + Sync {
    /// 集群聚合的当前指标
    fn cluster_metric(&self, flow_id: u64) -> Result<f64, ClusterError>;

    /// 集群聚合的上一窗口通过 QPS，预热类规则用它补充令牌
    ///
    /// 未单独维护上一窗口数据的实现沿用当前指标。
    fn previous_cluster_metric(&self, flow_id: u64) -> Result<f64, ClusterError> {
        self.cluster_metric(flow_id)
    }

    /// 参与该 flow 的实例数
    fn connected_count(&self, _flow_id: u64) -> Result<u32, ClusterError> {
        Ok(1)
    }
}

/// 集群指标快照节点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterStatNode {
    metric: f64,
    previous: f64,
}

impl ClusterStatNode {
    /// 上一窗口值与当前值相同的节点
    pub fn new(metric: f64) -> Self {
        Self::with_previous(metric, metric)
    }

    pub fn with_previous(metric: f64, previous: f64) -> Self {
        Self {
            metric: metric.max(0.0),
            previous: previous.max(0.0),
        }
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }
}

impl StatNode for ClusterStatNode {
    fn pass_qps(&self) -> f64 {
        self.metric
    }

    fn previous_pass_qps(&self) -> f64 {
        self.previous
    }

    fn previous_block_qps(&self) -> f64 {
        0.0
    }

    fn cur_thread_num(&self) -> u32 {
        self.metric.round() as u32
    }
}

/// 读取 (当前指标, 上一窗口指标)，按阈值类型折算成单机值
///
/// 只有预热类规则读取上一窗口指标，其余规则沿用当前值。
fn fetch_metrics(
    rule: &FlowRule,
    threshold_type: ClusterThresholdType,
    counter: &dyn ClusterCounter,
    flow_id: u64,
) -> Result<(f64, f64), ClusterError> {
    let metric = counter.cluster_metric(flow_id)?;
    let previous = if rule.control_behavior().uses_warm_up() {
        counter.previous_cluster_metric(flow_id)?
    } else {
        metric
    };

    match threshold_type {
        ClusterThresholdType::Global => Ok((metric, previous)),
        ClusterThresholdType::AvgLocal => {
            let instances = f64::from(counter.connected_count(flow_id)?.max(1));
            Ok((metric / instances, previous / instances))
        }
    }
}

/// 为集群模式规则获取集群指标
///
/// 返回 None 表示应使用本地节点。
pub fn cluster_node(rule: &FlowRule, counter: Option<&dyn ClusterCounter>) -> Option<ClusterStatNode> {
    if !rule.is_cluster_mode() {
        return None;
    }

    let Some(config) = rule.cluster_config() else {
        warn!("集群规则缺少集群配置，回退本地限流: {}", rule);
        return None;
    };

    let Some(flow_id) = config.valid_flow_id() else {
        warn!("集群配置不完整，回退本地限流: {}", rule);
        return None;
    };

    let Some(counter) = counter else {
        debug!("未配置集群计数服务，回退本地限流: flow_id={}", flow_id);
        return None;
    };

    let fetched = fetch_metrics(rule, config.threshold_type, counter, flow_id);

    match fetched {
        Ok((metric, previous)) if metric.is_finite() && previous.is_finite() => {
            Some(ClusterStatNode::with_previous(metric, previous))
        }
        Ok((metric, previous)) => {
            warn!(
                "集群指标非法，回退本地限流: flow_id={}, metric={}, previous={}",
                flow_id, metric, previous
            );
            None
        }
        Err(e) => {
            let err = FlowGuardError::from(e);
            warn!("{}，回退本地限流: flow_id={}", err, flow_id);
            None
        }
    }
}
