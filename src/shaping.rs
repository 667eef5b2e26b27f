//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 流量整形模块
//!
//! 每条规则绑定一个独占的流控器实例，流控器根据统计节点与阈值给出准入决策：
//! - [`DefaultController`]: 直接拒绝
//! - [`WarmUpController`]: 预热（令牌桶冷启动）
//! - [`RateLimiterController`]: 匀速排队（虚拟队列）
//! - [`WarmUpRateLimiterController`]: 预热 + 匀速排队
//!
//! 热路径上只有算术运算与原子操作，不做 IO，也不休眠。

pub mod default;
pub mod rate_limiter;
pub mod warm_up;
pub mod warm_up_rate_limiter;

pub use default::DefaultController;
pub use rate_limiter::RateLimiterController;
pub use warm_up::WarmUpController;
pub use warm_up_rate_limiter::WarmUpRateLimiterController;

use crate::clock::Clock;
use crate::config::FlowConfig;
use crate::error::{Decision, FlowGuardError};
use crate::node::StatNode;
use crate::rule::{ControlBehavior, FlowRule, Grade};
use std::sync::Arc;

/// 流量整形控制器 trait
pub trait TrafficShapingController: Send + Sync + std::fmt::Debug {
    /// 检查是否允许通过
    ///
    /// # 参数
    /// - `node`: 已解析的统计节点
    /// - `acquire_count`: 本次请求消耗的许可数
    /// - `prioritized`: 是否为优先请求
    ///
    /// # 返回
    /// - `Ok(Decision)`: 准入决策
    /// - `Err(FlowGuardError::InvalidAcquireCount)`: acquire_count 为 0
    fn can_pass(
        &self,
        node: &dyn StatNode,
        acquire_count: u32,
        prioritized: bool,
    ) -> Result<Decision, FlowGuardError>;
}

/// 验证 acquire_count 参数
pub(crate) fn validate_acquire_count(acquire_count: u32) -> Result<u32, FlowGuardError> {
    if acquire_count == 0 {
        return Err(FlowGuardError::InvalidAcquireCount(acquire_count));
    }
    Ok(acquire_count)
}

/// 为规则创建流控器
///
/// 整形效果只作用于 QPS 阈值；并发线程数阈值总是使用直接拒绝。
pub fn create_controller(
    rule: &FlowRule,
    config: &FlowConfig,
    clock: Arc<dyn Clock>,
) -> Arc<dyn TrafficShapingController> {
    if rule.grade() == Grade::ThreadCount {
        return Arc::new(DefaultController::new(
            rule.count(),
            rule.grade(),
            config.occupy_timeout_ms,
            clock,
        ));
    }

    match rule.control_behavior() {
        ControlBehavior::Reject => Arc::new(DefaultController::new(
            rule.count(),
            rule.grade(),
            config.occupy_timeout_ms,
            clock,
        )),
        ControlBehavior::WarmUp => Arc::new(WarmUpController::new(
            rule.count(),
            rule.warm_up_period_sec(),
            config.cold_factor,
            config.stat_interval_ms,
            clock,
        )),
        ControlBehavior::RateLimiter => Arc::new(RateLimiterController::new(
            rule.count(),
            rule.max_queueing_time_ms(),
            clock,
        )),
        ControlBehavior::WarmUpRateLimiter => Arc::new(WarmUpRateLimiterController::new(
            rule.count(),
            rule.warm_up_period_sec(),
            rule.max_queueing_time_ms(),
            config.cold_factor,
            config.stat_interval_ms,
            clock,
        )),
    }
}
