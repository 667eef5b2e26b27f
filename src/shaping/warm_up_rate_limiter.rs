//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 预热 + 匀速排队流控器

use super::rate_limiter::{cost_micros, VirtualQueue};
use super::warm_up::WarmUpBucket;
use super::{validate_acquire_count, TrafficShapingController};
use crate::clock::Clock;
use crate::error::{Decision, FlowGuardError};
use crate::node::StatNode;
use std::sync::Arc;

/// 预热 + 匀速排队流控器
///
/// 预热阶段计算出当前允许的速率，作为匀速排队的速率：
/// 预热期间请求仍然排队，只是间隔更长，随预热完成逐步缩短到 `1 / count`。
#[derive(Debug)]
pub struct WarmUpRateLimiterController {
    bucket: WarmUpBucket,
    queue: VirtualQueue,
    clock: Arc<dyn Clock>,
}

impl WarmUpRateLimiterController {
    pub fn new(
        count: f64,
        warm_up_period_sec: u32,
        max_queueing_time_ms: u32,
        cold_factor: u32,
        align_ms: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bucket: WarmUpBucket::new(count, warm_up_period_sec, cold_factor, align_ms),
            queue: VirtualQueue::new(max_queueing_time_ms),
            clock,
        }
    }
}

impl TrafficShapingController for WarmUpRateLimiterController {
    fn can_pass(
        &self,
        node: &dyn StatNode,
        acquire_count: u32,
        _prioritized: bool,
    ) -> Result<Decision, FlowGuardError> {
        let acquire_count = validate_acquire_count(acquire_count)?;

        if self.bucket.count() <= 0.0 {
            return Ok(Decision::Reject);
        }

        let now_micros = self.clock.now_micros();
        let rest = self
            .bucket
            .sync(now_micros / 1_000, node.previous_pass_qps());
        let rate = self.bucket.allowed_qps(rest);

        Ok(self
            .queue
            .reserve(now_micros as i64, cost_micros(acquire_count, rate)))
    }
}
