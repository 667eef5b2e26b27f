//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 预热流控器
//!
//! 冷启动令牌桶：系统刚启动时只允许 `count / cold_factor` 的 QPS，
//! 随着持续流量消耗桶中令牌，允许的 QPS 线性放宽直至 `count`。
//!
//! 令牌数落在 `[warning_token, max_token]` 区间时处于预热区，
//! 低于 `warning_token` 时按稳定阈值放行。

use super::{validate_acquire_count, TrafficShapingController};
use crate::clock::Clock;
use crate::constants::MILLIS_PER_SEC;
use crate::error::{Decision, FlowGuardError};
use crate::node::StatNode;
use parking_lot::Mutex;
use std::sync::Arc;

/// 大于 x 的最小浮点数（x 为正有限数）
fn next_up(x: f64) -> f64 {
    if x.is_finite() && x >= 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        x
    }
}

#[derive(Debug)]
struct BucketState {
    stored_tokens: u64,
    last_filled_ms: u64,
}

/// 预热令牌桶
///
/// 由预热流控器与预热排队流控器共用。状态读改写在同一把锁内完成。
#[derive(Debug)]
pub(crate) struct WarmUpBucket {
    count: f64,
    cold_factor: u32,
    warning_token: u64,
    max_token: u64,
    slope: f64,
    align_ms: u64,
    state: Mutex<BucketState>,
}

impl WarmUpBucket {
    pub(crate) fn new(count: f64, warm_up_period_sec: u32, cold_factor: u32, align_ms: u32) -> Self {
        let cold_factor = cold_factor.max(crate::constants::MIN_COLD_FACTOR);
        let period = f64::from(warm_up_period_sec);
        let count = count.max(0.0);

        let warning_token = (period * count) as u64 / u64::from(cold_factor - 1);
        let max_token =
            warning_token + (2.0 * period * count / (1.0 + f64::from(cold_factor))) as u64;
        let slope = if count > 0.0 && max_token > warning_token {
            (f64::from(cold_factor) - 1.0) / count / (max_token - warning_token) as f64
        } else {
            0.0
        };

        Self {
            count,
            cold_factor,
            warning_token,
            max_token,
            slope,
            align_ms: u64::from(align_ms.max(1)),
            // 初始即为冷启动状态
            state: Mutex::new(BucketState {
                stored_tokens: max_token,
                last_filled_ms: 0,
            }),
        }
    }

    pub(crate) fn count(&self) -> f64 {
        self.count
    }

    #[cfg(test)]
    pub(crate) fn warning_token(&self) -> u64 {
        self.warning_token
    }

    #[cfg(test)]
    pub(crate) fn max_token(&self) -> u64 {
        self.max_token
    }

    /// 按上一窗口通过 QPS 同步令牌，返回同步后的剩余令牌数
    pub(crate) fn sync(&self, now_ms: u64, previous_qps: f64) -> u64 {
        let aligned = now_ms - now_ms % self.align_ms;
        let mut state = self.state.lock();

        // 时钟回拨或同一窗口内：不补充
        if aligned <= state.last_filled_ms {
            return state.stored_tokens;
        }

        let elapsed_ms = aligned - state.last_filled_ms;
        let old = state.stored_tokens;
        let refilled = || {
            let added = elapsed_ms as f64 * self.count / MILLIS_PER_SEC as f64;
            old.saturating_add(added as u64)
        };

        let mut new = old;
        if old < self.warning_token {
            new = refilled();
        } else if old > self.warning_token {
            let cold_qps = (self.count as u64 / u64::from(self.cold_factor)) as f64;
            if previous_qps < cold_qps {
                new = refilled();
            }
        }

        let previous = previous_qps.max(0.0) as u64;
        state.stored_tokens = new.min(self.max_token).saturating_sub(previous);
        state.last_filled_ms = aligned;
        state.stored_tokens
    }

    /// 给定剩余令牌时允许的 QPS，范围为 `[count / cold_factor, count]`
    pub(crate) fn allowed_qps(&self, rest_tokens: u64) -> f64 {
        if self.count <= 0.0 {
            return 0.0;
        }
        if rest_tokens >= self.warning_token && self.slope > 0.0 {
            let above = (rest_tokens - self.warning_token) as f64;
            let warning_qps = next_up(1.0 / (above * self.slope + 1.0 / self.count));
            warning_qps.min(self.count)
        } else {
            self.count
        }
    }
}

/// 预热流控器
///
/// # 示例
/// ```rust
/// use flowguard::clock::ManualClock;
/// use flowguard::node::MemoryNode;
/// use flowguard::shaping::{TrafficShapingController, WarmUpController};
/// use std::sync::Arc;
///
/// let controller = WarmUpController::new(9.0, 10, 3, 1000, Arc::new(ManualClock::new(60_000)));
/// let node = MemoryNode::new();
/// // 冷启动时只允许 3 QPS
/// assert!((controller.allowed_qps(&node) - 3.0).abs() < 1e-6);
/// ```
#[derive(Debug)]
pub struct WarmUpController {
    bucket: WarmUpBucket,
    clock: Arc<dyn Clock>,
}

impl WarmUpController {
    /// 创建预热流控器
    ///
    /// # 参数
    /// - `count`: 稳定阈值（QPS）
    /// - `warm_up_period_sec`: 预热时长
    /// - `cold_factor`: 冷启动因子
    /// - `align_ms`: 令牌同步的对齐窗口
    pub fn new(
        count: f64,
        warm_up_period_sec: u32,
        cold_factor: u32,
        align_ms: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bucket: WarmUpBucket::new(count, warm_up_period_sec, cold_factor, align_ms),
            clock,
        }
    }

    /// 同步令牌后当前允许的 QPS
    pub fn allowed_qps(&self, node: &dyn StatNode) -> f64 {
        let rest = self
            .bucket
            .sync(self.clock.now_millis(), node.previous_pass_qps());
        self.bucket.allowed_qps(rest)
    }
}

impl TrafficShapingController for WarmUpController {
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

        let pass_qps = node.pass_qps();
        let allowed = self.allowed_qps(node);

        if pass_qps + f64::from(acquire_count) <= allowed {
            Ok(Decision::Allow)
        } else {
            Ok(Decision::Reject)
        }
    }
}
