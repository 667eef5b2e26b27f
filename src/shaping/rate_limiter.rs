//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 匀速排队流控器
//!
//! 把 QPS 阈值换算成请求间隔，用一个不断前移的"最近通过时间"表示虚拟队列，
//! 不保存真实的等待者。排队顺序完全由该时间戳的单调推进保证。

use super::{validate_acquire_count, TrafficShapingController};
use crate::clock::Clock;
use crate::constants::{MICROS_PER_MILLI, MICROS_PER_SEC};
use crate::error::{Decision, FlowGuardError};
use crate::node::StatNode;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 虚拟队列
///
/// `latest_passed` 记录最近一个已预留位置的通过时间（微秒）。
/// 每次尝试只做一次 CAS，冲突时重新读取后重试，保证同一位置不会被预留两次。
/// 被放弃的预留不会归还。
#[derive(Debug)]
pub(crate) struct VirtualQueue {
    latest_passed: AtomicI64,
    max_queueing_micros: i64,
}

impl VirtualQueue {
    pub(crate) fn new(max_queueing_time_ms: u32) -> Self {
        Self {
            latest_passed: AtomicI64::new(i64::MIN),
            max_queueing_micros: i64::from(max_queueing_time_ms) * MICROS_PER_MILLI,
        }
    }

    /// 按给定间隔尝试预留一个通过位置
    pub(crate) fn reserve(&self, now_micros: i64, cost_micros: i64) -> Decision {
        loop {
            let latest = self.latest_passed.load(Ordering::Acquire);
            let expected = latest.saturating_add(cost_micros);

            if expected <= now_micros {
                if self
                    .latest_passed
                    .compare_exchange(latest, now_micros, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return Decision::Allow;
                }
                continue;
            }

            let wait = expected - now_micros;
            if wait > self.max_queueing_micros {
                return Decision::Reject;
            }

            if self
                .latest_passed
                .compare_exchange(latest, expected, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Decision::AllowAfterWait(Duration::from_micros(wait as u64));
            }
        }
    }

    /// 最近一次预留的通过时间，尚未有请求通过时为 None
    pub(crate) fn latest_passed(&self) -> Option<i64> {
        let latest = self.latest_passed.load(Ordering::Acquire);
        (latest != i64::MIN).then_some(latest)
    }
}

/// 按速率换算单次通过的间隔（微秒）
pub(crate) fn cost_micros(acquire_count: u32, rate: f64) -> i64 {
    (f64::from(acquire_count) / rate * MICROS_PER_SEC).round() as i64
}

/// 匀速排队流控器
///
/// # 示例
/// ```rust
/// use flowguard::clock::ManualClock;
/// use flowguard::error::Decision;
/// use flowguard::node::EmptyNode;
/// use flowguard::shaping::{RateLimiterController, TrafficShapingController};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let controller = RateLimiterController::new(10.0, 500, Arc::new(ManualClock::new(1_000)));
/// assert_eq!(controller.can_pass(&EmptyNode, 1, false).unwrap(), Decision::Allow);
/// assert_eq!(
///     controller.can_pass(&EmptyNode, 1, false).unwrap(),
///     Decision::AllowAfterWait(Duration::from_millis(100))
/// );
/// ```
#[derive(Debug)]
pub struct RateLimiterController {
    count: f64,
    queue: VirtualQueue,
    clock: Arc<dyn Clock>,
}

impl RateLimiterController {
    pub fn new(count: f64, max_queueing_time_ms: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            count,
            queue: VirtualQueue::new(max_queueing_time_ms),
            clock,
        }
    }

    /// 最近一次预留的通过时间（微秒）
    pub fn latest_passed_micros(&self) -> Option<i64> {
        self.queue.latest_passed()
    }
}

impl TrafficShapingController for RateLimiterController {
    fn can_pass(
        &self,
        _node: &dyn StatNode,
        acquire_count: u32,
        _prioritized: bool,
    ) -> Result<Decision, FlowGuardError> {
        let acquire_count = validate_acquire_count(acquire_count)?;

        if self.count <= 0.0 {
            return Ok(Decision::Reject);
        }

        let now = self.clock.now_micros() as i64;
        Ok(self.queue.reserve(now, cost_micros(acquire_count, self.count)))
    }
}
