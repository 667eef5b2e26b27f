//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 直接拒绝流控器

use super::{validate_acquire_count, TrafficShapingController};
use crate::clock::Clock;
use crate::error::{Decision, FlowGuardError};
use crate::node::StatNode;
use crate::rule::Grade;
use std::sync::Arc;
use std::time::Duration;

/// 直接拒绝流控器
///
/// 当前指标加上本次许可数不超过阈值即放行，否则立即拒绝。
/// QPS 阈值下的优先请求可以借用下一个统计窗口的额度并排队等待。
#[derive(Debug)]
pub struct DefaultController {
    count: f64,
    grade: Grade,
    occupy_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl DefaultController {
    pub fn new(count: f64, grade: Grade, occupy_timeout_ms: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            count,
            grade,
            occupy_timeout: Duration::from_millis(u64::from(occupy_timeout_ms)),
            clock,
        }
    }

    fn current_metric(&self, node: &dyn StatNode) -> f64 {
        match self.grade {
            Grade::ThreadCount => f64::from(node.cur_thread_num()),
            Grade::Qps => node.pass_qps(),
        }
    }
}

impl TrafficShapingController for DefaultController {
    fn can_pass(
        &self,
        node: &dyn StatNode,
        acquire_count: u32,
        prioritized: bool,
    ) -> Result<Decision, FlowGuardError> {
        let acquire_count = validate_acquire_count(acquire_count)?;

        if self.current_metric(node) + f64::from(acquire_count) <= self.count {
            return Ok(Decision::Allow);
        }

        if prioritized && self.grade == Grade::Qps {
            let now_ms = self.clock.now_millis();
            if let Some(wait) =
                node.occupy_next(now_ms, acquire_count, self.count, self.occupy_timeout)
            {
                return Ok(Decision::AllowAfterWait(wait));
            }
        }

        Ok(Decision::Reject)
    }
}
