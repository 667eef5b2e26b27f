//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 时钟抽象
//!
//! 流控器只通过 [`Clock`] 读取时间，便于在测试中精确控制时间推进。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 时钟 trait
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 当前时间（微秒）
    fn now_micros(&self) -> u64;

    /// 当前时间（毫秒）
    fn now_millis(&self) -> u64 {
        self.now_micros() / 1_000
    }
}

/// 系统时钟
///
/// 基于墙上时间，但保证单调不减：时钟回拨时返回已观测到的最大值。
#[derive(Debug, Default)]
pub struct SystemClock {
    last_seen: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let previous = self.last_seen.fetch_max(now, Ordering::AcqRel);
        previous.max(now)
    }
}

lazy_static::lazy_static! {
    /// 全局共享的系统时钟
    pub static ref SYSTEM_CLOCK: Arc<SystemClock> = Arc::new(SystemClock::new());
}

/// 返回全局系统时钟
pub fn system_clock() -> Arc<dyn Clock> {
    SYSTEM_CLOCK.clone()
}

/// 手动时钟，只在显式推进时前进
///
/// # 示例
/// ```rust
/// use flowguard::clock::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_millis(250));
/// assert_eq!(clock.now_millis(), 1_250);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// 以毫秒为单位的初始时间创建
    pub fn new(start_millis: u64) -> Self {
        Self {
            micros: AtomicU64::new(start_millis.saturating_mul(1_000)),
        }
    }

    /// 推进时间
    pub fn advance(&self, duration: Duration) {
        self.micros
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// 直接设置时间（毫秒），允许回拨以模拟时钟偏移
    pub fn set_millis(&self, millis: u64) {
        self.micros
            .store(millis.saturating_mul(1_000), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}
