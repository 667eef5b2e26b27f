//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 统计节点能力
//!
//! 滑动窗口统计由外部子系统维护，本模块只定义只读能力 [`StatNode`]
//! 以及按资源、来源、入口查找节点的 [`NodeSource`]。
//!
//! [`MemoryNodeSource`] 是一个可直接设置数值的内存实现，适合嵌入式使用和测试。

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 统计节点
pub trait StatNode: Send + Sync {
    /// 当前窗口的通过 QPS
    fn pass_qps(&self) -> f64;

    /// 上一个窗口的通过 QPS
    fn previous_pass_qps(&self) -> f64;

    /// 上一个窗口的拒绝 QPS
    fn previous_block_qps(&self) -> f64;

    /// 当前并发线程数
    fn cur_thread_num(&self) -> u32;

    /// 为优先请求借用下一个窗口的额度
    ///
    /// 等待时长小于 `max_wait` 且额度充足时占用额度并返回等待时长；
    /// 检查与占用是一次原子操作。不支持借用或条件不满足时返回 None，且不占用额度。
    fn occupy_next(
        &self,
        _now_ms: u64,
        _acquire_count: u32,
        _threshold: f64,
        _max_wait: Duration,
    ) -> Option<Duration> {
        None
    }
}

/// 节点查找
///
/// 返回 None 表示该维度尚无流量（冷启动），调用方按零值处理。
pub trait NodeSource: Send + Sync {
    /// 资源的聚合节点
    fn resource_node(&self, resource: &str) -> Option<Arc<dyn StatNode>>;

    /// 资源在某个来源下的节点
    fn origin_node(&self, resource: &str, origin: &str) -> Option<Arc<dyn StatNode>>;

    /// 资源在某个入口链路下的节点
    fn chain_node(&self, resource: &str, entrance: &str) -> Option<Arc<dyn StatNode>>;
}

/// 零值节点
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyNode;

impl StatNode for EmptyNode {
    fn pass_qps(&self) -> f64 {
        0.0
    }

    fn previous_pass_qps(&self) -> f64 {
        0.0
    }

    fn previous_block_qps(&self) -> f64 {
        0.0
    }

    fn cur_thread_num(&self) -> u32 {
        0
    }
}

lazy_static::lazy_static! {
    static ref EMPTY_NODE: Arc<dyn StatNode> = Arc::new(EmptyNode);
}

/// 共享的零值节点
pub fn empty_node() -> Arc<dyn StatNode> {
    EMPTY_NODE.clone()
}

/// 可设置数值的内存节点
///
/// 浮点数以 bit 形式存放在 AtomicU64 中。
#[derive(Debug)]
pub struct MemoryNode {
    pass_qps: AtomicU64,
    previous_pass_qps: AtomicU64,
    previous_block_qps: AtomicU64,
    thread_num: AtomicU32,
    occupied_pass: AtomicU32,
    interval_ms: u64,
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNode {
    pub fn new() -> Self {
        Self::with_interval(crate::constants::DEFAULT_STAT_INTERVAL_MS)
    }

    /// 指定统计窗口长度（毫秒）
    pub fn with_interval(interval_ms: u32) -> Self {
        Self {
            pass_qps: AtomicU64::new(0f64.to_bits()),
            previous_pass_qps: AtomicU64::new(0f64.to_bits()),
            previous_block_qps: AtomicU64::new(0f64.to_bits()),
            thread_num: AtomicU32::new(0),
            occupied_pass: AtomicU32::new(0),
            interval_ms: u64::from(interval_ms.max(1)),
        }
    }

    pub fn set_pass_qps(&self, qps: f64) {
        self.pass_qps.store(qps.to_bits(), Ordering::Release);
    }

    /// 当前窗口通过数增加
    pub fn add_pass(&self, count: u32) {
        let _ = self
            .pass_qps
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + f64::from(count)).to_bits())
            });
    }

    pub fn set_previous_pass_qps(&self, qps: f64) {
        self.previous_pass_qps.store(qps.to_bits(), Ordering::Release);
    }

    pub fn set_previous_block_qps(&self, qps: f64) {
        self.previous_block_qps
            .store(qps.to_bits(), Ordering::Release);
    }

    pub fn set_thread_num(&self, threads: u32) {
        self.thread_num.store(threads, Ordering::Release);
    }

    pub fn increase_thread_num(&self) {
        self.thread_num.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrease_thread_num(&self) {
        let _ = self
            .thread_num
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// 滚动到下一个窗口：当前值成为上一窗口值，借用额度转为当前通过数
    pub fn roll_window(&self) {
        let current = self.pass_qps.load(Ordering::Acquire);
        self.previous_pass_qps.store(current, Ordering::Release);
        let occupied = self.occupied_pass.swap(0, Ordering::AcqRel);
        self.set_pass_qps(f64::from(occupied));
    }

    pub fn occupied_pass(&self) -> u32 {
        self.occupied_pass.load(Ordering::Acquire)
    }
}

impl StatNode for MemoryNode {
    fn pass_qps(&self) -> f64 {
        f64::from_bits(self.pass_qps.load(Ordering::Acquire))
    }

    fn previous_pass_qps(&self) -> f64 {
        f64::from_bits(self.previous_pass_qps.load(Ordering::Acquire))
    }

    fn previous_block_qps(&self) -> f64 {
        f64::from_bits(self.previous_block_qps.load(Ordering::Acquire))
    }

    fn cur_thread_num(&self) -> u32 {
        self.thread_num.load(Ordering::Acquire)
    }

    fn occupy_next(
        &self,
        now_ms: u64,
        acquire_count: u32,
        threshold: f64,
        max_wait: Duration,
    ) -> Option<Duration> {
        let wait = Duration::from_millis(self.interval_ms - now_ms % self.interval_ms);
        if wait >= max_wait {
            return None;
        }

        self.occupied_pass
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |occupied| {
                let borrowed = occupied.checked_add(acquire_count)?;
                (f64::from(borrowed) <= threshold).then_some(borrowed)
            })
            .ok()
            .map(|_| wait)
    }
}

/// 内存节点源
///
/// 节点按需创建，读取时不会创建节点。
#[derive(Default)]
pub struct MemoryNodeSource {
    resources: DashMap<String, Arc<MemoryNode>>,
    origins: DashMap<(String, String), Arc<MemoryNode>>,
    chains: DashMap<(String, String), Arc<MemoryNode>>,
}

impl MemoryNodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建资源聚合节点
    pub fn resource(&self, resource: &str) -> Arc<MemoryNode> {
        self.resources
            .entry(resource.to_string())
            .or_default()
            .clone()
    }

    /// 获取或创建来源节点
    pub fn origin(&self, resource: &str, origin: &str) -> Arc<MemoryNode> {
        self.origins
            .entry((resource.to_string(), origin.to_string()))
            .or_default()
            .clone()
    }

    /// 获取或创建链路节点
    pub fn chain(&self, resource: &str, entrance: &str) -> Arc<MemoryNode> {
        self.chains
            .entry((resource.to_string(), entrance.to_string()))
            .or_default()
            .clone()
    }

    /// 所有节点滚动到下一个窗口
    pub fn roll_all(&self) {
        self.resources.iter().for_each(|n| n.roll_window());
        self.origins.iter().for_each(|n| n.roll_window());
        self.chains.iter().for_each(|n| n.roll_window());
    }
}

impl NodeSource for MemoryNodeSource {
    fn resource_node(&self, resource: &str) -> Option<Arc<dyn StatNode>> {
        self.resources
            .get(resource)
            .map(|n| n.value().clone() as Arc<dyn StatNode>)
    }

    fn origin_node(&self, resource: &str, origin: &str) -> Option<Arc<dyn StatNode>> {
        self.origins
            .get(&(resource.to_string(), origin.to_string()))
            .map(|n| n.value().clone() as Arc<dyn StatNode>)
    }

    fn chain_node(&self, resource: &str, entrance: &str) -> Option<Arc<dyn StatNode>> {
        self.chains
            .get(&(resource.to_string(), entrance.to_string()))
            .map(|n| n.value().clone() as Arc<dyn StatNode>)
    }
}
