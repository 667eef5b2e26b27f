//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Governor 主控制器
//!
//! 流量控制的对外入口：
//! - `install` 安装规则集
//! - `evaluate` / `check` 对一次调用做准入决策
//! - `acquire` 在决策要求排队时异步等待后返回

use crate::clock::{system_clock, Clock};
use crate::cluster::{cluster_node, ClusterCounter};
use crate::config::FlowConfig;
use crate::error::{Decision, FlowGuardError};
use crate::manager::{FlowRuleManager, InstallReport};
use crate::node::NodeSource;
use crate::resolver::{resolve, InvocationContext, Resolution};
use crate::rule::FlowRule;
use crate::shaping::validate_acquire_count;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace};

/// Governor 统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernorStats {
    /// 总请求数
    pub total_requests: u64,
    /// 立即放行数
    pub allowed: u64,
    /// 排队放行数
    pub queued: u64,
    /// 拒绝数
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    allowed: AtomicU64,
    queued: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn record(&self, decision: &Decision) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match decision {
            Decision::Allow => &self.allowed,
            Decision::AllowAfterWait(_) => &self.queued,
            Decision::Reject => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> GovernorStats {
        GovernorStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Governor 构建器
pub struct GovernorBuilder {
    config: FlowConfig,
    node_source: Arc<dyn NodeSource>,
    clock: Arc<dyn Clock>,
    cluster_counter: Option<Arc<dyn ClusterCounter>>,
}

impl GovernorBuilder {
    pub fn config(mut self, config: FlowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cluster_counter(mut self, counter: Arc<dyn ClusterCounter>) -> Self {
        self.cluster_counter = Some(counter);
        self
    }

    /// 校验配置并创建 Governor
    pub fn build(self) -> Result<Governor, FlowGuardError> {
        self.config.validate()?;

        Ok(Governor {
            manager: Arc::new(FlowRuleManager::new(self.config, self.clock)),
            node_source: self.node_source,
            cluster_counter: self.cluster_counter,
            counters: Counters::default(),
        })
    }
}

/// Governor 主控制器
///
/// # 示例
/// ```rust
/// use flowguard::prelude::*;
/// use std::sync::Arc;
///
/// let nodes = Arc::new(MemoryNodeSource::new());
/// let governor = Governor::builder(nodes.clone()).build().unwrap();
/// governor.install(vec![FlowRule::new("order-api").with_count(1.0)]);
///
/// assert_eq!(governor.evaluate("order-api", "", "", 1).unwrap(), Decision::Allow);
/// nodes.resource("order-api").add_pass(1);
/// assert_eq!(governor.evaluate("order-api", "", "", 1).unwrap(), Decision::Reject);
/// ```
pub struct Governor {
    manager: Arc<FlowRuleManager>,
    node_source: Arc<dyn NodeSource>,
    cluster_counter: Option<Arc<dyn ClusterCounter>>,
    counters: Counters,
}

impl Governor {
    /// 创建构建器，默认使用系统时钟与默认配置
    pub fn builder(node_source: Arc<dyn NodeSource>) -> GovernorBuilder {
        GovernorBuilder {
            config: FlowConfig::default(),
            node_source,
            clock: system_clock(),
            cluster_counter: None,
        }
    }

    /// 以默认配置创建
    pub fn new(node_source: Arc<dyn NodeSource>) -> Result<Self, FlowGuardError> {
        Self::builder(node_source).build()
    }

    /// 规则管理器
    pub fn manager(&self) -> &Arc<FlowRuleManager> {
        &self.manager
    }

    /// 安装规则集
    #[instrument(skip(self, rules), fields(rules = rules.len()))]
    pub fn install(&self, rules: Vec<FlowRule>) -> InstallReport {
        self.manager.install(rules)
    }

    /// 对一次调用做准入决策
    ///
    /// # 参数
    /// - `resource`: 资源名
    /// - `origin`: 调用来源，没有来源时传空字符串
    /// - `entrance`: 调用链入口资源
    /// - `acquire_count`: 本次消耗的许可数，必须大于0
    pub fn evaluate(
        &self,
        resource: &str,
        origin: &str,
        entrance: &str,
        acquire_count: u32,
    ) -> Result<Decision, FlowGuardError> {
        let ctx = InvocationContext::new(resource, origin, entrance);
        self.check(&ctx, acquire_count, false)
    }

    /// 对一次调用做准入决策（可指定优先请求）
    ///
    /// 资源的所有适用规则都通过才放行；多条规则要求排队时取最长等待。
    /// 某条规则拒绝时，之前规则已预留的排队位置不会归还。
    pub fn check(
        &self,
        ctx: &InvocationContext<'_>,
        acquire_count: u32,
        prioritized: bool,
    ) -> Result<Decision, FlowGuardError> {
        let acquire_count = validate_acquire_count(acquire_count)?;

        let rules = self.manager.snapshot();
        let Some(bound_rules) = rules.rules_for(ctx.resource) else {
            self.counters.record(&Decision::Allow);
            return Ok(Decision::Allow);
        };

        let named_origin = rules.is_named_origin(ctx.resource, ctx.origin);
        let mut max_wait = Duration::ZERO;

        for bound in bound_rules {
            let rule = bound.rule();
            let node = match resolve(rule, ctx, self.node_source.as_ref(), named_origin) {
                Resolution::NotApplicable => {
                    trace!("规则不适用于本次调用: {}", rule);
                    continue;
                }
                Resolution::Node(node) => node,
            };

            let decision = match cluster_node(rule, self.cluster_counter.as_deref()) {
                Some(cluster) => bound
                    .controller()
                    .can_pass(&cluster, acquire_count, prioritized)?,
                None => bound
                    .controller()
                    .can_pass(node.as_ref(), acquire_count, prioritized)?,
            };

            match decision {
                Decision::Allow => {}
                Decision::AllowAfterWait(wait) => max_wait = max_wait.max(wait),
                Decision::Reject => {
                    debug!(
                        "请求被流控规则拒绝: resource={}, origin={}, rule={}",
                        ctx.resource, ctx.origin, rule
                    );
                    self.counters.record(&Decision::Reject);
                    return Ok(Decision::Reject);
                }
            }
        }

        let decision = if max_wait.is_zero() {
            Decision::Allow
        } else {
            Decision::AllowAfterWait(max_wait)
        };
        self.counters.record(&decision);
        Ok(decision)
    }

    /// 准入决策，需要排队时异步等待后返回
    #[instrument(skip(self))]
    pub async fn acquire(
        &self,
        resource: &str,
        origin: &str,
        entrance: &str,
        acquire_count: u32,
    ) -> Result<Decision, FlowGuardError> {
        let decision = self.evaluate(resource, origin, entrance, acquire_count)?;
        if let Decision::AllowAfterWait(wait) = decision {
            trace!("排队等待 {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        Ok(decision)
    }

    /// 获取统计信息
    pub fn stats(&self) -> GovernorStats {
        self.counters.snapshot()
    }
}
