//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 流控规则管理器
//!
//! 维护"资源 -> 有序规则列表"的当前生效规则集，每条规则绑定一个独占的流控器。
//! 规则集整体替换：读者总是看到完整的新集合或旧集合。
//! 配置未变的规则在重新安装时沿用原流控器，保留其预热与排队状态。

use crate::clock::Clock;
use crate::config::FlowConfig;
use crate::constants::{LIMIT_APP_DEFAULT, LIMIT_APP_OTHER};
use crate::error::FlowGuardError;
use crate::rule::FlowRule;
use crate::shaping::{create_controller, TrafficShapingController};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// 已绑定流控器的规则
#[derive(Debug, Clone)]
pub struct BoundRule {
    rule: Arc<FlowRule>,
    controller: Arc<dyn TrafficShapingController>,
}

impl BoundRule {
    pub fn rule(&self) -> &Arc<FlowRule> {
        &self.rule
    }

    pub fn controller(&self) -> &Arc<dyn TrafficShapingController> {
        &self.controller
    }
}

/// 规则集快照
#[derive(Debug, Default)]
pub struct RuleSet {
    by_resource: HashMap<String, Vec<BoundRule>>,
    /// 每个资源下被规则显式指定的来源
    named_origins: HashMap<String, HashSet<String>>,
}

impl RuleSet {
    /// 资源的有序规则列表
    pub fn rules_for(&self, resource: &str) -> Option<&[BoundRule]> {
        self.by_resource.get(resource).map(Vec::as_slice)
    }

    /// 来源是否被该资源的某条规则显式指定
    pub fn is_named_origin(&self, resource: &str, origin: &str) -> bool {
        self.named_origins
            .get(resource)
            .is_some_and(|origins| origins.contains(origin))
    }

    pub fn resource_count(&self) -> usize {
        self.by_resource.len()
    }

    pub fn rule_count(&self) -> usize {
        self.by_resource.values().map(Vec::len).sum()
    }

    fn iter(&self) -> impl Iterator<Item = &BoundRule> {
        self.by_resource.values().flatten()
    }
}

/// 安装结果
#[derive(Debug, Default)]
pub struct InstallReport {
    /// 成功安装的规则数
    pub installed: usize,
    /// 沿用原流控器的规则数
    pub reused: usize,
    /// 被丢弃的非法规则
    pub rejected: Vec<FlowGuardError>,
}

/// 同一资源内的规则顺序：本地规则在集群规则之前，指定来源的规则在 "default" 之前
fn compare_rules(a: &FlowRule, b: &FlowRule) -> Ordering {
    match (a.is_cluster_mode(), b.is_cluster_mode()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let a_default = a.limit_app() == LIMIT_APP_DEFAULT;
    let b_default = b.limit_app() == LIMIT_APP_DEFAULT;
    match (a_default, b_default) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// 流控规则管理器
pub struct FlowRuleManager {
    rules: ArcSwap<RuleSet>,
    /// 串行化安装，保证复用判断基于最新规则集
    install_lock: Mutex<()>,
    config: FlowConfig,
    clock: Arc<dyn Clock>,
}

impl FlowRuleManager {
    /// 创建新的规则管理器
    pub fn new(config: FlowConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: ArcSwap::from_pointee(RuleSet::default()),
            install_lock: Mutex::new(()),
            config,
            clock,
        }
    }

    /// 当前规则集快照
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// 安装规则集，整体替换当前规则
    ///
    /// 非法规则被丢弃并记录在返回结果中，其余规则照常安装。
    pub fn install(&self, rules: Vec<FlowRule>) -> InstallReport {
        let _guard = self.install_lock.lock();
        let previous = self.rules.load_full();

        // 旧流控器按规则配置分组，供相同配置的新规则复用
        let mut reusable: HashMap<&FlowRule, VecDeque<Arc<dyn TrafficShapingController>>> =
            HashMap::new();
        for bound in previous.iter() {
            reusable
                .entry(bound.rule.as_ref())
                .or_default()
                .push_back(bound.controller.clone());
        }

        let mut report = InstallReport::default();
        let mut by_resource: HashMap<String, Vec<BoundRule>> = HashMap::new();

        for rule in rules {
            let rule = rule.normalized();
            if let Err(e) = rule.validate() {
                warn!("丢弃非法流控规则: {}", e);
                report.rejected.push(e);
                continue;
            }

            let controller = match reusable.get_mut(&rule).and_then(VecDeque::pop_front) {
                Some(controller) => {
                    report.reused += 1;
                    controller
                }
                None => create_controller(&rule, &self.config, self.clock.clone()),
            };

            report.installed += 1;
            by_resource
                .entry(rule.resource().to_string())
                .or_default()
                .push(BoundRule {
                    rule: Arc::new(rule),
                    controller,
                });
        }

        let mut named_origins: HashMap<String, HashSet<String>> = HashMap::new();
        for (resource, bound) in by_resource.iter_mut() {
            bound.sort_by(|a, b| compare_rules(&a.rule, &b.rule));
            let origins: HashSet<String> = bound
                .iter()
                .map(|b| b.rule.limit_app())
                .filter(|app| *app != LIMIT_APP_DEFAULT && *app != LIMIT_APP_OTHER)
                .map(str::to_string)
                .collect();
            if !origins.is_empty() {
                named_origins.insert(resource.clone(), origins);
            }
        }

        drop(reusable);
        self.rules.store(Arc::new(RuleSet {
            by_resource,
            named_origins,
        }));

        info!(
            "流控规则已安装: installed={}, reused={}, rejected={}",
            report.installed,
            report.reused,
            report.rejected.len()
        );

        report
    }

    /// 当前生效的全部规则
    pub fn rules(&self) -> Vec<FlowRule> {
        self.snapshot()
            .iter()
            .map(|bound| bound.rule.as_ref().clone())
            .collect()
    }

    /// 资源当前生效的规则（按评估顺序）
    pub fn rules_for(&self, resource: &str) -> Vec<FlowRule> {
        self.snapshot()
            .rules_for(resource)
            .map(|bound| bound.iter().map(|b| b.rule.as_ref().clone()).collect())
            .unwrap_or_default()
    }

    /// 资源是否配置了规则
    pub fn has_rules(&self, resource: &str) -> bool {
        self.snapshot().rules_for(resource).is_some()
    }

    /// 清空所有规则
    pub fn clear(&self) {
        let _guard = self.install_lock.lock();
        self.rules.store(Arc::new(RuleSet::default()));
    }
}

impl std::fmt::Debug for FlowRuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuleManager")
            .field("config", &self.config)
            .field("rules", &self.snapshot().rule_count())
            .finish()
    }
}
