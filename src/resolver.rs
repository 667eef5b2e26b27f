//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 流控模式解析
//!
//! 根据规则的来源过滤（limit_app）与流控模式（strategy），
//! 决定本次调用应该检查哪个统计节点。

use crate::constants::{LIMIT_APP_DEFAULT, LIMIT_APP_OTHER};
use crate::node::{empty_node, NodeSource, StatNode};
use crate::rule::{FlowRule, Strategy};
use std::sync::Arc;

/// 调用上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationContext<'a> {
    /// 当前资源
    pub resource: &'a str,
    /// 调用来源
    pub origin: &'a str,
    /// 调用链入口资源
    pub entrance: &'a str,
}

impl<'a> InvocationContext<'a> {
    pub fn new(resource: &'a str, origin: &'a str, entrance: &'a str) -> Self {
        Self {
            resource,
            origin,
            entrance,
        }
    }
}

/// 解析结果
#[derive(Clone)]
pub enum Resolution {
    /// 规则不约束本次调用
    NotApplicable,
    /// 需要检查的节点
    Node(Arc<dyn StatNode>),
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolution::NotApplicable => write!(f, "NotApplicable"),
            Resolution::Node(_) => write!(f, "Node(..)"),
        }
    }
}

/// 来源分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OriginBranch {
    /// 指定来源或 "other"：使用来源节点
    Origin,
    /// "default"：使用资源聚合节点
    Aggregate,
}

/// 来源名是否可以作为具体来源匹配
fn is_specific_origin(origin: &str) -> bool {
    !origin.is_empty() && origin != LIMIT_APP_DEFAULT && origin != LIMIT_APP_OTHER
}

fn origin_branch(rule: &FlowRule, ctx: &InvocationContext<'_>, named_by_other_rule: bool) -> Option<OriginBranch> {
    let limit_app = rule.limit_app();
    if limit_app == ctx.origin && is_specific_origin(ctx.origin) {
        Some(OriginBranch::Origin)
    } else if limit_app == LIMIT_APP_DEFAULT {
        Some(OriginBranch::Aggregate)
    } else if limit_app == LIMIT_APP_OTHER && !ctx.origin.is_empty() && !named_by_other_rule {
        Some(OriginBranch::Origin)
    } else {
        None
    }
}

/// 解析规则需要检查的节点
///
/// `named_by_other_rule` 表示调用来源是否被同一资源的其他规则显式指定，
/// 仅在 limit_app 为 "other" 时使用。节点不存在时按零值节点处理。
pub fn resolve(
    rule: &FlowRule,
    ctx: &InvocationContext<'_>,
    source: &dyn NodeSource,
    named_by_other_rule: bool,
) -> Resolution {
    let Some(branch) = origin_branch(rule, ctx, named_by_other_rule) else {
        return Resolution::NotApplicable;
    };

    let node = match rule.strategy() {
        Strategy::Direct => match branch {
            OriginBranch::Origin => source.origin_node(rule.resource(), ctx.origin),
            OriginBranch::Aggregate => source.resource_node(rule.resource()),
        },
        Strategy::Relate => {
            let Some(ref_resource) = rule.ref_resource() else {
                return Resolution::NotApplicable;
            };
            source.resource_node(ref_resource)
        }
        Strategy::Chain => match rule.ref_resource() {
            Some(entrance) if entrance == ctx.entrance => {
                source.chain_node(rule.resource(), entrance)
            }
            _ => return Resolution::NotApplicable,
        },
    };

    Resolution::Node(node.unwrap_or_else(empty_node))
}
