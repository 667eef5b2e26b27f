//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 错误类型定义
//!
//! 使用thiserror定义所有错误类型。限流结果（拒绝、排队等待）不是错误，
//! 通过 [`Decision`] 返回。

use std::time::Duration;
use thiserror::Error;

/// FlowGuard 错误类型
#[derive(Error, Debug)]
pub enum FlowGuardError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 规则非法（安装时被丢弃）
    #[error("规则非法 [{resource}]: {reason}")]
    InvalidRule { resource: String, reason: String },

    /// 调用方传入的 acquire_count 非法
    #[error("非法的 acquire_count: {0}")]
    InvalidAcquireCount(u32),

    /// 集群计数不可用
    #[error("集群计数不可用: {0}")]
    ClusterUnavailable(#[from] ClusterError),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// YAML解析错误
    #[error("YAML解析错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML解析错误
    #[error("TOML解析错误: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// 集群计数错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// 集群计数服务不可达
    #[error("集群计数服务不可达: {0}")]
    Unavailable(String),

    /// 集群侧不存在该 flow id
    #[error("集群中不存在 flow id: {0}")]
    NoRule(u64),
}

/// 准入决策
///
/// `AllowAfterWait` 中的等待时间是建议性的：核心不会自行休眠，
/// 调用方应在继续执行前延迟对应时长。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 立即放行
    Allow,
    /// 等待指定时长后放行（已预留排队位置）
    AllowAfterWait(Duration),
    /// 拒绝
    Reject,
}

impl Decision {
    /// 是否放行（含排队放行）
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Reject)
    }

    /// 放行前需要等待的时长，立即放行时为零
    pub fn wait_time(&self) -> Option<Duration> {
        match self {
            Decision::Allow => Some(Duration::ZERO),
            Decision::AllowAfterWait(wait) => Some(*wait),
            Decision::Reject => None,
        }
    }
}
