//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配置模块
//!
//! 定义流控引擎级别的可调参数。规则本身不在此处配置。

use crate::constants::{
    DEFAULT_COLD_FACTOR, DEFAULT_OCCUPY_TIMEOUT_MS, DEFAULT_STAT_INTERVAL_MS, MIN_COLD_FACTOR,
};
use crate::error::FlowGuardError;
use serde::{Deserialize, Serialize};

/// 流控引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// 预热冷启动因子
    pub cold_factor: u32,
    /// 优先请求借用未来窗口的最大等待（毫秒）
    pub occupy_timeout_ms: u32,
    /// 统计窗口长度（毫秒）
    pub stat_interval_ms: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            cold_factor: DEFAULT_COLD_FACTOR,
            occupy_timeout_ms: DEFAULT_OCCUPY_TIMEOUT_MS,
            stat_interval_ms: DEFAULT_STAT_INTERVAL_MS,
        }
    }
}

impl FlowConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), FlowGuardError> {
        if self.cold_factor < MIN_COLD_FACTOR {
            return Err(FlowGuardError::ConfigError(format!(
                "冷启动因子必须不小于 {}，当前值: {}",
                MIN_COLD_FACTOR, self.cold_factor
            )));
        }

        if self.stat_interval_ms == 0 {
            return Err(FlowGuardError::ConfigError(
                "统计窗口长度必须大于0".to_string(),
            ));
        }

        Ok(())
    }

    /// 从 YAML 解析并校验
    pub fn from_yaml_str(yaml: &str) -> Result<Self, FlowGuardError> {
        let config: FlowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 解析并校验
    pub fn from_json_str(json: &str) -> Result<Self, FlowGuardError> {
        let config: FlowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 解析并校验
    pub fn from_toml_str(toml: &str) -> Result<Self, FlowGuardError> {
        let config: FlowConfig = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }
}
