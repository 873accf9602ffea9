//! 规则配置加载管理器
//! 负责从本地文件、字符串或内置默认配置读取配置文档

use std::path::Path;
use serde_json::Value;
use tracing::debug;

use super::model::RuleLibrary;
use crate::config::GlobalConfig;
use crate::error::{FfResult, FireFindError};

/// 内置默认规则配置
#[cfg(feature = "embedded-rules")]
static EMBEDDED_RULES_JSON: &str = include_str!("../../data/rules_config.json");

/// 规则配置加载管理器
pub struct RuleLoader;

impl RuleLoader {
    /// 按全局配置加载（优先指定文件，否则使用内置配置）
    pub fn load(config: &GlobalConfig) -> FfResult<RuleLibrary> {
        let rule_lib = match &config.rules_config_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load_embedded()?,
        };
        Self::debug_rule_stats(&rule_lib);
        Ok(rule_lib)
    }

    /// 从本地 JSON 文件加载
    pub fn load_from_path(path: &Path) -> FfResult<RuleLibrary> {
        debug!("从 {} 加载规则配置", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 从 JSON 字符串加载
    pub fn from_json_str(content: &str) -> FfResult<RuleLibrary> {
        let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))?;
        Self::from_value(value)
    }

    /// 从已解析的 JSON 值加载（顶层必须是对象）
    pub fn from_value(value: Value) -> FfResult<RuleLibrary> {
        if !value.is_object() {
            return Err(FireFindError::ConfigError(
                "规则配置文档必须是 JSON 对象".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 加载内置默认配置
    #[cfg(feature = "embedded-rules")]
    pub fn load_embedded() -> FfResult<RuleLibrary> {
        debug!("加载内置规则配置");
        Self::from_json_str(EMBEDDED_RULES_JSON)
    }

    #[cfg(not(feature = "embedded-rules"))]
    pub fn load_embedded() -> FfResult<RuleLibrary> {
        Err(FireFindError::ConfigError(
            "未指定 rules_config_path，且未启用 embedded-rules 特性".to_string(),
        ))
    }

    // ===== 配置统计 =====
    fn debug_rule_stats(rule_lib: &RuleLibrary) {
        let enabled = rule_lib
            .risk_rules
            .values()
            .filter(|def| def.get("enabled").and_then(Value::as_bool).unwrap_or(false))
            .count();

        debug!("===== 规则配置统计 =====");
        debug!("  风险规则总数：{}（启用 {}）", rule_lib.risk_rules.len(), enabled);
        debug!("  厂商映射数：{}", rule_lib.vendor_mappings.len());
        debug!("  服务端口映射数：{}", rule_lib.service_port_map.len());
    }
}
