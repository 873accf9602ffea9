//! 严重级别/分类解析
//! 纯查表，缺失数据退化为哨兵值，永不失败

use std::collections::HashMap;
use serde_json::{Map, Value};

/// 未配置严重级别时的哨兵值
pub const UNKNOWN_SEVERITY: &str = "UNKNOWN";
/// 未配置分类时的哨兵值
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SeverityEntry {
    severity: Option<String>,
    category: Option<String>,
}

/// 严重级别解析器
#[derive(Debug, Clone, Default)]
pub struct SeverityResolver {
    global: HashMap<String, SeverityEntry>,
    vendors: HashMap<String, HashMap<String, SeverityEntry>>,
}

impl SeverityResolver {
    /// 从原始配置构建（包含已禁用规则，非对象条目按缺失处理）
    pub fn new(global_rules: &Map<String, Value>, vendor_mappings: &Map<String, Value>) -> Self {
        let global = Self::index_rules(global_rules);
        let vendors = vendor_mappings
            .iter()
            .filter_map(|(vendor, mapping)| {
                let rules = mapping.get("risk_rules")?.as_object()?;
                Some((vendor.to_lowercase(), Self::index_rules(rules)))
            })
            .collect();
        Self { global, vendors }
    }

    fn index_rules(rules: &Map<String, Value>) -> HashMap<String, SeverityEntry> {
        rules
            .iter()
            .map(|(name, def)| {
                let text = |key: &str| def.get(key).and_then(Value::as_str).map(str::to_string);
                (name.clone(), SeverityEntry { severity: text("severity"), category: text("category") })
            })
            .collect()
    }

    /// 解析 (severity, category)
    /// 厂商作用域中存在该规则时优先，否则全局，否则哨兵值
    pub fn resolve(&self, issue: &str, vendor: Option<&str>) -> (String, String) {
        let vendor_entry = vendor
            .and_then(|vendor| self.vendors.get(&vendor.to_lowercase()))
            .and_then(|rules| rules.get(issue));

        match vendor_entry.or_else(|| self.global.get(issue)) {
            Some(entry) => (
                entry.severity.clone().unwrap_or_else(|| UNKNOWN_SEVERITY.to_string()),
                entry.category.clone().unwrap_or_else(|| UNCATEGORIZED.to_string()),
            ),
            None => (UNKNOWN_SEVERITY.to_string(), UNCATEGORIZED.to_string()),
        }
    }
}
