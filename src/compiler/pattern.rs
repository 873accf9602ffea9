//! 编译后规则模型
//! 配置校验通过后的只读结构，运行期在各组件间共享

use std::collections::HashMap;

use crate::detector::severity::SeverityResolver;
use crate::rule::{RuleField, TableLayout};
use crate::utils::ServicePortMap;

/// 字段值匹配器（允许值均已转小写）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// token 交集（动作、服务等普通字符串字段）
    Tokens(Vec<String>),
    /// 整值相等（日志描述、地址集合）
    Whole(Vec<String>),
    /// token 经服务端口表归一化后比较
    Ports(Vec<String>),
    /// 端口字段直接比较
    Exact(Vec<String>),
}

impl Matcher {
    pub fn allowed(&self) -> &[String] {
        match self {
            Matcher::Tokens(values)
            | Matcher::Whole(values)
            | Matcher::Ports(values)
            | Matcher::Exact(values) => values,
        }
    }

    /// 简单匹配判断（候选值需已转小写）
    pub fn is_match(&self, candidate: &str) -> bool {
        self.allowed().iter().any(|allowed| allowed == candidate)
    }

    /// 匹配器描述
    pub fn describe(&self) -> &'static str {
        match self {
            Matcher::Tokens(_) => "tokens",
            Matcher::Whole(_) => "whole",
            Matcher::Ports(_) => "ports",
            Matcher::Exact(_) => "exact",
        }
    }
}

/// 单个字段条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCondition {
    pub field: RuleField,
    pub matcher: Matcher,
}

/// 空值检查：目标字段等于任一占位值即报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyValueCheck {
    pub field: RuleField,
    pub values: Vec<String>,
}

/// AND 组合条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndCriteria {
    pub match_fields: Vec<FieldCondition>,
    pub port_fields: Vec<FieldCondition>,
    pub equal_fields: Vec<RuleField>,
    pub required_fields: Vec<RuleField>,
    pub bad_names: Vec<String>,
    pub empty_values: Option<EmptyValueCheck>,
    pub action_scope: Vec<String>,
}

impl AndCriteria {
    /// 是否声明了正向匹配条件（match / match_ports / equal_fields）
    pub fn has_match_conditions(&self) -> bool {
        !self.match_fields.is_empty() || !self.port_fields.is_empty() || !self.equal_fields.is_empty()
    }

    /// 是否声明了抢占式检查（必填/坏名称/空值）
    pub fn has_preemptive_checks(&self) -> bool {
        !self.required_fields.is_empty() || !self.bad_names.is_empty() || self.empty_values.is_some()
    }
}

/// OR 字段列表条件：逐字段独立判断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrCriteria {
    pub fields: Vec<RuleField>,
    pub values: Vec<String>,
    pub action_scope: Vec<String>,
}

/// 规则组合方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchMode {
    AndFields(AndCriteria),
    OrFieldList(OrCriteria),
}

/// 编译后的规则定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    pub name: String,
    pub enabled: bool,
    pub mode: MatchMode,
}

/// 一组规则定义（保留声明顺序）
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub definitions: Vec<RuleDefinition>,
}

impl RuleSet {
    pub fn enabled(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.definitions.iter().filter(|def| def.enabled)
    }

    pub fn get(&self, name: &str) -> Option<&RuleDefinition> {
        self.definitions.iter().find(|def| def.name == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// 文件名识别规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameRule {
    pub contains: String,
    pub extension: Option<String>,
}

impl FilenameRule {
    /// file_name / extension 需已转小写
    pub fn matches(&self, file_name: &str, extension: &str) -> bool {
        file_name.contains(&self.contains)
            && self.extension.as_deref().map_or(true, |ext| ext == extension)
    }
}

/// 编译后的厂商映射
#[derive(Debug, Clone)]
pub struct VendorProfile {
    pub id: String,
    pub detect_headers: Vec<String>,
    pub filename_rules: Vec<FilenameRule>,
    pub columns: HashMap<RuleField, Vec<String>>,
    pub defaults: HashMap<RuleField, String>,
    pub normalization: HashMap<RuleField, HashMap<String, String>>,
    pub extra_fields: Vec<(RuleField, String)>,
    pub layout: TableLayout,
    /// 厂商专属规则集（非空时覆盖全局规则集）
    pub rules: Option<RuleSet>,
}

impl VendorProfile {
    /// 字段的表头别名，按声明顺序；extra_fields 指定的表头排在最后
    /// 未配置列别名时退回规范键名本身
    pub fn aliases<'a>(&'a self, field: &'a RuleField) -> Vec<&'a str> {
        let mut aliases: Vec<&'a str> = match self.columns.get(field) {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => vec![field.key()],
        };
        for (extra_field, header) in &self.extra_fields {
            if extra_field == field && !aliases.contains(&header.as_str()) {
                aliases.push(header);
            }
        }
        aliases
    }

    /// 应用厂商归一化表（输入需已转小写）
    pub fn normalize(&self, field: &RuleField, lowered: &str) -> String {
        self.normalization
            .get(field)
            .and_then(|table| table.get(lowered))
            .cloned()
            .unwrap_or_else(|| lowered.to_string())
    }

    pub fn default_for(&self, field: &RuleField) -> Option<&str> {
        self.defaults.get(field).map(String::as_str)
    }

    /// 规则记录上需要携带的非规范字段（列别名、extra_fields、位置列）
    pub fn extra_field_names(&self) -> Vec<RuleField> {
        let positional = match &self.layout {
            TableLayout::Positional { columns, .. } => columns.iter().map(|c| RuleField::parse(c)).collect(),
            _ => Vec::new(),
        };

        let mut names: Vec<RuleField> = Vec::new();
        let candidates = self
            .columns
            .keys()
            .cloned()
            .chain(self.extra_fields.iter().map(|(field, _)| field.clone()))
            .chain(positional);
        for field in candidates {
            if matches!(field, RuleField::Extra(_)) && !names.contains(&field) {
                names.push(field);
            }
        }
        names.sort();
        names
    }
}

/// 编译后的规则库
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleLibrary {
    pub global_rules: RuleSet,
    pub vendors: Vec<VendorProfile>,
    pub service_ports: ServicePortMap,
    pub severity: SeverityResolver,
}

impl CompiledRuleLibrary {
    /// 按 ID 查找厂商（忽略大小写）
    pub fn vendor(&self, id: &str) -> Option<&VendorProfile> {
        let id = id.trim();
        self.vendors.iter().find(|vendor| vendor.id.eq_ignore_ascii_case(id))
    }

    /// 选择规则集：厂商专属规则集非空时优先，否则退回全局
    /// 返回规则集及其所属厂商作用域（全局为 None）
    pub fn rule_set_for<'a>(&'a self, vendor: &str) -> (&'a RuleSet, Option<&'a str>) {
        match self.vendor(vendor) {
            Some(VendorProfile { id, rules: Some(rules), .. }) if !rules.is_empty() => (rules, Some(id.as_str())),
            _ => (&self.global_rules, None),
        }
    }
}
