//! 规则数据模型定义
//! 配置文档结构（原始形态，由编译器校验）+ 规范规则记录 + 发现项

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::field::RuleField;

// ===================== 配置文档 =====================

/// 完整规则配置文档
/// risk_rules / vendor_mappings 保留声明顺序（serde_json preserve_order）
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleLibrary {
    #[serde(default)]
    pub risk_rules: Map<String, Value>,
    #[serde(default)]
    pub vendor_mappings: Map<String, Value>,
    #[serde(default)]
    pub service_port_map: HashMap<String, String>,
    /// 报表样式，引擎不解释
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting: Option<Value>,
}

/// 单条风险规则定义（原始配置形态）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskRuleDef {
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "match", default)]
    pub match_fields: Map<String, Value>,
    #[serde(default, alias = "matchPorts")]
    pub match_ports: Map<String, Value>,
    #[serde(default, alias = "requiredFields")]
    pub required_fields: Vec<String>,
    #[serde(default, alias = "badNames")]
    pub bad_names: Vec<String>,
    #[serde(default, alias = "emptyValues")]
    pub empty_values: Vec<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, alias = "equalFields")]
    pub equal_fields: Vec<String>,
    #[serde(default, alias = "actionScope")]
    pub action_scope: Vec<String>,
    #[serde(default, alias = "matchMode")]
    pub match_mode: Option<MatchModeKind>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// 规则组合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchModeKind {
    /// 所有条件字段同时满足
    AndFields,
    /// 字段列表中任一字段命中即报告（逐字段独立）
    OrFields,
}

/// 厂商映射（原始配置形态）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorMappingDef {
    #[serde(default, alias = "detect_headers")]
    pub detect_headers_any: Vec<String>,
    #[serde(default)]
    pub detect_filenames: Vec<FilenameRuleDef>,
    /// 字段 -> 表头别名（字符串或列表）
    #[serde(default)]
    pub columns: Map<String, Value>,
    #[serde(default)]
    pub defaults: HashMap<String, String>,
    #[serde(default)]
    pub normalization: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub extra_fields: Map<String, Value>,
    #[serde(default)]
    pub risk_rules: Option<Map<String, Value>>,
    #[serde(default)]
    pub layout: TableLayout,
}

/// 文件名识别规则：文件名包含 token，且（可选）扩展名一致
#[derive(Debug, Clone, Deserialize)]
pub struct FilenameRuleDef {
    pub contains: String,
    #[serde(default)]
    pub extension: Option<String>,
}

/// 厂商导出文件形态
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableLayout {
    /// 普通表格；header_marker 非空时向下扫描首个包含全部标记的行作为表头
    Flat {
        #[serde(default)]
        header_marker: Vec<String>,
    },
    /// 标记行之后的一行为表头，解析到分段结束
    Sectioned { marker: String },
    /// 单列中每行一个 JSON 对象
    EncodedJson {
        #[serde(default)]
        column: usize,
        #[serde(default)]
        skip_rows: usize,
    },
    /// 整行编码为一个带引号的 CSV 字段，按位置取列
    Positional {
        columns: Vec<String>,
        #[serde(default = "default_positional_skip")]
        skip_rows: usize,
    },
}

fn default_positional_skip() -> usize {
    1
}

impl Default for TableLayout {
    fn default() -> Self {
        TableLayout::Flat { header_marker: Vec::new() }
    }
}

// ===================== 规范规则记录 =====================

/// 聚合后的一条逻辑防火墙规则
/// 字符串字段均已转小写；集合字段不含空 token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalRule {
    pub id: String,
    pub name: String,
    pub action: String,
    pub log: String,
    pub comment: String,
    pub risk_rating: String,
    pub status: String,
    pub vendor: String,
    #[serde(rename = "srcaddr", serialize_with = "serialize_joined")]
    pub src_addr: BTreeSet<String>,
    #[serde(rename = "dstaddr", serialize_with = "serialize_joined")]
    pub dst_addr: BTreeSet<String>,
    #[serde(serialize_with = "serialize_joined")]
    pub service: BTreeSet<String>,
    pub dst_port: String,
    #[serde(rename = "srcaddr_negate", skip_serializing_if = "Option::is_none")]
    pub src_addr_negate: Option<String>,
    #[serde(rename = "dstaddr_negate", skip_serializing_if = "Option::is_none")]
    pub dst_addr_negate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_negate: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CanonicalRule {
    /// 集合字段的展示形式：排序后以 ", " 连接
    pub fn render_set(values: &BTreeSet<String>) -> String {
        values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    }

    /// 按规范字段取值（集合字段返回连接后的字符串）
    pub fn field_value(&self, field: &RuleField) -> String {
        match field {
            RuleField::Id => self.id.clone(),
            RuleField::Name => self.name.clone(),
            RuleField::Action => self.action.clone(),
            RuleField::Log => self.log.clone(),
            RuleField::Comment => self.comment.clone(),
            RuleField::RiskRating => self.risk_rating.clone(),
            RuleField::Status => self.status.clone(),
            RuleField::Vendor => self.vendor.clone(),
            RuleField::SrcAddr => Self::render_set(&self.src_addr),
            RuleField::DstAddr => Self::render_set(&self.dst_addr),
            RuleField::Service => Self::render_set(&self.service),
            RuleField::DstPort => self.dst_port.clone(),
            RuleField::SrcAddrNegate => self.src_addr_negate.clone().unwrap_or_default(),
            RuleField::DstAddrNegate => self.dst_addr_negate.clone().unwrap_or_default(),
            RuleField::ServiceNegate => self.service_negate.clone().unwrap_or_default(),
            RuleField::Extra(name) => self.extra.get(name).cloned().unwrap_or_default(),
        }
    }

    /// 字段对应的取反标志是否为 enable
    pub fn is_negated(&self, field: &RuleField) -> bool {
        field
            .negate_flag()
            .map(|flag| self.field_value(&flag) == "enable")
            .unwrap_or(false)
    }

    pub fn is_disabled(&self) -> bool {
        self.status == "disable"
    }
}

fn serialize_joined<S: Serializer>(values: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&CanonicalRule::render_set(values))
}

// ===================== 检测结果 =====================

/// 单条发现项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub issue: String,
    pub field: String,
    pub value: String,
    pub severity: String,
    pub category: String,
}

// ======== 为 Finding 实现 Display trait（用于 CLI 输出） ========
impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = if self.value.is_empty() { "-" } else { &self.value };
        write!(
            f,
            "[{}] {} (Field: {} | Value: {} | Category: {})",
            self.severity, self.issue, self.field, value, self.category
        )
    }
}

/// 规则 ID，数字 ID 按数值排序，其余按字典序且排在数字之后
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 纯数字 ID 去掉前导零后的数字串（全零为 "0"）
    fn digits(&self) -> Option<&str> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = self.0.trim_start_matches('0');
        Some(if trimmed.is_empty() { "0" } else { trimmed })
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        RuleId(id.to_string())
    }
}

impl Ord for RuleId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.digits(), other.digits()) {
            // 去前导零后先比长度再比数字串，任意长度的数字 ID 都按数值排序
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RuleId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// 规则 ID -> 发现项；空列表表示“未发现问题”，不可省略
pub type AuditFindings = BTreeMap<RuleId, Vec<Finding>>;

/// 单个文件的审计报告
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub source: String,
    pub vendor: String,
    pub rules: Vec<CanonicalRule>,
    pub findings: AuditFindings,
}

impl AuditReport {
    pub fn total_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn total_findings(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    /// 按严重级别统计发现项
    pub fn severity_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for finding in self.findings.values().flatten() {
            *counts.entry(finding.severity.to_uppercase()).or_insert(0) += 1;
        }
        counts
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
