//! 规则编译器核心
//! 校验原始配置文档并编译为类型化、只读的规则库；格式错误在加载期即拒绝

use std::collections::HashMap;
use std::time::Instant;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::pattern::{
    AndCriteria, CompiledRuleLibrary, EmptyValueCheck, FieldCondition, FilenameRule, MatchMode,
    Matcher, OrCriteria, RuleDefinition, RuleSet, VendorProfile,
};
use crate::detector::severity::SeverityResolver;
use crate::error::{FfResult, FireFindError};
use crate::rule::{MatchKind, MatchModeKind, RiskRuleDef, RuleField, RuleLibrary, TableLayout, VendorMappingDef};
use crate::utils::ServicePortMap;

/// 旧版配置中按名称特殊处理的 OR 规则
const LEGACY_OR_RULE: &str = "broad_ip_range";

/// OR 规则未声明字段列表时的默认地址字段（含旧版别名）
const DEFAULT_OR_FIELDS: [&str; 4] = ["srcaddr", "dstaddr", "src_address", "dst_address"];

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 编译规则库
    pub fn compile(rule_lib: &RuleLibrary) -> FfResult<CompiledRuleLibrary> {
        let start = Instant::now();
        let mut stats = CompileStats::default();

        // 1. 全局规则集
        let global_rules = Self::compile_rule_set(&rule_lib.risk_rules, &mut stats)?;

        // 2. 厂商映射（保留声明顺序，识别时按此顺序尝试）
        let mut vendors = Vec::with_capacity(rule_lib.vendor_mappings.len());
        for (vendor_id, mapping) in &rule_lib.vendor_mappings {
            vendors.push(Self::compile_vendor(vendor_id, mapping, &mut stats)?);
        }

        // 3. 服务端口表
        let service_ports = Self::compile_service_ports(&rule_lib.service_port_map)?;

        // 4. 严重级别索引
        let severity = SeverityResolver::new(&rule_lib.risk_rules, &rule_lib.vendor_mappings);

        debug!("✅ 规则编译完成，总耗时{:?}", start.elapsed());
        debug!(
            "编译统计：规则定义 {} 个（启用 {} 个），厂商 {} 个（{} 个带专属规则集），服务端口 {} 个",
            stats.definitions,
            stats.enabled,
            vendors.len(),
            stats.vendor_overrides,
            service_ports.len()
        );

        Ok(CompiledRuleLibrary {
            global_rules,
            vendors,
            service_ports,
            severity,
        })
    }

    /// 编译一组规则定义
    fn compile_rule_set(rules: &Map<String, Value>, stats: &mut CompileStats) -> FfResult<RuleSet> {
        let mut definitions = Vec::with_capacity(rules.len());
        for (name, value) in rules {
            let definition = Self::compile_definition(name, value)?;
            stats.definitions += 1;
            if definition.enabled {
                stats.enabled += 1;
            }
            definitions.push(definition);
        }
        Ok(RuleSet { definitions })
    }

    /// 编译单条规则定义
    pub fn compile_definition(name: &str, value: &Value) -> FfResult<RuleDefinition> {
        if !value.is_object() {
            return Err(config_error(name, "规则定义必须是对象"));
        }
        let def: RiskRuleDef = serde_json::from_value(value.clone())
            .map_err(|e| config_error(name, &e.to_string()))?;

        let mode_kind = def.match_mode.unwrap_or(if name == LEGACY_OR_RULE {
            MatchModeKind::OrFields
        } else {
            MatchModeKind::AndFields
        });

        let mode = match mode_kind {
            MatchModeKind::OrFields => MatchMode::OrFieldList(Self::compile_or_criteria(name, &def)?),
            MatchModeKind::AndFields => MatchMode::AndFields(Self::compile_and_criteria(name, &def)?),
        };

        Ok(RuleDefinition {
            name: name.to_string(),
            enabled: def.enabled,
            mode,
        })
    }

    fn compile_or_criteria(name: &str, def: &RiskRuleDef) -> FfResult<OrCriteria> {
        if !def.match_fields.is_empty() || !def.match_ports.is_empty() {
            return Err(config_error(name, "or_fields 规则不能声明 match 或 match_ports"));
        }
        let values = lowered(&def.values);
        if values.is_empty() {
            return Err(config_error(name, "or_fields 规则需要非空的 values 列表"));
        }

        let raw_fields: Vec<&str> = if def.fields.is_empty() {
            DEFAULT_OR_FIELDS.to_vec()
        } else {
            def.fields.iter().map(String::as_str).collect()
        };
        // 别名解析后可能重复（srcaddr / src_address），去重保序
        let mut fields = Vec::new();
        for raw in raw_fields {
            let field = RuleField::parse(raw);
            if !fields.contains(&field) {
                fields.push(field);
            }
        }

        Ok(OrCriteria {
            fields,
            values,
            action_scope: lowered(&def.action_scope),
        })
    }

    fn compile_and_criteria(name: &str, def: &RiskRuleDef) -> FfResult<AndCriteria> {
        let match_fields = Self::compile_conditions(name, &def.match_fields, false)?;
        let port_fields = Self::compile_conditions(name, &def.match_ports, true)?;

        if !def.values.is_empty() || !def.fields.is_empty() {
            warn!("规则 '{}'：values/fields 仅用于 or_fields 规则，已忽略", name);
        }

        let equal_fields: Vec<RuleField> = def.equal_fields.iter().map(|f| RuleField::parse(f)).collect();
        if !equal_fields.is_empty() && equal_fields.len() < 2 {
            return Err(config_error(name, "equal_fields 至少需要两个字段"));
        }

        let empty_values = if def.empty_values.is_empty() {
            None
        } else {
            let field = def
                .field
                .as_deref()
                .filter(|f| !f.trim().is_empty())
                .ok_or_else(|| config_error(name, "empty_values requires a target field"))?;
            Some(EmptyValueCheck {
                field: RuleField::parse(field),
                values: def.empty_values.iter().map(|v| v.trim().to_lowercase()).collect(),
            })
        };

        Ok(AndCriteria {
            match_fields,
            port_fields,
            equal_fields,
            required_fields: def.required_fields.iter().map(|f| RuleField::parse(f)).collect(),
            bad_names: def.bad_names.iter().map(|n| n.trim().to_lowercase()).collect(),
            empty_values,
            action_scope: lowered(&def.action_scope),
        })
    }

    /// 编译 match / match_ports 字段条件
    fn compile_conditions(name: &str, conditions: &Map<String, Value>, ports: bool) -> FfResult<Vec<FieldCondition>> {
        let mut compiled = Vec::with_capacity(conditions.len());
        for (raw_field, value) in conditions {
            let field = RuleField::parse(raw_field);
            let allowed = lowered(&Self::string_list(value, &format!("{}.{}", name, raw_field))?);
            if allowed.is_empty() {
                return Err(config_error(name, &format!("字段 '{}' 没有可匹配的值", raw_field)));
            }

            let matcher = match (ports, &field, field.match_kind()) {
                (true, RuleField::DstPort, _) => Matcher::Exact(allowed),
                (true, _, _) => Matcher::Ports(allowed),
                (false, _, MatchKind::Whole) => Matcher::Whole(allowed),
                (false, _, MatchKind::Tokens) => Matcher::Tokens(allowed),
            };
            compiled.push(FieldCondition { field, matcher });
        }
        Ok(compiled)
    }

    /// 字符串或字符串列表
    fn string_list(value: &Value, context: &str) -> FfResult<Vec<String>> {
        match value {
            Value::String(s) => Ok(vec![s.clone()]),
            Value::Array(arr) => arr
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(FireFindError::ConfigError(format!(
                        "{}：列表元素应为字符串，实际为 {}",
                        context, other
                    ))),
                })
                .collect(),
            other => Err(FireFindError::ConfigError(format!(
                "{}：应为字符串或字符串列表，实际为 {}",
                context, other
            ))),
        }
    }

    /// 编译厂商映射
    fn compile_vendor(vendor_id: &str, value: &Value, stats: &mut CompileStats) -> FfResult<VendorProfile> {
        let context = format!("vendor_mappings.{}", vendor_id);
        if !value.is_object() {
            return Err(FireFindError::ConfigError(format!("{}：厂商映射必须是对象", context)));
        }
        let def: VendorMappingDef = serde_json::from_value(value.clone())
            .map_err(|e| FireFindError::ConfigError(format!("{}：{}", context, e)))?;

        let mut columns = HashMap::new();
        for (raw_field, aliases) in &def.columns {
            let aliases = lowered(&Self::string_list(aliases, &format!("{}.columns.{}", context, raw_field))?);
            columns.insert(RuleField::parse(raw_field), aliases);
        }

        let mut extra_fields = Vec::new();
        for (raw_field, header) in &def.extra_fields {
            let header = header.as_str().ok_or_else(|| {
                FireFindError::ConfigError(format!("{}.extra_fields.{}：应为表头名称", context, raw_field))
            })?;
            extra_fields.push((RuleField::parse(raw_field), header.trim().to_lowercase()));
        }

        let defaults = def
            .defaults
            .iter()
            .map(|(field, value)| (RuleField::parse(field), value.trim().to_lowercase()))
            .collect();

        let normalization = def
            .normalization
            .iter()
            .map(|(field, table)| {
                let table = table
                    .iter()
                    .map(|(raw, normalized)| (raw.trim().to_lowercase(), normalized.trim().to_lowercase()))
                    .collect();
                (RuleField::parse(field), table)
            })
            .collect();

        let filename_rules = def
            .detect_filenames
            .iter()
            .map(|rule| FilenameRule {
                contains: rule.contains.trim().to_lowercase(),
                extension: rule.extension.as_ref().map(|ext| ext.trim().trim_start_matches('.').to_lowercase()),
            })
            .collect();

        let rules = match &def.risk_rules {
            Some(rules) if !rules.is_empty() => {
                stats.vendor_overrides += 1;
                Some(Self::compile_rule_set(rules, stats)?)
            }
            _ => None,
        };

        Ok(VendorProfile {
            id: vendor_id.to_string(),
            detect_headers: lowered(&def.detect_headers_any),
            filename_rules,
            columns,
            defaults,
            normalization,
            extra_fields,
            layout: Self::compile_layout(&context, def.layout)?,
            rules,
        })
    }

    /// 校验并规范化表格形态参数
    fn compile_layout(context: &str, layout: TableLayout) -> FfResult<TableLayout> {
        match layout {
            TableLayout::Flat { header_marker } => Ok(TableLayout::Flat { header_marker: lowered(&header_marker) }),
            TableLayout::Sectioned { marker } => {
                let marker = marker.trim().to_lowercase();
                if marker.is_empty() {
                    return Err(FireFindError::ConfigError(format!("{}：分段布局需要 marker", context)));
                }
                Ok(TableLayout::Sectioned { marker })
            }
            TableLayout::Positional { columns, skip_rows } => {
                if columns.is_empty() {
                    return Err(FireFindError::ConfigError(format!("{}：位置型布局需要 columns", context)));
                }
                Ok(TableLayout::Positional { columns: lowered(&columns), skip_rows })
            }
            encoded @ TableLayout::EncodedJson { .. } => Ok(encoded),
        }
    }

    /// 端口值必须为纯数字，保证服务名归一化幂等
    fn compile_service_ports(entries: &HashMap<String, String>) -> FfResult<ServicePortMap> {
        for (service, port) in entries {
            let port = port.trim();
            if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
                return Err(FireFindError::ConfigError(format!(
                    "service_port_map.{}：端口 '{}' 不是数字",
                    service, port
                )));
            }
        }
        Ok(ServicePortMap::new(entries.iter().map(|(k, v)| (k.clone(), v.clone()))))
    }
}

fn config_error(rule_name: &str, reason: &str) -> FireFindError {
    FireFindError::ConfigError(format!("risk_rules.{}：{}", rule_name, reason))
}

/// 去空白、转小写、丢弃空值
fn lowered(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// 编译统计信息
#[derive(Debug, Clone, Default)]
struct CompileStats {
    definitions: usize,
    enabled: usize,
    vendor_overrides: usize,
}
