//! 多行聚合器
//! 同一规则 ID 的多行合并为一条规范规则：集合字段取并集，标量字段取首个非空值

use std::collections::{BTreeSet, HashMap};

use crate::compiler::VendorProfile;
use crate::rule::{CanonicalRule, RuleField};
use crate::utils::{extract_port, is_blank_value, split_cell_values};

/// 标量字段（集合字段之外需要按别名解析的规范字段）
const SCALAR_FIELDS: [RuleField; 10] = [
    RuleField::Name,
    RuleField::Action,
    RuleField::Log,
    RuleField::Comment,
    RuleField::RiskRating,
    RuleField::Status,
    RuleField::DstPort,
    RuleField::SrcAddrNegate,
    RuleField::DstAddrNegate,
    RuleField::ServiceNegate,
];

const SET_FIELDS: [RuleField; 3] = [RuleField::SrcAddr, RuleField::DstAddr, RuleField::Service];

/// 一行原始数据：小写表头 -> 去空白后的单元格
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    /// 按表头组装；重复表头保留第一个，缺失单元格按空处理
    pub fn from_pairs(headers: &[String], values: &[String]) -> Self {
        let mut row = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            let value = values.get(idx).map(String::as_str).unwrap_or("");
            row.insert(header, value);
        }
        row
    }

    pub fn insert(&mut self, header: &str, value: &str) {
        let header = header.trim().to_lowercase();
        if header.is_empty() {
            return;
        }
        self.cells.entry(header).or_insert_with(|| value.trim().to_string());
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells.get(header).map(String::as_str)
    }
}

/// 规则聚合器（按首次出现顺序输出）
pub struct RuleAggregator<'a> {
    profile: &'a VendorProfile,
    extra_fields: Vec<RuleField>,
    order: Vec<String>,
    pending: HashMap<String, CanonicalRule>,
}

impl<'a> RuleAggregator<'a> {
    pub fn new(profile: &'a VendorProfile) -> Self {
        Self {
            profile,
            extra_fields: profile.extra_field_names(),
            order: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// 别名解析：按声明顺序取第一个非空别名的值，转小写后应用厂商归一化表
    pub fn resolve(&self, row: &RawRow, field: &RuleField) -> String {
        self.profile
            .aliases(field)
            .into_iter()
            .filter_map(|alias| row.get(alias))
            .find(|value| !is_blank_value(value))
            .map(|value| self.profile.normalize(field, &value.to_lowercase()))
            .unwrap_or_default()
    }

    /// 以行内 ID 字段聚合，ID 为空时忽略该行
    pub fn push(&mut self, row: &RawRow) -> bool {
        let id = self.resolve(row, &RuleField::Id);
        if id.is_empty() {
            return false;
        }
        self.push_with_id(id, row);
        true
    }

    /// 以外部给定的 ID 聚合（ID 列已由调用方定位）
    pub fn push_with_id(&mut self, id: String, row: &RawRow) {
        let id = id.trim().to_lowercase();
        if !self.pending.contains_key(&id) {
            self.order.push(id.clone());
            let rule = CanonicalRule {
                id: id.clone(),
                vendor: self.profile.id.to_lowercase(),
                ..Default::default()
            };
            self.pending.insert(id.clone(), rule);
        }

        let scalars: Vec<(RuleField, String)> = SCALAR_FIELDS
            .iter()
            .chain(self.extra_fields.iter())
            .map(|field| (field.clone(), self.resolve(row, field)))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        let sets: Vec<(RuleField, Vec<String>)> = SET_FIELDS
            .iter()
            .map(|field| (field.clone(), self.resolve_set(row, field)))
            .collect();

        let Some(rule) = self.pending.get_mut(&id) else {
            return;
        };
        for (field, value) in scalars {
            fill_scalar(rule, &field, value);
        }
        for (field, values) in sets {
            if let Some(set) = set_mut(rule, &field) {
                set.extend(values);
            }
        }
    }

    /// 集合字段：单元格内以逗号/分号/换行分隔的多个值逐个归一化
    fn resolve_set(&self, row: &RawRow, field: &RuleField) -> Vec<String> {
        let raw = self.resolve(row, field);
        split_cell_values(&raw)
            .filter(|token| !token.is_empty())
            .map(|token| self.profile.normalize(field, token))
            .filter(|token| !token.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 输出规范规则：填充默认值、状态缺省为 enable、由服务派生目标端口
    pub fn finish(mut self) -> Vec<CanonicalRule> {
        let profile = self.profile;
        let mut rules = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let Some(mut rule) = self.pending.remove(id) else {
                continue;
            };

            for field in SCALAR_FIELDS.iter().chain(self.extra_fields.iter()) {
                if rule.field_value(field).is_empty() {
                    if let Some(default) = profile.default_for(field) {
                        fill_scalar(&mut rule, field, profile.normalize(field, default));
                    }
                }
            }
            for field in &SET_FIELDS {
                if let (Some(default), Some(set)) = (profile.default_for(field), set_mut(&mut rule, field)) {
                    if set.is_empty() {
                        set.extend(split_cell_values(default).filter(|t| !t.is_empty()).map(str::to_string));
                    }
                }
            }

            if rule.status.is_empty() {
                rule.status = "enable".to_string();
            }
            if rule.dst_port.is_empty() {
                rule.dst_port = extract_port(&CanonicalRule::render_set(&rule.service));
            }
            rules.push(rule);
        }
        rules
    }
}

/// 标量字段仅在当前为空时写入（首行优先，后续行补空）
fn fill_scalar(rule: &mut CanonicalRule, field: &RuleField, value: String) {
    let slot = match field {
        RuleField::Name => &mut rule.name,
        RuleField::Action => &mut rule.action,
        RuleField::Log => &mut rule.log,
        RuleField::Comment => &mut rule.comment,
        RuleField::RiskRating => &mut rule.risk_rating,
        RuleField::Status => &mut rule.status,
        RuleField::DstPort => &mut rule.dst_port,
        RuleField::SrcAddrNegate => rule.src_addr_negate.get_or_insert_with(String::new),
        RuleField::DstAddrNegate => rule.dst_addr_negate.get_or_insert_with(String::new),
        RuleField::ServiceNegate => rule.service_negate.get_or_insert_with(String::new),
        RuleField::Extra(name) => rule.extra.entry(name.clone()).or_default(),
        _ => return,
    };
    if slot.is_empty() {
        *slot = value;
    }
}

fn set_mut<'r>(rule: &'r mut CanonicalRule, field: &RuleField) -> Option<&'r mut BTreeSet<String>> {
    match field {
        RuleField::SrcAddr => Some(&mut rule.src_addr),
        RuleField::DstAddr => Some(&mut rule.dst_addr),
        RuleField::Service => Some(&mut rule.service),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::TableLayout;

    fn profile() -> VendorProfile {
        let mut columns = HashMap::new();
        columns.insert(RuleField::Id, vec!["policyid".to_string()]);
        columns.insert(RuleField::SrcAddr, vec!["srcaddr".to_string(), "source".to_string()]);
        columns.insert(RuleField::Service, vec!["service".to_string()]);
        columns.insert(RuleField::Log, vec!["logtraffic".to_string()]);
        let mut defaults = HashMap::new();
        defaults.insert(RuleField::Log, "all".to_string());
        let mut log_table = HashMap::new();
        log_table.insert("disable".to_string(), "no".to_string());
        let mut normalization = HashMap::new();
        normalization.insert(RuleField::Log, log_table);

        VendorProfile {
            id: "Fortinet".to_string(),
            detect_headers: Vec::new(),
            filename_rules: Vec::new(),
            columns,
            defaults,
            normalization,
            extra_fields: Vec::new(),
            layout: TableLayout::default(),
            rules: None,
        }
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        let mut row = RawRow::default();
        for (header, value) in pairs {
            row.insert(header, value);
        }
        row
    }

    #[test]
    fn test_first_non_blank_alias_wins() {
        let profile = profile();
        let aggregator = RuleAggregator::new(&profile);
        let raw = row(&[("srcaddr", "nan"), ("source", "LAN")]);
        assert_eq!(aggregator.resolve(&raw, &RuleField::SrcAddr), "lan");
        assert_eq!(aggregator.resolve(&row(&[("logtraffic", "Disable")]), &RuleField::Log), "no");
    }

    #[test]
    fn test_rows_sharing_id_are_merged() {
        let profile = profile();
        let mut aggregator = RuleAggregator::new(&profile);
        aggregator.push(&row(&[("policyid", "7"), ("srcaddr", "b"), ("service", "HTTPS")]));
        aggregator.push(&row(&[("policyid", "7"), ("srcaddr", "a; c"), ("service", "SSH")]));
        aggregator.push(&row(&[("policyid", "8"), ("logtraffic", "disable")]));
        assert!(!aggregator.push(&row(&[("policyid", ""), ("srcaddr", "x")])));

        let rules = aggregator.finish();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "7");
        assert_eq!(rules[0].field_value(&RuleField::SrcAddr), "a, b, c");
        assert_eq!(rules[0].field_value(&RuleField::Service), "https, ssh");
        assert_eq!(rules[0].log, "all");
        assert_eq!(rules[0].status, "enable");
        assert_eq!(rules[0].vendor, "fortinet");
        assert_eq!(rules[1].log, "no");
    }

    #[test]
    fn test_dst_port_is_derived_from_service() {
        let profile = profile();
        let mut aggregator = RuleAggregator::new(&profile);
        aggregator.push(&row(&[("policyid", "1"), ("service", "TCP_3389")]));
        assert_eq!(aggregator.finish()[0].dst_port, "3389");
    }
}
