//! 规则评估引擎
//! 规范规则 + 规则定义 -> 发现项；AND 条件与 OR 字段列表两种组合方式

use std::sync::Arc;
use rayon::prelude::*;
use tracing::debug;

use crate::compiler::{AndCriteria, CompiledRuleLibrary, FieldCondition, MatchMode, Matcher, OrCriteria, RuleSet};
use crate::rule::{AuditFindings, CanonicalRule, Finding, RuleField, RuleId};
use crate::utils::{tokenize, ServicePortMap};

/// 未声明匹配字段的定义命中时使用的字段名
pub const UNSPECIFIED_FIELD: &str = "unspecified";

/// 单次命中：(字段, 值)
type Hit = (String, String);

fn hit(field: &RuleField, value: impl Into<String>) -> Hit {
    (field.key().to_string(), value.into())
}

/// 字段条件分析器（match / match_ports）
pub struct FieldAnalyzer;

impl FieldAnalyzer {
    /// 返回字段中命中的值；空列表表示该字段不匹配
    pub fn analyze(service_ports: &ServicePortMap, rule: &CanonicalRule, condition: &FieldCondition) -> Vec<String> {
        let value = rule.field_value(&condition.field);
        let matcher = &condition.matcher;

        match matcher {
            Matcher::Whole(_) | Matcher::Exact(_) => {
                if !value.is_empty() && matcher.is_match(&value) {
                    vec![value]
                } else {
                    Vec::new()
                }
            }
            Matcher::Tokens(_) => distinct(tokenize(&value).into_iter().filter(|token| matcher.is_match(token))),
            // 端口匹配报告原始 token（如 ssh），比较时使用归一化后的端口
            Matcher::Ports(_) => distinct(
                tokenize(&value)
                    .into_iter()
                    .filter(|token| matcher.is_match(&service_ports.normalize(token))),
            ),
        }
    }
}

/// AND 条件分析器
pub struct AndAnalyzer;

impl AndAnalyzer {
    pub fn analyze(service_ports: &ServicePortMap, rule: &CanonicalRule, criteria: &AndCriteria) -> Vec<Hit> {
        // 1. 取反的地址/服务字段无法做正向匹配，直接视为不匹配
        if criteria.match_fields.iter().any(|cond| rule.is_negated(&cond.field)) {
            return Vec::new();
        }

        let mut hits = Vec::new();

        // 2. 字段匹配，任一字段不匹配即放弃该定义
        for condition in &criteria.match_fields {
            let matched = FieldAnalyzer::analyze(service_ports, rule, condition);
            if matched.is_empty() {
                return Vec::new();
            }
            hits.extend(matched.into_iter().map(|value| hit(&condition.field, value)));
        }

        // 3. 端口匹配
        for condition in &criteria.port_fields {
            if rule.is_negated(&condition.field) {
                return Vec::new();
            }
            let matched = FieldAnalyzer::analyze(service_ports, rule, condition);
            if matched.is_empty() {
                return Vec::new();
            }
            hits.extend(matched.into_iter().map(|value| hit(&condition.field, value)));
        }

        // 字段值相同（源等于目的）
        if let Some(first) = criteria.equal_fields.first() {
            let expected = rule.field_value(first);
            if expected.is_empty() || criteria.equal_fields.iter().any(|f| rule.field_value(f) != expected) {
                return Vec::new();
            }
            hits.extend(criteria.equal_fields.iter().map(|f| hit(f, expected.clone())));
        }

        // 4. 必填字段：逐个空字段报告，并抢占后续检查
        let blanks: Vec<Hit> = criteria
            .required_fields
            .iter()
            .filter(|field| rule.field_value(field).trim().is_empty())
            .map(|field| hit(field, ""))
            .collect();
        if !blanks.is_empty() {
            return blanks;
        }

        // 5. 无效名称
        let name = rule.name.trim().to_lowercase();
        if criteria.bad_names.contains(&name) {
            return vec![hit(&RuleField::Name, name)];
        }

        // 6. 占位空值
        if let Some(check) = &criteria.empty_values {
            let value = rule.field_value(&check.field).trim().to_lowercase();
            if check.values.contains(&value) {
                return vec![hit(&check.field, value)];
            }
        }

        // 7. 动作范围
        if !in_action_scope(&criteria.action_scope, rule) {
            return Vec::new();
        }

        // 8. 无正向条件、无抢占检查的定义通过所有闸门时报告一次
        if hits.is_empty() && !criteria.has_match_conditions() && !criteria.has_preemptive_checks() {
            hits.push((UNSPECIFIED_FIELD.to_string(), String::new()));
        }
        hits
    }
}

/// OR 字段列表分析器：逐字段独立判断，每个字段至多报告一次
pub struct FieldListAnalyzer;

impl FieldListAnalyzer {
    pub fn analyze(rule: &CanonicalRule, criteria: &OrCriteria) -> Vec<Hit> {
        if !in_action_scope(&criteria.action_scope, rule) {
            return Vec::new();
        }

        criteria
            .fields
            .iter()
            .filter_map(|field| {
                let value = rule.field_value(field);
                tokenize(&value)
                    .into_iter()
                    .find(|token| criteria.values.iter().any(|v| v.as_str() == *token))
                    .map(|token| hit(field, token))
            })
            .collect()
    }
}

/// 空范围表示不限制动作
fn in_action_scope(scope: &[String], rule: &CanonicalRule) -> bool {
    scope.is_empty() || scope.iter().any(|action| *action == rule.action.trim())
}

/// 去重保序
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|existing| existing == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// 规则评估器
/// 规则库只读共享，各规则记录之间无可变状态，可并行评估
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    compiled_lib: Arc<CompiledRuleLibrary>,
}

impl RuleEvaluator {
    pub fn new(compiled_lib: Arc<CompiledRuleLibrary>) -> Self {
        Self { compiled_lib }
    }

    /// 使用规则所属厂商的规则集评估（厂商规则集为空时退回全局）
    pub fn evaluate(&self, rule: &CanonicalRule) -> Vec<Finding> {
        let (rule_set, scope) = self.compiled_lib.rule_set_for(&rule.vendor);
        self.evaluate_with(rule, rule_set, scope)
    }

    /// 使用指定规则集评估；scope 为严重级别解析的厂商作用域
    pub fn evaluate_with(&self, rule: &CanonicalRule, rule_set: &RuleSet, scope: Option<&str>) -> Vec<Finding> {
        if rule.is_disabled() {
            return Vec::new();
        }

        let mut findings = Vec::new();
        for definition in rule_set.enabled() {
            let hits = match &definition.mode {
                MatchMode::AndFields(criteria) => AndAnalyzer::analyze(&self.compiled_lib.service_ports, rule, criteria),
                MatchMode::OrFieldList(criteria) => FieldListAnalyzer::analyze(rule, criteria),
            };
            if hits.is_empty() {
                continue;
            }

            let (severity, category) = self.compiled_lib.severity.resolve(&definition.name, scope);
            let matchers: Vec<&str> = match &definition.mode {
                MatchMode::AndFields(criteria) => criteria
                    .match_fields
                    .iter()
                    .chain(criteria.port_fields.iter())
                    .map(|condition| condition.matcher.describe())
                    .collect(),
                MatchMode::OrFieldList(_) => vec!["field_list"],
            };
            debug!(
                "规则 {} 命中定义 '{}'：{} 个字段，匹配方式 {:?}",
                rule.id,
                definition.name,
                hits.len(),
                matchers
            );
            findings.extend(hits.into_iter().map(|(field, value)| Finding {
                issue: definition.name.clone(),
                field,
                value,
                severity: severity.clone(),
                category: category.clone(),
            }));
        }
        findings
    }

    /// 批量评估，结果按规则 ID 排序；无发现项的规则保留空列表
    pub fn evaluate_all(&self, rules: &[CanonicalRule], parallel: bool) -> AuditFindings {
        let evaluate = |rule: &CanonicalRule| (RuleId::from(rule.id.as_str()), self.evaluate(rule));
        let results: Vec<(RuleId, Vec<Finding>)> = if parallel {
            rules.par_iter().map(evaluate).collect()
        } else {
            rules.iter().map(evaluate).collect()
        };

        let mut findings = AuditFindings::new();
        for (id, list) in results {
            findings.entry(id).or_default().extend(list);
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::compiler::RuleCompiler;
    use crate::rule::RuleLoader;

    fn evaluator(config: serde_json::Value) -> RuleEvaluator {
        let library = RuleLoader::from_value(config).unwrap();
        RuleEvaluator::new(Arc::new(RuleCompiler::compile(&library).unwrap()))
    }

    fn set(values: &[&str]) -> std::collections::BTreeSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn rule(action: &str, src: &[&str], dst: &[&str], service: &[&str]) -> CanonicalRule {
        CanonicalRule {
            id: "1".to_string(),
            name: "web".to_string(),
            action: action.to_string(),
            log: "all".to_string(),
            status: "enable".to_string(),
            vendor: "fortinet".to_string(),
            src_addr: set(src),
            dst_addr: set(dst),
            service: set(service),
            ..Default::default()
        }
    }

    fn issues(findings: &[Finding]) -> Vec<(&str, &str, &str)> {
        findings.iter().map(|f| (f.issue.as_str(), f.field.as_str(), f.value.as_str())).collect()
    }

    fn default_rules() -> serde_json::Value {
        json!({
            "risk_rules": {
                "allow_all": {
                    "enabled": true,
                    "match": {"action": ["accept"], "srcaddr": ["any"], "dstaddr": ["any"]},
                    "severity": "HIGH",
                    "category": "Overly Permissive"
                },
                "admin_port_exposed": {
                    "enabled": true,
                    "match_ports": {"dst_port": ["22", "3389", "23"]},
                    "severity": "CRITICAL"
                },
                "broad_ip_range": {
                    "enabled": true,
                    "values": ["0.0.0.0/0", "any"],
                    "action_scope": ["accept"],
                    "severity": "HIGH"
                },
                "incomplete_rule": {
                    "enabled": true,
                    "required_fields": ["srcaddr", "dstaddr", "action", "service"],
                    "severity": "HIGH"
                },
                "untagged_rule": {"enabled": false, "required_fields": ["tag"]}
            },
            "service_port_map": {"ssh": "22", "rdp": "3389"}
        })
    }

    #[test]
    fn test_allow_all_matches_every_field() {
        let evaluator = evaluator(default_rules());
        let findings = evaluator.evaluate(&rule("accept", &["any"], &["any"], &["all"]));
        let allow_all: Vec<_> = issues(&findings).into_iter().filter(|(issue, _, _)| *issue == "allow_all").collect();
        assert_eq!(
            allow_all,
            vec![("allow_all", "action", "accept"), ("allow_all", "srcaddr", "any"), ("allow_all", "dstaddr", "any")]
        );
        assert_eq!(findings[0].severity, "HIGH");
        assert_eq!(findings[0].category, "Overly Permissive");
    }

    #[test]
    fn test_disabled_rule_yields_nothing() {
        let evaluator = evaluator(default_rules());
        let mut disabled = rule("accept", &["any"], &["any"], &["ssh"]);
        disabled.status = "disable".to_string();
        assert!(evaluator.evaluate(&disabled).is_empty());
    }

    #[test]
    fn test_dst_port_match() {
        let evaluator = evaluator(default_rules());
        let mut target = rule("deny", &["lan"], &["rdp-host"], &["tcp_3389"]);
        target.dst_port = "3389".to_string();
        let findings = evaluator.evaluate(&target);
        assert_eq!(issues(&findings), vec![("admin_port_exposed", "dst_port", "3389")]);
        assert_eq!(findings[0].category, crate::detector::severity::UNCATEGORIZED);
    }

    #[test]
    fn test_negated_source_suppresses_definition() {
        let evaluator = evaluator(default_rules());
        let mut negated = rule("accept", &["any"], &["any"], &["all"]);
        negated.src_addr_negate = Some("enable".to_string());
        let findings = evaluator.evaluate(&negated);
        assert!(findings.iter().all(|f| f.issue != "allow_all"));
    }

    #[test]
    fn test_broad_ip_range_is_or_across_fields() {
        let evaluator = evaluator(default_rules());
        let findings = evaluator.evaluate(&rule("accept", &["10.0.0.0/8"], &["any"], &["https"]));
        let broad: Vec<_> = issues(&findings).into_iter().filter(|(issue, _, _)| *issue == "broad_ip_range").collect();
        assert_eq!(broad, vec![("broad_ip_range", "dstaddr", "any")]);

        let denied = evaluator.evaluate(&rule("deny", &["any"], &["any"], &["https"]));
        assert!(denied.iter().all(|f| f.issue != "broad_ip_range"));
    }

    #[test]
    fn test_required_fields_preempt_match_findings() {
        let evaluator = evaluator(default_rules());
        let findings = evaluator.evaluate(&rule("accept", &["lan"], &[], &[]));
        let incomplete: Vec<_> = issues(&findings).into_iter().filter(|(issue, _, _)| *issue == "incomplete_rule").collect();
        assert_eq!(incomplete, vec![("incomplete_rule", "dstaddr", ""), ("incomplete_rule", "service", "")]);
    }

    #[test]
    fn test_blank_required_field_suppresses_matched_conditions() {
        let evaluator = evaluator(json!({
            "risk_rules": {
                "open_without_service": {
                    "enabled": true,
                    "match": {"action": ["accept"], "srcaddr": ["any"]},
                    "required_fields": ["service", "name"],
                    "severity": "MEDIUM"
                }
            }
        }));

        let blank = evaluator.evaluate(&rule("accept", &["any"], &["lan"], &[]));
        assert_eq!(issues(&blank), vec![("open_without_service", "service", "")]);
        assert_eq!(blank[0].severity, "MEDIUM");

        let complete = evaluator.evaluate(&rule("accept", &["any"], &["lan"], &["https"]));
        assert_eq!(
            issues(&complete),
            vec![("open_without_service", "action", "accept"), ("open_without_service", "srcaddr", "any")]
        );

        assert!(evaluator.evaluate(&rule("deny", &["any"], &["lan"], &[])).is_empty());
    }

    #[test]
    fn test_service_ports_report_original_token() {
        let evaluator = evaluator(json!({
            "risk_rules": {
                "ssh_open": {"enabled": true, "match_ports": {"service": ["22"]}, "action_scope": ["accept"]}
            },
            "service_port_map": {"ssh": "22"}
        }));
        let findings = evaluator.evaluate(&rule("accept", &["any"], &["any"], &["https", "ssh"]));
        assert_eq!(issues(&findings), vec![("ssh_open", "service", "ssh")]);

        let mut negated = rule("accept", &["any"], &["any"], &["ssh"]);
        negated.service_negate = Some("enable".to_string());
        assert!(evaluator.evaluate(&negated).is_empty());
        assert!(evaluator.evaluate(&rule("deny", &["any"], &["any"], &["ssh"])).is_empty());
    }

    #[test]
    fn test_bad_names_empty_values_and_unspecified() {
        let evaluator = evaluator(json!({
            "risk_rules": {
                "missing_name": {"enabled": true, "bad_names": ["", "default"], "severity": "LOW"},
                "no_logging": {"enabled": true, "empty_values": ["", "no", "disable"], "field": "log"},
                "any_accept": {"enabled": true, "action_scope": ["accept"]},
                "redundant_rule": {"enabled": true, "equal_fields": ["srcaddr", "dstaddr"]}
            }
        }));

        let mut target = rule("accept", &["lan"], &["lan"], &["https"]);
        target.name = "Default".to_string();
        target.log = "disable".to_string();
        assert_eq!(
            issues(&evaluator.evaluate(&target)),
            vec![
                ("missing_name", "name", "default"),
                ("no_logging", "log", "disable"),
                ("any_accept", UNSPECIFIED_FIELD, ""),
                ("redundant_rule", "srcaddr", "lan"),
                ("redundant_rule", "dstaddr", "lan"),
            ]
        );

        let clean = rule("deny", &["lan"], &["wan"], &["https"]);
        assert!(evaluator.evaluate(&clean).is_empty());
    }

    #[test]
    fn test_vendor_rule_set_and_scoped_severity() {
        let evaluator = evaluator(json!({
            "risk_rules": {
                "allow_all": {"enabled": true, "match": {"action": ["accept"]}, "severity": "HIGH"}
            },
            "vendor_mappings": {
                "sophos": {
                    "risk_rules": {
                        "allow_all": {"enabled": true, "match": {"action": ["accept"]}, "severity": "CRITICAL"}
                    }
                }
            }
        }));

        let mut sophos = rule("accept", &["any"], &["any"], &["any"]);
        sophos.vendor = "sophos".to_string();
        assert_eq!(evaluator.evaluate(&sophos)[0].severity, "CRITICAL");
        assert_eq!(evaluator.evaluate(&rule("accept", &["any"], &["any"], &["any"]))[0].severity, "HIGH");
    }

    #[test]
    fn test_evaluate_all_keeps_empty_groups_in_id_order() {
        let evaluator = evaluator(default_rules());
        let mut rules = Vec::new();
        for (id, action) in [("10", "accept"), ("2", "deny"), ("x", "deny")] {
            let mut r = rule(action, &["any"], &["any"], &["https"]);
            r.id = id.to_string();
            rules.push(r);
        }

        let sequential = evaluator.evaluate_all(&rules, false);
        let parallel = evaluator.evaluate_all(&rules, true);
        assert_eq!(sequential, parallel);
        let ids: Vec<&str> = sequential.keys().map(RuleId::as_str).collect();
        assert_eq!(ids, vec!["2", "10", "x"]);
        assert!(sequential[&RuleId::from("2")].is_empty());
        assert!(!sequential[&RuleId::from("10")].is_empty());
    }
}
