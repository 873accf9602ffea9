//! 表格型导出：普通表格与分段表格
//! 定位表头与 ID 列后，仅保留 ID 为纯数字的行（过滤页脚、重复表头等元数据行）

use tracing::debug;

use super::aggregator::{RawRow, RuleAggregator};
use crate::compiler::VendorProfile;
use crate::error::{FfResult, FireFindError};
use crate::extractor::RawSheet;
use crate::rule::{CanonicalRule, RuleField};

/// 普通表格
/// header_marker 为空时第 0 行为表头，否则取首个包含全部标记的行
pub fn parse_flat(sheet: &RawSheet, profile: &VendorProfile, header_marker: &[String]) -> FfResult<Vec<CanonicalRule>> {
    let header_idx = if header_marker.is_empty() {
        if sheet.rows.is_empty() {
            return Err(FireFindError::FormatError(format!("{}：文件为空", sheet.path.display())));
        }
        0
    } else {
        sheet
            .rows
            .iter()
            .position(|row| {
                let cells = lowered_cells(row);
                header_marker.iter().all(|marker| cells.contains(marker))
            })
            .ok_or_else(|| {
                FireFindError::FormatError(format!(
                    "{}：未找到包含 [{}] 的表头行",
                    sheet.path.display(),
                    header_marker.join(", ")
                ))
            })?
    };

    let headers = lowered_cells(&sheet.rows[header_idx]);
    aggregate_table(sheet, profile, &headers, &sheet.rows[header_idx + 1..])
}

/// 分段表格：标记行的下一行为表头，分段在首个空行或标题行处结束
pub fn parse_sectioned(sheet: &RawSheet, profile: &VendorProfile, marker: &str) -> FfResult<Vec<CanonicalRule>> {
    let marker_idx = sheet
        .rows
        .iter()
        .position(|row| row.iter().any(|cell| cell.trim().to_lowercase().contains(marker)))
        .ok_or_else(|| {
            FireFindError::FormatError(format!("{}：未找到 '{}' 分段", sheet.path.display(), marker))
        })?;

    let header_row = sheet.rows.get(marker_idx + 1).ok_or_else(|| {
        FireFindError::FormatError(format!("{}：'{}' 分段缺少表头行", sheet.path.display(), marker))
    })?;
    let headers = lowered_cells(header_row);

    let body = &sheet.rows[marker_idx + 2..];
    let section_len = body
        .iter()
        .position(|row| row.iter().filter(|cell| !cell.trim().is_empty()).count() <= 1)
        .unwrap_or(body.len());
    debug!("分段 '{}' 共 {} 行", marker, section_len);

    aggregate_table(sheet, profile, &headers, &body[..section_len])
}

/// 定位 ID 列并按 ID 聚合数据行
fn aggregate_table(
    sheet: &RawSheet,
    profile: &VendorProfile,
    headers: &[String],
    rows: &[Vec<String>],
) -> FfResult<Vec<CanonicalRule>> {
    let id_column = profile
        .aliases(&RuleField::Id)
        .into_iter()
        .find(|alias| headers.iter().any(|header| header.as_str() == *alias))
        .ok_or_else(|| {
            FireFindError::FormatError(format!(
                "{}：表头中缺少 ID 列（{}）",
                sheet.path.display(),
                profile.aliases(&RuleField::Id).join(", ")
            ))
        })?;

    let mut aggregator = RuleAggregator::new(profile);
    let mut skipped = 0usize;
    for values in rows {
        if RawSheet::is_blank_row(values) {
            continue;
        }
        let row = RawRow::from_pairs(headers, values);
        let id = row.get(id_column).unwrap_or("");
        if !is_numeric_id(id) {
            skipped += 1;
            continue;
        }
        aggregator.push_with_id(id.to_string(), &row);
    }
    debug!(
        "从 {1} 行聚合出 {0} 条规则（跳过 {2} 个非规则行）",
        aggregator.len(),
        rows.len(),
        skipped
    );
    Ok(aggregator.finish())
}

fn is_numeric_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())
}

fn lowered_cells(row: &[String]) -> Vec<String> {
    row.iter().map(|cell| cell.trim().to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::extractor::SheetReader;
    use crate::rule::TableLayout;

    fn profile(columns: &[(RuleField, &[&str])], layout: TableLayout) -> VendorProfile {
        VendorProfile {
            id: "test".to_string(),
            detect_headers: Vec::new(),
            filename_rules: Vec::new(),
            columns: columns
                .iter()
                .map(|(field, aliases)| (field.clone(), aliases.iter().map(|a| a.to_string()).collect()))
                .collect(),
            defaults: HashMap::new(),
            normalization: HashMap::new(),
            extra_fields: Vec::new(),
            layout,
            rules: None,
        }
    }

    #[test]
    fn test_flat_keeps_numeric_ids_only() {
        let profile = profile(&[(RuleField::Id, &["policyid", "id"])], TableLayout::default());
        let sheet = SheetReader::from_csv_str(
            "fw.csv",
            "ID,Name,srcaddr,dstaddr,action\n1,web,LAN,any,accept\n1,web,DMZ,any,accept\nTotal,2,,,\n2,db,lan,db01,deny\n",
        )
        .unwrap();

        let rules = parse_flat(&sheet, &profile, &[]).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].field_value(&RuleField::SrcAddr), "dmz, lan");
        assert_eq!(rules[1].action, "deny");
    }

    #[test]
    fn test_flat_header_marker_skips_metadata_rows() {
        let profile = profile(&[(RuleField::Id, &["seq #"]), (RuleField::SrcAddr, &["source"])], TableLayout::default());
        let sheet = SheetReader::from_csv_str(
            "client1.csv",
            "Exported by admin,,\n,,\nSeq #,Action,Source\n5,Allow,Any\nSeq #,Action,Source\n6,Deny,10.0.0.0/8\n",
        )
        .unwrap();

        let rules = parse_flat(&sheet, &profile, &["seq #".to_string(), "action".to_string()]).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].action, "allow");
        assert_eq!(rules[1].field_value(&RuleField::SrcAddr), "10.0.0.0/8");
    }

    #[test]
    fn test_flat_blank_rows_and_unmapped_field_aliases() {
        let profile = profile(&[(RuleField::Id, &["policyid"])], TableLayout::default());
        assert_eq!(profile.aliases(&RuleField::Action), vec!["action"]);

        let sheet = SheetReader::from_csv_str("fw.csv", "policyid,action\n1,accept\n,\n2,deny\n").unwrap();
        let rules = parse_flat(&sheet, &profile, &[]).unwrap();
        assert_eq!(rules.iter().map(|r| r.action.as_str()).collect::<Vec<_>>(), vec!["accept", "deny"]);
    }

    #[test]
    fn test_flat_without_id_column_is_format_error() {
        let profile = profile(&[(RuleField::Id, &["policyid"])], TableLayout::default());
        let sheet = SheetReader::from_csv_str("fw.csv", "name,action\nweb,accept\n").unwrap();
        assert!(matches!(parse_flat(&sheet, &profile, &[]), Err(FireFindError::FormatError(_))));
    }

    #[test]
    fn test_sectioned_parses_bounded_section() {
        let profile = profile(
            &[(RuleField::Id, &["policyid"]), (RuleField::SrcAddrNegate, &["srcaddr-negate"])],
            TableLayout::Sectioned { marker: "ipv4 local in policy".to_string() },
        );
        let sheet = SheetReader::from_csv_str(
            "client3.csv",
            "Firewall Policy,,\npolicyid,srcaddr,action\n99,all,accept\n\n\
             IPv4 Local In Policy,,\npolicyid,srcaddr,srcaddr-negate,action\n1,all,enable,accept\n2,lan,,deny\n\
             IPv6 Policy,,\n3,all,,accept\n",
        )
        .unwrap();

        let rules = parse_sectioned(&sheet, &profile, "ipv4 local in policy").unwrap();
        assert_eq!(rules.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(rules[0].src_addr_negate.as_deref(), Some("enable"));
        assert!(rules[1].src_addr_negate.is_none());
    }

    #[test]
    fn test_sectioned_without_marker_is_format_error() {
        let profile = profile(&[(RuleField::Id, &["policyid"])], TableLayout::default());
        let sheet = SheetReader::from_csv_str("client3.csv", "policyid,action\n1,accept\n").unwrap();
        assert!(matches!(
            parse_sectioned(&sheet, &profile, "ipv4 local in policy"),
            Err(FireFindError::FormatError(_))
        ));
    }
}
