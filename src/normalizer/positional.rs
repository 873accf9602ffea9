//! 位置型导出：整行被编码为一个带引号的 CSV 字段

use tracing::{debug, warn};

use super::aggregator::{RawRow, RuleAggregator};
use crate::compiler::VendorProfile;
use crate::error::FireFindError;
use crate::extractor::{RawSheet, SheetReader};
use crate::rule::{CanonicalRule, RuleField};

/// 按列位置解析；短行以空字符串补齐，不视为错误
pub fn parse_positional(sheet: &RawSheet, profile: &VendorProfile, columns: &[String], skip_rows: usize) -> Vec<CanonicalRule> {
    // 位置列名统一为规范键名，与默认别名一致
    let headers: Vec<String> = columns.iter().map(|c| RuleField::parse(c).key().to_string()).collect();
    let mut aggregator = RuleAggregator::new(profile);

    for (idx, row) in sheet.rows.iter().enumerate().skip(skip_rows) {
        let Some(first) = row.first() else {
            continue;
        };
        if first.trim().is_empty() {
            continue;
        }

        let mut parts = if row.len() == 1 {
            match SheetReader::parse_csv_record(first) {
                Ok(parts) => parts,
                Err(e) => {
                    let err = FireFindError::RowDecodeError { row: idx + 1, reason: e.to_string() };
                    warn!("{}：{}", sheet.path.display(), err);
                    continue;
                }
            }
        } else {
            row.clone()
        };
        if parts.len() < headers.len() {
            parts.resize(headers.len(), String::new());
        }

        aggregator.push(&RawRow::from_pairs(&headers, &parts));
    }

    debug!("解析位置型规则 {} 条", aggregator.len());
    aggregator.finish()
}
