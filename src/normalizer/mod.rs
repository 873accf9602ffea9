//! 规范化模块：按厂商表格形态把原始行转换为规范规则记录
pub mod aggregator;
pub mod tabular;
pub mod encoded;
pub mod positional;

use tracing::debug;

pub use self::aggregator::{RawRow, RuleAggregator};
use crate::compiler::VendorProfile;
use crate::error::FfResult;
use crate::extractor::RawSheet;
use crate::rule::{CanonicalRule, TableLayout};

/// 行规范化器
pub struct RowNormalizer;

impl RowNormalizer {
    /// 按厂商配置的表格形态解析
    /// 缺少 ID 列或分段标记时返回 FormatError；单行解码失败仅跳过该行
    pub fn normalize(sheet: &RawSheet, profile: &VendorProfile) -> FfResult<Vec<CanonicalRule>> {
        let rules = match &profile.layout {
            TableLayout::Flat { header_marker } => tabular::parse_flat(sheet, profile, header_marker)?,
            TableLayout::Sectioned { marker } => tabular::parse_sectioned(sheet, profile, marker)?,
            TableLayout::EncodedJson { column, skip_rows } => {
                encoded::parse_encoded_json(sheet, profile, *column, *skip_rows)
            }
            TableLayout::Positional { columns, skip_rows } => {
                positional::parse_positional(sheet, profile, columns, *skip_rows)
            }
        };
        debug!(
            "规范化完成：{} 条规则，来源 {}，厂商 {}",
            rules.len(),
            sheet.path.display(),
            profile.id
        );
        Ok(rules)
    }
}
