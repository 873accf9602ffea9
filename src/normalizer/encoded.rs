//! 单元格内嵌 JSON 的导出（每行一个规则对象）

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::aggregator::{RawRow, RuleAggregator};
use crate::compiler::VendorProfile;
use crate::error::FireFindError;
use crate::extractor::RawSheet;
use crate::rule::{CanonicalRule, RuleField};

/// 逐行解码 JSON 对象；解码失败的行记录告警并跳过
/// 对象缺少 ID 时使用成功解码行的序号（从 1 开始），序号已被显式 ID 或先前分配占用时顺延
pub fn parse_encoded_json(sheet: &RawSheet, profile: &VendorProfile, column: usize, skip_rows: usize) -> Vec<CanonicalRule> {
    let mut decoded: Vec<RawRow> = Vec::new();

    for (idx, row) in sheet.rows.iter().enumerate().skip(skip_rows) {
        let cell = row.get(column).map(|c| c.trim()).unwrap_or("");
        if !cell.starts_with('{') {
            continue;
        }

        match decode_cell(cell) {
            Ok(object) => decoded.push(object_to_row(&object)),
            Err(reason) => {
                let err = FireFindError::RowDecodeError { row: idx + 1, reason };
                warn!("{}：{}", sheet.path.display(), err);
            }
        }
    }

    let mut aggregator = RuleAggregator::new(profile);
    // 先收集全部显式 ID，序号 ID 不得与之重合
    let mut used: HashSet<String> = decoded
        .iter()
        .map(|raw| aggregator.resolve(raw, &RuleField::Id))
        .filter(|id| !id.is_empty())
        .collect();

    for (ordinal, raw) in decoded.iter().enumerate() {
        if aggregator.push(raw) {
            continue;
        }
        let mut counter = ordinal + 1;
        while used.contains(&counter.to_string()) {
            counter += 1;
        }
        used.insert(counter.to_string());
        aggregator.push_with_id(counter.to_string(), raw);
    }

    debug!("解码 {} 个 JSON 规则对象，聚合为 {} 条规则", decoded.len(), aggregator.len());
    aggregator.finish()
}

/// 截断最后一个右花括号之后的内容再解码
fn decode_cell(cell: &str) -> Result<Map<String, Value>, String> {
    let end = cell.rfind('}').map(|pos| pos + 1).unwrap_or(cell.len());
    match serde_json::from_str::<Value>(&cell[..end]) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err("单元格内容不是 JSON 对象".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// JSON 对象展开为原始行：数组以 ", " 连接，null 视为空
fn object_to_row(object: &Map<String, Value>) -> RawRow {
    let mut row = RawRow::default();
    for (key, value) in object {
        row.insert(key, &render_value(value));
    }
    row
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
