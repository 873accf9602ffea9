//! 字段值切分工具

use once_cell::sync::Lazy;
use regex::Regex;

/// 匹配用分隔符：空白/逗号/分号
static TOKEN_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,;]+").unwrap());

/// 单元格内多值分隔符：逗号/分号/换行（地址名可含空格，不按空白切分）
static CELL_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\r\n]+").unwrap());

/// 按空白/逗号/分号切分字段值，丢弃空 token
pub fn tokenize(value: &str) -> Vec<&str> {
    TOKEN_SEPARATOR
        .split(value)
        .filter(|token| !token.is_empty())
        .collect()
}

/// 切分单元格中的多个地址/服务
pub fn split_cell_values(value: &str) -> impl Iterator<Item = &str> {
    CELL_SEPARATOR
        .split(value)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 导出文件中常见的空值占位（nan / none）
pub fn is_blank_value(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") || trimmed.eq_ignore_ascii_case("none")
}
