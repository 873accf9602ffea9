//! 厂商识别
//! 按显式的有序策略列表依次尝试，返回第一个命中的厂商 ID

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::compiler::CompiledRuleLibrary;
use crate::extractor::{FileKind, RawSheet};

/// 电子表格表头行的常见标记（导出文件可能在表头前附加元数据行）
const HEADER_TOKENS: [&str; 5] = ["id", "action", "source", "destination", "service"];
const SEQ_HEADER_TOKENS: [&str; 2] = ["seq #", "action"];

/// 识别策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    /// 文件名包含厂商 token（可按扩展名区分同表头的 CSV/XLSX 变体）
    Filename,
    /// 表头行与厂商 detect_headers 存在交集
    Header,
}

impl DetectionStrategy {
    pub fn describe(&self) -> &'static str {
        match self {
            DetectionStrategy::Filename => "filename",
            DetectionStrategy::Header => "header",
        }
    }
}

/// 厂商识别器
#[derive(Debug, Clone)]
pub struct VendorDetector {
    compiled_lib: Arc<CompiledRuleLibrary>,
    strategies: Vec<DetectionStrategy>,
}

impl VendorDetector {
    /// 默认策略顺序：文件名 -> 表头
    pub fn new(compiled_lib: Arc<CompiledRuleLibrary>) -> Self {
        Self::with_strategies(compiled_lib, vec![DetectionStrategy::Filename, DetectionStrategy::Header])
    }

    pub fn with_strategies(compiled_lib: Arc<CompiledRuleLibrary>, strategies: Vec<DetectionStrategy>) -> Self {
        Self { compiled_lib, strategies }
    }

    pub fn strategies(&self) -> &[DetectionStrategy] {
        &self.strategies
    }

    /// 识别厂商；所有策略均未命中时返回 None（调用方按文件级错误处理）
    pub fn detect(&self, sheet: &RawSheet) -> Option<String> {
        for strategy in &self.strategies {
            let vendor = match strategy {
                DetectionStrategy::Filename => self.detect_by_filename(sheet),
                DetectionStrategy::Header => self.detect_by_header(sheet),
            };
            if let Some(vendor) = vendor {
                debug!("通过 {1} 策略识别 {2} 的厂商为 '{0}'", vendor, strategy.describe(), sheet.path.display());
                return Some(vendor.to_string());
            }
        }
        None
    }

    fn detect_by_filename(&self, sheet: &RawSheet) -> Option<&str> {
        let file_name = sheet.file_name();
        let extension = sheet.extension();
        self.compiled_lib
            .vendors
            .iter()
            .find(|vendor| vendor.filename_rules.iter().any(|rule| rule.matches(&file_name, &extension)))
            .map(|vendor| vendor.id.as_str())
    }

    fn detect_by_header(&self, sheet: &RawSheet) -> Option<&str> {
        let headers: HashSet<String> = Self::header_row(sheet)?.into_iter().collect();
        self.compiled_lib
            .vendors
            .iter()
            .find(|vendor| vendor.detect_headers.iter().any(|header| headers.contains(header)))
            .map(|vendor| vendor.id.as_str())
    }

    /// 取首个可信的表头行（小写）
    /// CSV 取第 0 行；电子表格向下扫描首个包含标记 token 的行
    pub fn header_row(sheet: &RawSheet) -> Option<Vec<String>> {
        let lowered = |row: &Vec<String>| -> Vec<String> {
            row.iter().map(|cell| cell.trim().to_lowercase()).collect()
        };

        match sheet.kind {
            FileKind::Csv => sheet.rows.first().map(lowered),
            FileKind::Xlsx => sheet.rows.iter().map(lowered).find(|cells| Self::looks_like_header(cells)),
        }
    }

    fn looks_like_header(cells: &[String]) -> bool {
        let has = |token: &str| cells.iter().any(|cell| cell == token);
        HEADER_TOKENS.iter().filter(|token| has(token)).count() >= 2
            || SEQ_HEADER_TOKENS.iter().all(|token| has(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::compiler::RuleCompiler;
    use crate::extractor::SheetReader;
    use crate::rule::RuleLoader;

    fn detector() -> VendorDetector {
        let library = RuleLoader::from_value(json!({
            "vendor_mappings": {
                "fortinet": {
                    "detect_headers_any": ["policyid", "srcintf"],
                    "columns": {"id": ["policyid"]}
                },
                "client 1 or 3 xlsx": {
                    "detect_headers_any": ["seq #"],
                    "detect_filenames": [{"contains": "client1"}, {"contains": "client3", "extension": "xlsx"}]
                },
                "client3_csv": {
                    "detect_filenames": [{"contains": "client3", "extension": "csv"}]
                }
            }
        }))
        .unwrap();
        VendorDetector::new(Arc::new(RuleCompiler::compile(&library).unwrap()))
    }

    fn xlsx(name: &str, rows: &[&[&str]]) -> RawSheet {
        RawSheet {
            path: name.into(),
            kind: FileKind::Xlsx,
            rows: rows.iter().map(|row| row.iter().map(|c| c.to_string()).collect()).collect(),
        }
    }

    #[test]
    fn test_filename_rules_disambiguate_by_extension() {
        let detector = detector();
        let csv = SheetReader::from_csv_str("exports/Client3_rules.csv", "policyid\n").unwrap();
        assert_eq!(detector.detect(&csv).as_deref(), Some("client3_csv"));

        let sheet = xlsx("Client3_rules.xlsx", &[&["policyid"]]);
        assert_eq!(detector.detect(&sheet).as_deref(), Some("client 1 or 3 xlsx"));
    }

    #[test]
    fn test_header_detection_uses_first_csv_row() {
        let detector = detector();
        let sheet = SheetReader::from_csv_str("export.csv", "PolicyID,Name,Action\n1,a,accept\n").unwrap();
        assert_eq!(detector.detect(&sheet).as_deref(), Some("fortinet"));
    }

    #[test]
    fn test_xlsx_header_row_skips_metadata() {
        let detector = detector();
        let sheet = xlsx(
            "export.xlsx",
            &[&["Report generated", "2025"], &["Seq #", "Action", "Source"], &["1", "allow", "any"]],
        );
        assert_eq!(
            VendorDetector::header_row(&sheet),
            Some(vec!["seq #".to_string(), "action".to_string(), "source".to_string()])
        );
        assert_eq!(detector.detect(&sheet).as_deref(), Some("client 1 or 3 xlsx"));
    }

    #[test]
    fn test_no_match_returns_none() {
        let detector = detector();
        let sheet = SheetReader::from_csv_str("unknown.csv", "foo,bar\n").unwrap();
        assert_eq!(detector.detect(&sheet), None);

        let header_only = VendorDetector::with_strategies(detector.compiled_lib.clone(), vec![DetectionStrategy::Header]);
        let client1 = SheetReader::from_csv_str("client1.csv", "foo\n").unwrap();
        assert_eq!(header_only.detect(&client1), None);
        assert_eq!(detector.detect(&client1).as_deref(), Some("client 1 or 3 xlsx"));
    }
}
