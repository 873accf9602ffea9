//! 表格读取器
//! CSV（可选 BOM、带引号字段、行长不齐）与 XLSX 均读取为字符串行，不解释表头

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FfResult, FireFindError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

impl FileKind {
    /// 按扩展名判断
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" | "txt" => Some(FileKind::Csv),
            "xlsx" | "xlsm" | "xls" => Some(FileKind::Xlsx),
            _ => None,
        }
    }
}

/// 原始表格：文件中所有行，单元格均为字符串
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub path: PathBuf,
    pub kind: FileKind,
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    /// 小写文件名（不含目录）
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// 小写扩展名
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// 某行是否全部为空
    pub fn is_blank_row(row: &[String]) -> bool {
        row.iter().all(|cell| cell.trim().is_empty())
    }
}

/// 表格读取器
pub struct SheetReader;

impl SheetReader {
    /// 按扩展名读取文件
    pub fn read(path: &Path) -> FfResult<RawSheet> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        let kind = FileKind::from_extension(&extension).ok_or_else(|| {
            FireFindError::FormatError(format!("不支持的文件类型：{}", path.display()))
        })?;

        let rows = match kind {
            FileKind::Csv => Self::parse_csv_bytes(&std::fs::read(path)?)?,
            FileKind::Xlsx => Self::read_xlsx_rows(path)?,
        };
        debug!("读取 {} 行：{}", rows.len(), path.display());

        Ok(RawSheet {
            path: path.to_path_buf(),
            kind,
            rows,
        })
    }

    /// 从内存中的 CSV 文本构建（文件名用于厂商识别）
    pub fn from_csv_str(path: impl Into<PathBuf>, content: &str) -> FfResult<RawSheet> {
        Ok(RawSheet {
            path: path.into(),
            kind: FileKind::Csv,
            rows: Self::parse_csv_bytes(content.as_bytes())?,
        })
    }

    /// 解析 CSV 字节流，去除 BOM，允许行长不齐
    pub fn parse_csv_bytes(bytes: &[u8]) -> FfResult<Vec<Vec<String>>> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    /// 将单个单元格内容重新解析为一条 CSV 记录（位置型导出）
    pub fn parse_csv_record(cell: &str) -> FfResult<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(cell.as_bytes());

        match reader.records().next() {
            Some(record) => Ok(record?.iter().map(str::to_string).collect()),
            None => Ok(Vec::new()),
        }
    }

    #[cfg(feature = "xlsx")]
    fn read_xlsx_rows(path: &Path) -> FfResult<Vec<Vec<String>>> {
        use calamine::{open_workbook_auto, Data, Reader};

        let mut workbook = open_workbook_auto(path)
            .map_err(|e| FireFindError::XlsxError(format!("{}：{}", path.display(), e)))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| FireFindError::XlsxError(format!("{}：工作簿中没有工作表", path.display())))?
            .map_err(|e| FireFindError::XlsxError(format!("{}：{}", path.display(), e)))?;

        let rows = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Data::Empty => String::new(),
                        Data::String(s) => s.clone(),
                        // 表格中的数字 ID 以浮点存储，整数值去掉小数部分
                        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    #[cfg(not(feature = "xlsx"))]
    fn read_xlsx_rows(path: &Path) -> FfResult<Vec<Vec<String>>> {
        Err(FireFindError::XlsxError(format!(
            "{}：未启用 XLSX 支持（需开启 xlsx 特性）",
            path.display()
        )))
    }
}
