//! 提取模块：将导出文件读取为原始行列数据
pub mod sheet;

pub use self::sheet::{FileKind, RawSheet, SheetReader};
