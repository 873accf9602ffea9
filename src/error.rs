//! 全局错误类型定义
//! 文件级错误（厂商识别/格式）中止当前文件；行级错误仅记录日志并跳过该行

use thiserror::Error;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;

#[derive(Error, Debug)]
pub enum FireFindError {
    // 配置相关错误
    /// 规则配置文档格式错误（加载时即拒绝）
    #[error("规则配置格式错误：{0}")]
    ConfigError(String),
    /// 指定/识别出的厂商在配置中不存在
    #[error("未找到厂商映射：{0}")]
    UnknownVendor(String),

    // 文件级错误
    /// 文件名与表头均无法识别厂商
    #[error("无法识别文件厂商：{0}")]
    VendorDetectionError(String),
    /// 缺少必需的表头/分段标记（如 id 列、策略分段）
    #[error("文件格式不符合预期：{0}")]
    FormatError(String),

    // 行级错误（可恢复）
    /// 单行解码失败（内嵌 JSON / 位置型 CSV）
    #[error("第 {row} 行解码失败：{reason}")]
    RowDecodeError { row: usize, reason: String },

    // 读取相关错误
    #[error("CSV 读取失败：{0}")]
    CsvError(#[from] csv::Error),
    #[error("XLSX 读取失败：{0}")]
    XlsxError(String),

    // 序列化/反序列化错误
    #[error("JSON 解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),

    // 基础错误
    #[error("IO 操作失败：{0}")]
    IoError(#[from] IoError),
    #[error("无效输入：{0}")]
    InvalidInput(String),
}

// 全局Result类型
pub type FfResult<T> = Result<T, FireFindError>;
