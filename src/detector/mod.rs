//! 检测模块：厂商识别、规则评估与严重级别解析
pub mod vendor;
pub mod analyzer;
pub mod severity;
pub mod detector;

// 导出核心接口
pub use self::vendor::{DetectionStrategy, VendorDetector};
pub use self::analyzer::{AndAnalyzer, FieldAnalyzer, FieldListAnalyzer, RuleEvaluator, UNSPECIFIED_FIELD};
pub use self::severity::{SeverityResolver, UNCATEGORIZED, UNKNOWN_SEVERITY};
pub use self::detector::FirewallAuditor;
