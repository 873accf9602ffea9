//! firefind - 多厂商防火墙规则规范化与风险审计引擎

// 导出全局错误类型
pub use self::error::{FireFindError, FfResult};

// 导出配置模块
pub use self::config::{GlobalConfig, ConfigManager, CustomConfigBuilder};

// 导出规则模块核心接口
pub use self::rule::{
    AuditFindings, AuditReport, CanonicalRule, Finding, RuleField, RuleId, RuleLibrary,
    RuleLoader, TableLayout,
};

// 导出提取模块核心接口
pub use self::extractor::{FileKind, RawSheet, SheetReader};

// 导出规范化模块核心接口
pub use self::normalizer::{RowNormalizer, RuleAggregator};

// 导出工具模块核心接口
pub use self::utils::{extract_port, tokenize, ServicePortMap};

// 导出编译模块核心接口
pub use self::compiler::{
    CompiledRuleLibrary, MatchMode, RuleCompiler, RuleDefinition, RuleSet, VendorProfile,
};

// 导出检测模块核心接口
pub use self::detector::{
    DetectionStrategy, FirewallAuditor, RuleEvaluator, SeverityResolver, VendorDetector,
};

// 声明所有子模块
pub mod config;
pub mod error;
pub mod rule;
pub mod extractor;
pub mod normalizer;
pub mod utils;
pub mod compiler;
pub mod detector;
