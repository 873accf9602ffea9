//! 规则模块：负责配置文档加载、规范字段与数据模型定义
pub mod field;
pub mod model;
pub mod loader;

// 导出核心接口
pub use self::field::{MatchKind, RuleField};
pub use self::model::{
    AuditFindings, AuditReport, CanonicalRule, FilenameRuleDef, Finding, MatchModeKind,
    RiskRuleDef, RuleId, RuleLibrary, TableLayout, VendorMappingDef,
};
pub use self::loader::RuleLoader;
