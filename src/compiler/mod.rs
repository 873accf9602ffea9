//! 编译模块：将原始配置文档校验并编译为类型化规则库
pub mod pattern;
pub mod compiler;

pub use self::pattern::{
    AndCriteria, CompiledRuleLibrary, EmptyValueCheck, FieldCondition, FilenameRule, MatchMode,
    Matcher, OrCriteria, RuleDefinition, RuleSet, VendorProfile,
};
pub use self::compiler::RuleCompiler;
