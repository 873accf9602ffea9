//! 审计器核心：整合厂商识别、行规范化与规则评估，输出审计报告
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::analyzer::RuleEvaluator;
use super::vendor::{DetectionStrategy, VendorDetector};
use crate::compiler::{CompiledRuleLibrary, RuleCompiler};
use crate::config::GlobalConfig;
use crate::error::{FfResult, FireFindError};
use crate::extractor::{RawSheet, SheetReader};
use crate::normalizer::RowNormalizer;
use crate::rule::{AuditReport, CanonicalRule, RuleLibrary, RuleLoader};

/// 防火墙规则审计器
/// 规则库在构造时加载并编译一次，之后只读共享给识别器与评估器
#[derive(Debug, Clone)]
pub struct FirewallAuditor {
    compiled_lib: Arc<CompiledRuleLibrary>,
    config: GlobalConfig,
    detector: VendorDetector,
    evaluator: RuleEvaluator,
}

impl FirewallAuditor {
    /// 创建审计器
    pub fn new(config: GlobalConfig) -> FfResult<Self> {
        // 1. 加载原始规则配置
        let rule_lib = RuleLoader::load(&config)?;
        // 2. 编译
        Self::with_library(&rule_lib, config)
    }

    /// 使用已加载的规则配置创建
    pub fn with_library(rule_lib: &RuleLibrary, config: GlobalConfig) -> FfResult<Self> {
        let compiled_lib = Arc::new(RuleCompiler::compile(rule_lib)?);
        Ok(Self {
            detector: VendorDetector::new(compiled_lib.clone()),
            evaluator: RuleEvaluator::new(compiled_lib.clone()),
            compiled_lib,
            config,
        })
    }

    pub fn compiled_library(&self) -> &CompiledRuleLibrary {
        &self.compiled_lib
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    /// 审计单个文件；vendor_override 指定时跳过自动识别
    pub fn audit_file(&self, path: &Path, vendor_override: Option<&str>) -> FfResult<AuditReport> {
        let sheet = SheetReader::read(path)?;
        self.audit_sheet(&sheet, vendor_override)
    }

    /// 审计已读取的表格
    pub fn audit_sheet(&self, sheet: &RawSheet, vendor_override: Option<&str>) -> FfResult<AuditReport> {
        let start = Instant::now();
        let (vendor, rules) = self.parse_sheet(sheet, vendor_override)?;
        let findings = self.evaluator.evaluate_all(&rules, self.config.parallel);

        let report = AuditReport {
            source: sheet.path.display().to_string(),
            vendor,
            rules,
            findings,
        };
        info!(
            "审计 {}：{} 条规则，{} 个发现项",
            report.source,
            report.total_rules(),
            report.total_findings()
        );
        if self.config.verbose {
            for (rule_id, list) in &report.findings {
                info!("规则 {}：{} 个发现项", rule_id, list.len());
            }
        }
        debug!("审计完成，耗时：{:?}", start.elapsed());
        Ok(report)
    }

    /// 识别厂商并解析为规范规则（不做评估）
    pub fn parse_sheet(&self, sheet: &RawSheet, vendor_override: Option<&str>) -> FfResult<(String, Vec<CanonicalRule>)> {
        let vendor_id = match vendor_override {
            Some(vendor) if vendor.trim().is_empty() => {
                return Err(FireFindError::InvalidInput("指定的厂商为空".to_string()));
            }
            Some(vendor) => vendor.trim().to_string(),
            None => self
                .detector
                .detect(sheet)
                .ok_or_else(|| {
                    let tried: Vec<&str> = self.detector.strategies().iter().map(DetectionStrategy::describe).collect();
                    warn!("{}：识别策略 {:?} 均未命中", sheet.path.display(), tried);
                    FireFindError::VendorDetectionError(sheet.path.display().to_string())
                })?,
        };
        let profile = self
            .compiled_lib
            .vendor(&vendor_id)
            .ok_or_else(|| FireFindError::UnknownVendor(vendor_id.clone()))?;
        info!("识别厂商：{}", profile.id);

        let rules = RowNormalizer::normalize(sheet, profile)?;
        Ok((profile.id.clone(), rules))
    }
}
