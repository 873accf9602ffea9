//! firefind 命令行：审计一个或多个防火墙规则导出文件

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use firefind::{AuditReport, ConfigManager, FirewallAuditor};

/// FireFind - firewall rule risk auditor
#[derive(Parser, Debug)]
#[command(
    name = "firefind",
    version,
    about = "Normalize multi-vendor firewall rule exports and flag risky rules",
    long_about = "FireFind reads CSV/XLSX firewall rule exports, detects the vendor format, \
                  aggregates multi-row rules and evaluates every rule against a declarative \
                  risk rule set."
)]
struct Cli {
    /// Rule export file to audit (repeatable)
    #[arg(short = 'f', long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Vendor id to use instead of automatic detection
    #[arg(short = 'v', long)]
    vendor: Option<String>,

    /// Rule configuration document (defaults to the embedded configuration)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Evaluate rules on a worker pool
    #[arg(long)]
    parallel: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn print_report(report: &AuditReport) {
    println!("File: {}", report.source);
    println!("Vendor: {}", report.vendor);
    println!("Rules: {} | Findings: {}", report.total_rules(), report.total_findings());
    for (rule_id, findings) in &report.findings {
        if findings.is_empty() {
            println!("Rule: {} - No issues found", rule_id);
            continue;
        }
        println!("Rule: {}", rule_id);
        for finding in findings {
            println!("  {}", finding);
        }
    }
    let counts: Vec<String> = report
        .severity_counts()
        .iter()
        .map(|(severity, count)| format!("{}={}", severity, count))
        .collect();
    if !counts.is_empty() {
        println!("Severity: {}", counts.join(", "));
    }
    println!();
}

fn run(cli: &Cli) -> Result<bool> {
    let mut builder = ConfigManager::custom().parallel(cli.parallel).verbose(cli.verbose);
    if let Some(path) = &cli.config {
        builder = builder.rules_config_path(path);
    }
    let auditor = FirewallAuditor::new(builder.build()).context("规则配置加载失败")?;

    let mut reports = Vec::new();
    let mut all_ok = true;
    // 单个文件失败不影响其余文件
    for path in &cli.files {
        match auditor.audit_file(path, cli.vendor.as_deref()) {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("{}：{}", path.display(), e);
                all_ok = false;
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        reports.iter().for_each(print_report);
    }
    Ok(all_ok)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
