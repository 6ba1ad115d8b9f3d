//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints the per-cell summary table, the details of failing
//! cells and the final verdict of a build.
//!
//! 此模块打印每个单元的摘要表、失败单元的详细信息以及构建的最终结论。

use colored::*;

use crate::core::deploy::DeployReport;
use crate::core::models::{BuildReport, CellResult, HookReport};
use crate::infra::t;

/// Prints a formatted summary of cell results to the console.
///
/// 在控制台打印格式化的单元结果摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Build Matrix Summary ---
///   - Passed           | python=3.6, env=DJANGO_VERSION=1.11.*   |     12.31s
///   - Failed           | python=3.7, env=DJANGO_VERSION=2.0.*    |      4.05s  script #3
/// ```
pub fn print_summary(results: &[CellResult], locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for result in results {
        let status_str = result.status_str(locale);
        let status_colored = match result {
            CellResult::Passed { .. } => status_str.green(),
            CellResult::Failed { .. } => status_str.red(),
            CellResult::Cancelled { .. } => status_str.dimmed(),
        };
        let failed_at = result
            .failure()
            .map(|f| format!(" {} #{}", f.phase, f.index))
            .unwrap_or_default();

        println!(
            "  - {:<18} | {:<40} | {:>10} {}",
            status_colored,
            result.cell().label(),
            format!("{:.2?}", result.duration()),
            failed_at
        );
    }
}

/// Prints the failing command and its output for every failed cell.
///
/// 打印每个失败单元中失败的命令及其输出。
pub fn print_failure_details(results: &[CellResult], locale: &str) {
    let failures: Vec<_> = results.iter().filter_map(|r| Some((r, r.failure()?))).collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, (result, failure)) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            i + 1,
            failures.len(),
            t!("report.failure_header", locale = locale).red(),
            result.cell().label().cyan()
        );
        println!(
            "{}",
            t!(
                "report.failed_command",
                locale = locale,
                phase = failure.phase,
                index = failure.index,
                command = failure.command,
                reason = failure.reason.describe()
            )
        );
        if let Some(code) = failure.exit_code {
            println!("{}", t!("report.exit_code", locale = locale, code = code));
        }
        println!("\n--- {} ---\n", t!("report.output_log", locale = locale).yellow());
        if failure.output.trim().is_empty() {
            println!("{}", t!("report.no_output", locale = locale).dimmed());
        } else {
            println!("{}", failure.output.trim_end());
        }
        println!("\n{}", "-".repeat(80));
    }
}

/// Prints the aggregate outcome, the post-success hook and the deployment.
///
/// 打印整体结果、成功后钩子以及部署情况。
pub fn print_build_verdict(report: &BuildReport, locale: &str) {
    let outcome = &report.outcome;
    println!(
        "\n{}",
        t!(
            "report.counts",
            locale = locale,
            total = outcome.results.len(),
            passed = outcome.passed_count(),
            failed = outcome.failed_count(),
            cancelled = outcome.cancelled_count(),
            duration = format!("{:.2?}", outcome.duration)
        )
    );

    let hook = match &outcome.post_success {
        HookReport::NotConfigured => t!("report.hook_not_configured", locale = locale).dimmed(),
        HookReport::Skipped => t!("report.hook_skipped", locale = locale).yellow(),
        HookReport::Cancelled => t!("report.hook_cancelled", locale = locale).red(),
        HookReport::Passed { .. } => t!("report.hook_passed", locale = locale).green(),
        HookReport::Failed { failure } => t!(
            "report.hook_failed",
            locale = locale,
            reason = failure.reason.describe()
        )
        .red(),
    };
    println!("{}", hook);

    let deploy = match &report.deploy {
        DeployReport::NotConfigured => t!("report.deploy_not_configured", locale = locale).dimmed(),
        DeployReport::Skipped { decision } => t!(
            "report.deploy_skipped",
            locale = locale,
            reason = decision.describe()
        )
        .yellow(),
        DeployReport::Deployed { provider, .. } => t!(
            "report.deploy_done",
            locale = locale,
            provider = provider
        )
        .green(),
        DeployReport::Failed { provider, message, .. } => t!(
            "report.deploy_failed",
            locale = locale,
            provider = provider,
            reason = message
        )
        .red(),
    };
    println!("{}", deploy);

    if report.is_success() {
        println!("\n{}", t!("report.build_passed", locale = locale).green().bold());
    } else {
        println!("\n{}", t!("report.build_failed", locale = locale).red().bold());
    }
}
