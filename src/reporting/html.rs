//! # HTML Reporting Module / HTML 报告模块
//!
//! This module renders a build report as a standalone HTML page with
//! summary counts, a per-cell results table with collapsible failure output,
//! and the post-success hook and deployment outcome.
//!
//! 此模块将构建报告渲染为独立的 HTML 页面，包含统计摘要、可折叠失败输出的
//! 单元结果表，以及成功后钩子与部署的结果。

use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::fs;
use std::path::Path;

use crate::core::deploy::DeployReport;
use crate::core::models::{BuildReport, HookReport};
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = include_str!("assets/report.js");

/// Renders `report` as an HTML document.
///
/// 将 `report` 渲染为 HTML 文档。
pub fn render_html_report(report: &BuildReport, locale: &str) -> Markup {
    let outcome = &report.outcome;
    let verdict_class = if report.is_success() { "passed-text" } else { "failed-text" };
    let verdict = if report.is_success() {
        t!("report.build_passed", locale = locale)
    } else {
        t!("report.build_failed", locale = locale)
    };

    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale)) }
                p class="meta" {
                    (t!("html_report.started_at", locale = locale,
                        time = report.started_at.format("%Y-%m-%d %H:%M:%S UTC")))
                    @if let Some(branch) = &report.branch {
                        " · " (t!("html_report.branch", locale = locale, branch = branch))
                    }
                }
                h2 class=(verdict_class) { (verdict) }

                div class="summary-container" {
                    (summary_item(outcome.results.len(), "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(outcome.passed_count(), "passed-text", &t!("html_report.summary.passed", locale = locale)))
                    (summary_item(outcome.failed_count(), "failed-text", &t!("html_report.summary.failed", locale = locale)))
                    (summary_item(outcome.cancelled_count(), "cancelled-text", &t!("html_report.summary.cancelled", locale = locale)))
                }

                table {
                    thead {
                        tr {
                            th { "#" }
                            th { (t!("html_report.table.header.cell", locale = locale)) }
                            th class="status-col" { (t!("html_report.table.header.status", locale = locale)) }
                            th class="duration-cell" { (t!("html_report.table.header.duration", locale = locale)) }
                        }
                    }
                    tbody {
                        @for result in &outcome.results {
                            @let output_id = format!("output-{}", result.cell().index);
                            tr {
                                td { (result.cell().index) }
                                td { (result.cell().label()) }
                                td class="status-col" {
                                    div class={ "status-cell " (result.status_class()) } {
                                        (result.status_str(locale))
                                    }
                                    @if result.is_failure() {
                                        div class="output-toggle" onclick={ "toggleOutput('" (output_id) "')" } {
                                            (t!("html_report.toggle_output", locale = locale))
                                        }
                                    }
                                }
                                td class="duration-cell" { (format!("{:.2}s", result.duration().as_secs_f64())) }
                            }
                            @if let Some(failure) = result.failure() {
                                tr id=(output_id) style="display:none;" {
                                    td colspan="4" {
                                        p class="failed-command" {
                                            (failure.phase.as_str()) " #" (failure.index) ": "
                                            code { (failure.command) }
                                            " (" (failure.reason.describe()) ")"
                                        }
                                        pre class="output-content" { (failure.output) }
                                    }
                                }
                            }
                        }
                    }
                }

                h2 { (t!("html_report.post_success", locale = locale)) }
                p { (hook_text(&outcome.post_success, locale)) }

                h2 { (t!("html_report.deploy", locale = locale)) }
                p { (deploy_text(&report.deploy, locale)) }

                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div class="summary-item" {
            span class={ "count " (class) } { (count) }
            span class="label" { (label) }
        }
    }
}

fn hook_text(hook: &HookReport, locale: &str) -> String {
    match hook {
        HookReport::NotConfigured => t!("report.hook_not_configured", locale = locale),
        HookReport::Skipped => t!("report.hook_skipped", locale = locale),
        HookReport::Cancelled => t!("report.hook_cancelled", locale = locale),
        HookReport::Passed { .. } => t!("report.hook_passed", locale = locale),
        HookReport::Failed { failure } => t!(
            "report.hook_failed",
            locale = locale,
            reason = failure.reason.describe()
        ),
    }
    .to_string()
}

fn deploy_text(deploy: &DeployReport, locale: &str) -> String {
    match deploy {
        DeployReport::NotConfigured => t!("report.deploy_not_configured", locale = locale),
        DeployReport::Skipped { decision } => t!(
            "report.deploy_skipped",
            locale = locale,
            reason = decision.describe()
        ),
        DeployReport::Deployed { provider, .. } => {
            t!("report.deploy_done", locale = locale, provider = provider)
        }
        DeployReport::Failed { provider, message, .. } => t!(
            "report.deploy_failed",
            locale = locale,
            provider = provider,
            reason = message
        ),
    }
    .to_string()
}

/// Generates an HTML report for `report` at `output_path`.
///
/// 在 `output_path` 生成 `report` 的 HTML 报告。
pub fn generate_html_report(report: &BuildReport, output_path: &Path, locale: &str) -> Result<()> {
    let html = render_html_report(report, locale).into_string();
    fs::write(output_path, html)
        .with_context(|| format!("Failed to write HTML report: {}", output_path.display()))?;
    Ok(())
}
