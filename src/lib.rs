//! # Build Matrix Library / Build Matrix 库
//!
//! This library provides the core functionality for the `build-matrix` tool,
//! a configuration-driven CI runner that expands runtime and environment axes
//! into isolated cells, runs a fail-fast script in each cell, and gates the
//! post-success hook and deployment on the aggregate result.
//!
//! 此库为 `build-matrix` 工具提供核心功能。
//! 这是一个配置驱动的 CI 运行器：将运行时和环境变量轴展开为相互隔离的单元，
//! 在每个单元中按顺序执行脚本（首错即停），并根据整体结果决定是否执行后续钩子与部署。
//!
//! ## Modules / 模块
//!
//! - `core` - Configuration, matrix expansion, cell execution and the deployment gate
//! - `infra` - Process execution, workspaces, secrets and logging
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 配置、矩阵展开、单元执行和部署门控
//! - `infra` - 进程执行、工作区、密钥和日志
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::matrix;
pub use core::models;

use once_cell::sync::Lazy;

/// Locales bundled from `locales/`, resolved once.
static AVAILABLE_LOCALES: Lazy<Vec<&'static str>> = Lazy::new(|| rust_i18n::available_locales!());

/// Resolves a requested language to one of the bundled locales.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then a bundled
/// locale of the same language (e.g., "en" for "en-US", "zh-CN" for "zh"),
/// and finally falls back to "en".
pub fn resolve_locale(requested: &str) -> &'static str {
    if let Some(exact) = AVAILABLE_LOCALES.iter().find(|l| **l == requested) {
        return *exact;
    }
    let language = |locale: &str| locale.split(['-', '_']).next().map(str::to_ascii_lowercase);
    let wanted = language(requested);
    AVAILABLE_LOCALES
        .iter()
        .find(|l| language(**l) == wanted)
        .copied()
        .unwrap_or("en")
}

/// Detects the system language, falling back to "en".
/// 检测系统语言，失败时回退到 "en"。
pub fn system_locale() -> &'static str {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    resolve_locale(&locale)
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
