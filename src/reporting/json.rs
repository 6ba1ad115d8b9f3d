//! Machine-readable build reports.
//!
//! 机器可读的构建报告。

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::models::BuildReport;

/// Serializes `report` as pretty-printed JSON.
pub fn render_json_report(report: &BuildReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize build report")
}

/// Writes `report` as JSON to `output_path`.
///
/// 将 `report` 以 JSON 格式写入 `output_path`。
pub fn write_json_report(report: &BuildReport, output_path: &Path) -> Result<()> {
    let json = render_json_report(report)?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report: {}", output_path.display()))?;
    Ok(())
}
