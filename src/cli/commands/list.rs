//! # List Command Module / 列表命令模块
//!
//! Prints the cells a configuration expands into without running anything.
//! 打印配置展开得到的所有单元，但不执行任何命令。

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::{
    core::{config, matrix::Cell},
    infra::t,
    resolve_locale,
};

/// Executes the list command.
///
/// With `json` the cells are printed as a JSON array instead of a table.
pub fn execute(config_path: &Path, json: bool, lang: Option<&str>) -> Result<()> {
    let matrix = config::load_build_matrix(config_path)
        .with_context(|| t!("run.config_parse_failed").to_string())?;
    let locale = resolve_locale(lang.unwrap_or(&matrix.language));
    rust_i18n::set_locale(locale);

    let cells: Vec<Cell> = matrix.expand()?.collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&cells).context("Failed to serialize cells")?
        );
        return Ok(());
    }

    println!(
        "{}",
        t!("list.header", locale = locale, count = cells.len(), path = config_path.display()).bold()
    );
    for cell in &cells {
        println!("  [{:03}] {}", cell.index, cell.label().cyan());
        for (name, value) in &cell.env {
            println!("        {}={}", name, value);
        }
        for entry in &cell.path_entries {
            println!("        {}", t!("list.path_entry", locale = locale, path = entry).dimmed());
        }
    }
    Ok(())
}
