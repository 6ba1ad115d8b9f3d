//! # File System Operations Module / 文件系统操作模块
//!
//! This module prepares the isolated workspace each cell runs in:
//! a temporary copy of the project plus a private scratch directory.
//!
//! 此模块为每个单元准备隔离的工作区：
//! 项目的临时副本以及一个私有的临时目录。

use anyhow::{Context, Result};
use fs_extra::dir::CopyOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::core::config::Isolation;
use crate::core::matrix::Cell;
use crate::core::models::CellWorkspace;

/// Creates the workspace `cell` runs in.
///
/// With [`Isolation::Copy`] every top-level entry of `project_root` except
/// those named in `exclude` is copied into a fresh temporary directory.
/// With [`Isolation::InPlace`] the cell works in `project_root` itself and
/// only the scratch directory is private.
///
/// 创建 `cell` 运行所在的工作区。
/// 在 [`Isolation::Copy`] 模式下，`project_root` 中除 `exclude` 列出之外的所有顶层条目
/// 都会被复制到新的临时目录；在 [`Isolation::InPlace`] 模式下，单元直接在
/// `project_root` 中工作，只有临时目录是私有的。
pub fn prepare_workspace(
    project_root: &Path,
    cell: &Cell,
    isolation: Isolation,
    exclude: &[String],
) -> Result<CellWorkspace> {
    let temp_root = create_temp_root(project_root, &cell.slug())?;

    let tmp_dir = temp_root.path().join("tmp");
    fs::create_dir_all(&tmp_dir)
        .with_context(|| format!("Failed to create scratch directory: {}", tmp_dir.display()))?;

    let dir = match isolation {
        Isolation::InPlace => project_root.to_path_buf(),
        Isolation::Copy => {
            let dir = temp_root.path().join("project");
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create workspace: {}", dir.display()))?;
            copy_project(project_root, &dir, exclude)?;
            dir
        }
    };

    tracing::debug!(cell = %cell, workspace = %dir.display(), "workspace ready");
    Ok(CellWorkspace {
        _temp_root: temp_root,
        dir,
        tmp_dir,
    })
}

/// Creates a uniquely named temporary root, falling back to the project's
/// `target` directory when the system temp directory is unusable.
fn create_temp_root(project_root: &Path, slug: &str) -> Result<TempDir> {
    let prefix = format!("build_matrix_{slug}_");
    tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir()
        .or_else(|_| {
            let target_dir = project_root.join("target");
            fs::create_dir_all(&target_dir)?;
            tempfile::Builder::new().prefix(&prefix).tempdir_in(target_dir)
        })
        .with_context(|| "Failed to create temporary build directory".to_string())
}

/// Copies the top-level entries of `from` into `to`, skipping `exclude`.
pub fn copy_project(from: &Path, to: &Path, exclude: &[String]) -> Result<()> {
    let entries = fs::read_dir(from)
        .with_context(|| format!("Failed to read project directory: {}", from.display()))?;

    let mut items: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|e| name.to_str() == Some(e.as_str())) {
            continue;
        }
        items.push(entry.path());
    }
    if items.is_empty() {
        return Ok(());
    }

    let mut options = CopyOptions::new();
    options.overwrite = true;
    fs_extra::copy_items(&items, to, &options).with_context(|| {
        format!(
            "Failed to copy project from {} to {}",
            from.display(),
            to.display()
        )
    })?;
    Ok(())
}

/// Gets the absolute path from a potentially relative path, expanding `~`.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    fs::canonicalize(&expanded).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
