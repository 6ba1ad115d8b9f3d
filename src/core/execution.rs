//! # Cell Execution Engine Module / 单元执行引擎模块
//!
//! This module runs a single cell: it prepares the isolated workspace,
//! exports the cell's environment and runs the `install` and `script`
//! commands in order, stopping at the first failing command.
//!
//! 此模块负责运行单个单元：准备隔离的工作区，导出单元的环境变量，
//! 并按顺序执行 `install` 与 `script` 命令，遇到第一条失败的命令即停止。

use colored::*;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{BuildMatrix, Isolation},
        matrix::Cell,
        models::{CellResult, CellWorkspace, CommandFailure, Phase, StepRecord},
    },
    infra::{
        command::{self, CommandStatus, Shell},
        fs, t,
    },
};

/// Everything a cell needs to run, shared by all cells of a build.
/// 运行一个单元所需的全部信息，由同一次构建中的所有单元共享。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub project_root: PathBuf,
    pub shell: Shell,
    pub install: Vec<String>,
    pub script: Vec<String>,
    pub timeout: Option<Duration>,
    pub isolation: Isolation,
    pub exclude: Vec<String>,
    /// Inherited variables removed from every command, see
    /// [`BuildMatrix::withheld_env`].
    pub withheld_env: Vec<String>,
}

impl ExecutionContext {
    pub fn new(matrix: &BuildMatrix, project_root: PathBuf) -> Self {
        Self {
            project_root,
            shell: matrix.shell(),
            install: matrix.install.clone(),
            script: matrix.script.clone(),
            timeout: matrix.command_timeout(),
            isolation: matrix.isolation,
            exclude: matrix.exclude.clone(),
            withheld_env: matrix.withheld_env(),
        }
    }

    /// The commands of a cell in execution order, tagged with their phase and
    /// 1-based position.
    fn commands(&self) -> impl Iterator<Item = (Phase, usize, &str)> {
        let install = self
            .install
            .iter()
            .enumerate()
            .map(|(i, c)| (Phase::Install, i + 1, c.as_str()));
        let script = self
            .script
            .iter()
            .enumerate()
            .map(|(i, c)| (Phase::Script, i + 1, c.as_str()));
        install.chain(script)
    }
}

/// The variables added to the inherited environment of every command in `cell`.
///
/// Axis bindings come first, then `MATRIX_CELL_INDEX`, `MATRIX_CELL_NAME`,
/// `TMPDIR`, and `PATH` with the cell's runtime directories prepended.
///
/// 追加到 `cell` 中每条命令继承环境之上的变量。
pub fn cell_environment(cell: &Cell, workspace: &CellWorkspace) -> Vec<(String, String)> {
    let mut vars = cell.env.clone();
    vars.push(("MATRIX_CELL_INDEX".to_string(), cell.index.to_string()));
    vars.push(("MATRIX_CELL_NAME".to_string(), cell.label()));
    vars.push((
        "TMPDIR".to_string(),
        workspace.tmp_dir.to_string_lossy().into_owned(),
    ));

    if !cell.path_entries.is_empty() {
        let inherited = env::var_os("PATH").unwrap_or_default();
        let entries = cell
            .path_entries
            .iter()
            .map(PathBuf::from)
            .chain(env::split_paths(&inherited));
        match env::join_paths(entries) {
            Ok(path) => vars.push(("PATH".to_string(), path.to_string_lossy().into_owned())),
            Err(e) => tracing::warn!(cell = %cell, error = %e, "cannot prepend runtime directories to PATH"),
        }
    }
    vars
}

/// The main entry point for running a single cell.
///
/// Commands run strictly in order; the first command that does not exit
/// with zero ends the cell as [`CellResult::Failed`] and no later command is
/// started. Other cells are unaffected. Cancellation through `stop_token`
/// kills the running command and yields [`CellResult::Cancelled`].
///
/// 运行单个单元的主入口。命令严格按顺序执行；第一条未以零退出的命令会使单元以
/// [`CellResult::Failed`] 结束，之后的命令不会启动。其他单元不受影响。
/// 通过 `stop_token` 取消会终止正在运行的命令并返回 [`CellResult::Cancelled`]。
pub async fn run_cell(
    cell: Cell,
    ctx: Arc<ExecutionContext>,
    stop_token: CancellationToken,
) -> CellResult {
    let start_time = Instant::now();
    let label = cell.label();
    let mut steps = Vec::new();

    if stop_token.is_cancelled() {
        return CellResult::Cancelled {
            cell,
            steps,
            duration: start_time.elapsed(),
        };
    }

    println!("{}", t!("run.cell_started", name = label).blue());

    let workspace =
        match fs::prepare_workspace(&ctx.project_root, &cell, ctx.isolation, &ctx.exclude) {
            Ok(workspace) => workspace,
            Err(e) => {
                println!("{}", t!("run.workspace_failed", name = label, error = format!("{e:#}")).red());
                return CellResult::Failed {
                    failure: CommandFailure::workspace(&e),
                    cell,
                    steps,
                    duration: start_time.elapsed(),
                };
            }
        };
    let env = cell_environment(&cell, &workspace);

    let mut cancelled = false;
    for (phase, index, script) in ctx.commands() {
        if stop_token.is_cancelled() {
            cancelled = true;
            break;
        }

        tracing::info!(cell = %label, %phase, index, command = script, "running command");
        let captured = command::run_shell(
            &ctx.shell,
            script,
            &workspace.dir,
            &env,
            &ctx.withheld_env,
            ctx.timeout,
            Some(&stop_token),
        )
        .await;

        if captured.status == CommandStatus::Cancelled {
            steps.push(StepRecord::new(phase, index, script, &captured));
            cancelled = true;
            break;
        }

        if let Some(failure) = CommandFailure::from_captured(phase, index, script, &captured) {
            println!(
                "{}",
                t!(
                    "run.cell_failed",
                    name = label,
                    phase = phase,
                    index = index,
                    reason = failure.reason.describe()
                )
                .red()
            );
            steps.push(StepRecord::new(phase, index, script, &captured));
            return CellResult::Failed {
                cell,
                steps,
                failure,
                duration: start_time.elapsed(),
            };
        }
        steps.push(StepRecord::new(phase, index, script, &captured));
    }

    if cancelled {
        println!("{}", t!("run.cell_cancelled", name = label).yellow());
        return CellResult::Cancelled {
            cell,
            steps,
            duration: start_time.elapsed(),
        };
    }

    let duration = start_time.elapsed();
    println!(
        "{}",
        t!(
            "run.cell_passed",
            name = label,
            duration = format!("{:.2?}", duration)
        )
        .green()
    );
    CellResult::Passed {
        cell,
        steps,
        duration,
    }
}
