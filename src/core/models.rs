//! # Data Models Module / 数据模型模块
//!
//! This module defines the result types shared by the runner and the
//! reports: per-command step records, per-cell results, the aggregate
//! outcome, the post-success hook report and the final build report.
//!
//! 此模块定义运行器与报告共享的结果类型：每条命令的步骤记录、每个单元的结果、
//! 整体结果、成功后钩子的报告以及最终的构建报告。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

use crate::core::deploy::DeployReport;
use crate::core::matrix::Cell;
use crate::infra::command::{CapturedCommand, CommandStatus};
use crate::infra::t;

/// The stage of a build a command belongs to.
/// 命令所属的构建阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Preparing the cell's isolated workspace.
    Setup,
    Install,
    Script,
    AfterSuccess,
    Deploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Install => "install",
            Phase::Script => "script",
            Phase::AfterSuccess => "after_success",
            Phase::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pass/fail of a cell set or of the whole build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    /// Pass iff every cell passed.
    pub fn from_results(results: &[CellResult]) -> Self {
        if results.iter().all(CellResult::is_pass) {
            Outcome::Pass
        } else {
            Outcome::Fail
        }
    }
}

/// Enumerates why a command failed.
/// 枚举命令失败的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The command exited with a non-zero code.
    NonZeroExit,
    /// The command was terminated by a signal.
    Signalled,
    /// The command exceeded `command_timeout_secs`.
    Timeout,
    /// The command could not be started.
    SpawnFailed,
    /// The isolated workspace could not be prepared.
    Workspace,
    /// The task running the cell panicked.
    Panicked,
    /// A required credential was unavailable.
    Credential,
}

impl FailureReason {
    pub fn describe(&self) -> String {
        match self {
            FailureReason::NonZeroExit => t!("report.reason_exit").to_string(),
            FailureReason::Signalled => t!("report.reason_signal").to_string(),
            FailureReason::Timeout => t!("report.reason_timeout").to_string(),
            FailureReason::SpawnFailed => t!("report.reason_spawn").to_string(),
            FailureReason::Workspace => t!("report.reason_workspace").to_string(),
            FailureReason::Panicked => t!("report.reason_panic").to_string(),
            FailureReason::Credential => t!("report.reason_credential").to_string(),
        }
    }
}

/// The record of one executed command.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub phase: Phase,
    /// 1-based position within the phase.
    pub index: usize,
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub output: String,
}

impl StepRecord {
    pub fn new(phase: Phase, index: usize, command: &str, captured: &CapturedCommand) -> Self {
        Self {
            phase,
            index,
            command: command.to_string(),
            exit_code: captured.status.exit_code(),
            duration: captured.duration,
            output: captured.output.clone(),
        }
    }
}

/// The single command a failure is attributed to.
/// 失败所归属的那一条命令。
#[derive(Debug, Clone, Serialize)]
pub struct CommandFailure {
    pub phase: Phase,
    pub index: usize,
    pub command: String,
    pub reason: FailureReason,
    pub exit_code: Option<i32>,
    pub output: String,
}

impl CommandFailure {
    /// Builds a failure from a command that did not succeed. Returns `None`
    /// for successful and cancelled commands.
    pub fn from_captured(
        phase: Phase,
        index: usize,
        command: &str,
        captured: &CapturedCommand,
    ) -> Option<Self> {
        let (reason, output) = match &captured.status {
            CommandStatus::Exited(0) | CommandStatus::Cancelled => return None,
            CommandStatus::Exited(_) => (FailureReason::NonZeroExit, captured.output.clone()),
            CommandStatus::Signalled => (FailureReason::Signalled, captured.output.clone()),
            CommandStatus::TimedOut => (FailureReason::Timeout, captured.output.clone()),
            CommandStatus::SpawnFailed(err) => (FailureReason::SpawnFailed, err.clone()),
        };
        Some(Self {
            phase,
            index,
            command: command.to_string(),
            reason,
            exit_code: captured.status.exit_code(),
            output,
        })
    }

    pub fn workspace(error: &anyhow::Error) -> Self {
        Self {
            phase: Phase::Setup,
            index: 0,
            command: t!("run.workspace_step").to_string(),
            reason: FailureReason::Workspace,
            exit_code: None,
            output: format!("{error:#}"),
        }
    }

    pub fn panicked(message: String) -> Self {
        Self {
            phase: Phase::Setup,
            index: 0,
            command: t!("run.task_step").to_string(),
            reason: FailureReason::Panicked,
            exit_code: None,
            output: message,
        }
    }
}

/// Represents the final result of a single cell.
///
/// 表示单个单元的最终结果。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CellResult {
    /// Every command exited with zero.
    /// 所有命令均以零退出。
    Passed {
        cell: Cell,
        steps: Vec<StepRecord>,
        duration: Duration,
    },
    /// A command failed; the commands after it were not run.
    /// 某条命令失败，其后的命令未执行。
    Failed {
        cell: Cell,
        steps: Vec<StepRecord>,
        failure: CommandFailure,
        duration: Duration,
    },
    /// The build was cancelled before this cell finished.
    /// 构建在此单元完成之前被取消。
    Cancelled {
        cell: Cell,
        steps: Vec<StepRecord>,
        duration: Duration,
    },
}

impl CellResult {
    pub fn cell(&self) -> &Cell {
        match self {
            CellResult::Passed { cell, .. }
            | CellResult::Failed { cell, .. }
            | CellResult::Cancelled { cell, .. } => cell,
        }
    }

    pub fn steps(&self) -> &[StepRecord] {
        match self {
            CellResult::Passed { steps, .. }
            | CellResult::Failed { steps, .. }
            | CellResult::Cancelled { steps, .. } => steps,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            CellResult::Passed { duration, .. }
            | CellResult::Failed { duration, .. }
            | CellResult::Cancelled { duration, .. } => *duration,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CellResult::Passed { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CellResult::Failed { .. })
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        match self {
            CellResult::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// Gets the status of the result as a string for display.
    /// 以字符串形式获取结果状态以供显示。
    pub fn status_str(&self, locale: &str) -> String {
        match self {
            CellResult::Passed { .. } => t!("report.status_passed", locale = locale).to_string(),
            CellResult::Failed { failure, .. } if failure.reason == FailureReason::Timeout => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            CellResult::Failed { .. } => t!("report.status_failed", locale = locale).to_string(),
            CellResult::Cancelled { .. } => {
                t!("report.status_cancelled", locale = locale).to_string()
            }
        }
    }

    /// Gets the CSS class for the status in HTML reports.
    pub fn status_class(&self) -> &'static str {
        match self {
            CellResult::Passed { .. } => "status-passed",
            CellResult::Failed { failure, .. } if failure.reason == FailureReason::Timeout => {
                "status-timeout"
            }
            CellResult::Failed { .. } => "status-failed",
            CellResult::Cancelled { .. } => "status-cancelled",
        }
    }
}

/// Outcome of the post-success hook.
/// 成功后钩子的执行结果。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookReport {
    /// No `after_success` command is configured.
    NotConfigured,
    /// The build failed, so the hook did not run.
    Skipped,
    Passed { step: StepRecord },
    Failed { failure: CommandFailure },
    /// The build was cancelled while the hook was running.
    Cancelled,
}

impl HookReport {
    /// An interrupted hook counts as a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, HookReport::Failed { .. } | HookReport::Cancelled)
    }

    pub fn has_run(&self) -> bool {
        matches!(
            self,
            HookReport::Passed { .. } | HookReport::Failed { .. } | HookReport::Cancelled
        )
    }
}

/// Everything `run_all` produces.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    /// Per-cell results, sorted by cell index.
    pub results: Vec<CellResult>,
    pub aggregate: Outcome,
    pub post_success: HookReport,
    pub duration: Duration,
}

impl BuildOutcome {
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_pass()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, CellResult::Cancelled { .. }))
            .count()
    }
}

/// The complete record of one build, from expansion to deployment.
///
/// 一次构建从展开到部署的完整记录。
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub started_at: DateTime<Utc>,
    pub branch: Option<String>,
    pub outcome: BuildOutcome,
    pub deploy: DeployReport,
}

impl BuildReport {
    /// True iff every cell passed, the hook did not fail and deployment did
    /// not fail.
    pub fn is_success(&self) -> bool {
        self.outcome.aggregate.is_pass()
            && !self.outcome.post_success.is_failure()
            && !self.deploy.is_failure()
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// The isolated directory a cell runs in.
///
/// The temporary root is deleted when this struct is dropped.
/// 单元运行所在的隔离目录。当此结构体被丢弃时，临时根目录会被自动删除。
pub struct CellWorkspace {
    /// The `TempDir` guard. When this goes out of scope, the directory on disk is deleted.
    /// `TempDir` 的 guard。当它超出作用域时，磁盘上的目录将被删除。
    pub _temp_root: TempDir,
    /// Working directory of every command in the cell.
    pub dir: PathBuf,
    /// Private scratch directory exported as `TMPDIR`.
    pub tmp_dir: PathBuf,
}

impl fmt::Debug for CellWorkspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellWorkspace")
            .field("dir", &self.dir)
            .field("tmp_dir", &self.tmp_dir)
            .finish_non_exhaustive()
    }
}
