//! # Matrix Runner Module / 矩阵运行模块
//!
//! Runs every cell of a build matrix concurrently, folds the per-cell
//! results into the aggregate outcome and runs the post-success hook
//! exactly once, only when the aggregate passed.
//!
//! 并发运行构建矩阵中的所有单元，将各单元结果汇总为整体结果，
//! 并且仅在整体通过时运行一次成功后钩子。

use anyhow::Result;
use colored::*;
use futures::{stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{BuildMatrix, Isolation},
        execution::{run_cell, ExecutionContext},
        models::{BuildOutcome, CellResult, CommandFailure, HookReport, Outcome, Phase, StepRecord},
    },
    infra::{command, t},
};

/// Expands `matrix`, runs all cells with at most `jobs` in flight and
/// evaluates the aggregate.
///
/// A failing cell never stops its siblings. The returned results are sorted
/// by cell index whatever order the cells finished in.
///
/// 展开 `matrix`，以最多 `jobs` 个并发运行所有单元并计算整体结果。
/// 失败的单元不会中止其他单元。返回的结果按单元索引排序，与完成顺序无关。
pub async fn run_all(
    matrix: &BuildMatrix,
    project_root: &Path,
    jobs: usize,
    stop_token: CancellationToken,
) -> Result<BuildOutcome> {
    let start_time = Instant::now();
    let cells = matrix.expand()?;

    let jobs = match matrix.isolation {
        Isolation::InPlace if jobs > 1 => {
            tracing::warn!(requested = jobs, "in-place isolation runs cells one at a time");
            println!("{}", t!("run.in_place_sequential").yellow());
            1
        }
        _ => jobs.max(1),
    };

    println!(
        "{}",
        t!("run.matrix_expanded", count = cells.len(), jobs = jobs).bold()
    );

    let ctx = Arc::new(ExecutionContext::new(matrix, project_root.to_path_buf()));

    let mut results: Vec<CellResult> = stream::iter(cells.map(|cell| {
        let ctx = Arc::clone(&ctx);
        let stop_token = stop_token.clone();
        let fallback = cell.clone();
        async move {
            let started = Instant::now();
            match tokio::spawn(run_cell(cell, ctx, stop_token)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(cell = %fallback, error = %e, "cell task did not complete");
                    CellResult::Failed {
                        cell: fallback,
                        steps: Vec::new(),
                        failure: CommandFailure::panicked(e.to_string()),
                        duration: started.elapsed(),
                    }
                }
            }
        }
    }))
    .buffer_unordered(jobs)
    .collect()
    .await;

    results.sort_by_key(|r| r.cell().index);

    let aggregate = Outcome::from_results(&results);
    tracing::info!(?aggregate, cells = results.len(), "matrix finished");

    let post_success = match (&matrix.after_success, aggregate) {
        (None, _) => HookReport::NotConfigured,
        (Some(_), Outcome::Fail) => HookReport::Skipped,
        (Some(hook), Outcome::Pass) => {
            run_post_success(matrix, hook, project_root, &stop_token).await
        }
    };

    Ok(BuildOutcome {
        results,
        aggregate,
        post_success,
        duration: start_time.elapsed(),
    })
}

/// Runs the `after_success` command once, in the project directory.
async fn run_post_success(
    matrix: &BuildMatrix,
    hook: &str,
    project_root: &Path,
    stop_token: &CancellationToken,
) -> HookReport {
    println!("\n{}", t!("run.hook_started", command = hook).blue());

    let captured = command::run_shell(
        &matrix.shell(),
        hook,
        project_root,
        &[],
        &matrix.withheld_env(),
        matrix.command_timeout(),
        Some(stop_token),
    )
    .await;

    match CommandFailure::from_captured(Phase::AfterSuccess, 1, hook, &captured) {
        Some(failure) => {
            println!(
                "{}",
                t!("run.hook_failed", reason = failure.reason.describe()).red()
            );
            HookReport::Failed { failure }
        }
        None if captured.status.success() => {
            println!("{}", t!("run.hook_passed").green());
            HookReport::Passed {
                step: StepRecord::new(Phase::AfterSuccess, 1, hook, &captured),
            }
        }
        None => {
            println!("{}", t!("run.hook_cancelled").yellow());
            HookReport::Cancelled
        }
    }
}
