//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it loads the configuration,
//! runs every cell of the matrix, evaluates the deployment gate and writes
//! the reports.
//!
//! 此模块实现 `run` 命令：加载配置，运行矩阵中的所有单元，
//! 评估部署闸门并写出报告。

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use std::{env, path::Path, path::PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{self, BuildMatrix},
        deploy::{maybe_deploy, DeployContext, EnvSecretResolver},
        models::BuildReport,
        runner::run_all,
    },
    infra::{fs, t},
    reporting::{
        console::{print_build_verdict, print_failure_details, print_summary},
        html::generate_html_report,
        json::write_json_report,
    },
    resolve_locale,
};

/// Environment variable consulted for the branch when `--branch` is absent.
pub const BRANCH_ENV: &str = "BUILD_MATRIX_BRANCH";

/// Arguments of the `run` command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub project_dir: PathBuf,
    pub jobs: Option<usize>,
    pub branch: Option<String>,
    pub deploy_enabled: bool,
    pub html: Option<PathBuf>,
    pub json: Option<PathBuf>,
    /// Language given on the command line; wins over the configuration.
    pub lang: Option<String>,
}

/// Executes the run command with the provided arguments.
///
/// Returns an error when any cell failed, the post-success hook failed or
/// an attempted deployment failed.
///
/// 使用提供的参数执行 run 命令。当任一单元失败、成功后钩子失败或部署失败时返回错误。
pub async fn execute(options: RunOptions) -> Result<()> {
    let (matrix, config_path) = setup_and_parse_config(&options.config)?;
    let locale = match &options.lang {
        Some(lang) => resolve_locale(lang),
        None => resolve_locale(&matrix.language),
    };
    rust_i18n::set_locale(locale);

    let project_root = fs::absolute_path(&options.project_dir).with_context(|| {
        t!("run.project_dir_not_found", locale = locale, path = options.project_dir.display()).to_string()
    })?;

    println!(
        "{}",
        t!("run.loading_config", locale = locale, path = config_path.display())
    );
    println!(
        "{}",
        t!("run.project_root", locale = locale, path = project_root.display())
    );

    let branch = resolve_branch(options.branch.clone(), &project_root).await;
    match &branch {
        Some(name) => println!("{}", t!("run.branch_detected", locale = locale, branch = name).cyan()),
        None => println!("{}", t!("run.branch_unknown", locale = locale).yellow()),
    }

    let stop_token = setup_signal_handler(locale);
    let jobs = options.jobs.unwrap_or(num_cpus::get() / 2 + 1);
    let started_at = Utc::now();

    let outcome = run_all(&matrix, &project_root, jobs, stop_token.clone()).await?;

    print_summary(&outcome.results, locale);
    print_failure_details(&outcome.results, locale);

    let deploy_ctx = DeployContext {
        project_root: &project_root,
        shell: matrix.shell(),
        timeout: matrix.command_timeout(),
        stop_token,
    };
    let deploy = maybe_deploy(
        matrix.deploy.as_ref(),
        outcome.aggregate,
        branch.as_deref(),
        options.deploy_enabled,
        &EnvSecretResolver,
        &deploy_ctx,
    )
    .await;

    let report = BuildReport {
        started_at,
        branch,
        outcome,
        deploy,
    };
    print_build_verdict(&report, locale);

    if let Some(report_path) = &options.html {
        println!(
            "\n{}",
            t!("run.html_report", locale = locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(&report, report_path, locale) {
            eprintln!("{} {:#}", t!("run.report_failed", locale = locale).red(), e);
        }
    }
    if let Some(report_path) = &options.json {
        println!(
            "{}",
            t!("run.json_report", locale = locale, path = report_path.display())
        );
        if let Err(e) = write_json_report(&report, report_path) {
            eprintln!("{} {:#}", t!("run.report_failed", locale = locale).red(), e);
        }
    }

    if !report.is_success() {
        anyhow::bail!(t!("run.build_failed_error", locale = locale).to_string());
    }
    Ok(())
}

/// Sets up and parses the build matrix configuration file.
fn setup_and_parse_config(config_path_arg: &Path) -> Result<(BuildMatrix, PathBuf)> {
    // The configuration decides the locale, so errors here use the CLI locale.
    let config_path = fs::absolute_path(config_path_arg).with_context(|| {
        t!("run.config_not_found", path = config_path_arg.display()).to_string()
    })?;

    let matrix = config::load_build_matrix(&config_path)
        .with_context(|| t!("run.config_parse_failed").to_string())?;

    Ok((matrix, config_path))
}

/// Determines the branch being built: `--branch`, then `BUILD_MATRIX_BRANCH`,
/// then the checked-out branch of the project's git repository.
///
/// 确定正在构建的分支：依次为 `--branch`、`BUILD_MATRIX_BRANCH`，
/// 以及项目 git 仓库当前检出的分支。
pub async fn resolve_branch(explicit: Option<String>, project_root: &Path) -> Option<String> {
    if let Some(branch) = explicit.filter(|b| !b.trim().is_empty()) {
        return Some(branch);
    }
    if let Some(branch) = env::var(BRANCH_ENV).ok().filter(|b| !b.trim().is_empty()) {
        return Some(branch);
    }

    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(project_root)
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            let branch = String::from_utf8_lossy(&out.stdout).trim().to_string();
            // A detached HEAD has no branch.
            (!branch.is_empty() && branch != "HEAD").then_some(branch)
        }
        Ok(out) => {
            tracing::debug!(status = %out.status, "git could not determine the branch");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "git is not available");
            None
        }
    }
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}
