//! # Runner Integration Tests / 运行器集成测试
//!
//! End-to-end tests of `run_cell` and `run_all` with real shell commands:
//! fail-fast within a cell, independence across cells, aggregation, the
//! post-success hook and workspace isolation.
//!
//! 使用真实 shell 命令对 `run_cell` 与 `run_all` 进行端到端测试：
//! 单元内首错即停、单元间相互独立、结果汇总、成功后钩子以及工作区隔离。
#![cfg(unix)]

use build_matrix::core::execution::{run_cell, ExecutionContext};
use build_matrix::core::runner::run_all;
use build_matrix::models::{CellResult, FailureReason, HookReport, Outcome, Phase};
use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod common;

use common::{file_names, marker_dir, setup_test_project, sh_quote};

#[cfg(test)]
mod run_cell_tests {
    use super::*;

    #[tokio::test]
    async fn test_script_stops_at_first_failure() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(
            r#"script = ["touch {m}/one", "exit 7", "touch {m}/three"]"#
        ));
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().next().unwrap();

        let result = run_cell(cell, ctx, CancellationToken::new()).await;

        assert!(result.is_failure());
        let failure = result.failure().unwrap();
        assert_eq!(failure.phase, Phase::Script);
        assert_eq!(failure.index, 2);
        assert_eq!(failure.command, "exit 7");
        assert_eq!(failure.exit_code, Some(7));
        assert_eq!(failure.reason, FailureReason::NonZeroExit);
        assert_eq!(result.steps().len(), 2);
        assert_eq!(file_names(markers.path()), vec!["one"]);
    }

    #[tokio::test]
    async fn test_install_failure_skips_script() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(
            r#"
install = ["false"]
script = ["touch {m}/script"]
"#
        ));
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().next().unwrap();

        let result = run_cell(cell, ctx, CancellationToken::new()).await;

        let failure = result.failure().unwrap();
        assert_eq!(failure.phase, Phase::Install);
        assert_eq!(failure.index, 1);
        assert!(file_names(markers.path()).is_empty());
    }

    #[tokio::test]
    async fn test_passing_cell_records_every_step() {
        let project = setup_test_project();
        let matrix = common::matrix(
            r#"
install = ["echo installing"]
script = ["echo one", "echo two"]
"#,
        );
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().next().unwrap();

        let result = run_cell(cell, ctx, CancellationToken::new()).await;

        assert!(result.is_pass());
        let steps = result.steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].phase, Phase::Install);
        assert_eq!(steps[2].command, "echo two");
        assert!(steps[2].output.contains("two"));
        assert!(steps.iter().all(|s| s.exit_code == Some(0)));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let project = setup_test_project();
        let matrix = common::matrix(
            r#"
command_timeout_secs = 1
script = ["sleep 10"]
"#,
        );
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().next().unwrap();

        let result = run_cell(cell, ctx, CancellationToken::new()).await;

        assert_eq!(result.failure().unwrap().reason, FailureReason::Timeout);
        assert_eq!(result.status_class(), "status-timeout");
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(r#"script = ["touch {m}/ran"]"#));
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().next().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = run_cell(cell, ctx, token).await;

        assert!(matches!(result, CellResult::Cancelled { .. }));
        assert!(file_names(markers.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cell_environment_is_exported() {
        let project = setup_test_project();
        let matrix = common::matrix(&format!(
            r#"
script = [
    'test "$MATRIX_PYTHON" = 3.7',
    'test "$SET" = C',
    'test "$MATRIX_CELL_INDEX" = 6',
    'test "$MATRIX_CELL_NAME" = "python=3.7, env=SET=C"',
    'test -d "$TMPDIR"',
]
{}"#,
            common::TWELVE_CELL_AXES
        ));
        let ctx = Arc::new(ExecutionContext::new(&matrix, project.path().to_path_buf()));
        let cell = matrix.expand().unwrap().nth(6).unwrap();

        let result = run_cell(cell, ctx, CancellationToken::new()).await;

        assert!(result.is_pass(), "{:?}", result.failure());
    }

    #[tokio::test]
    async fn test_runtime_bin_path_is_prepended() {
        let project = setup_test_project();
        let runtimes = tempfile::tempdir().unwrap();
        for version in ["1.0", "2.0"] {
            let bin = runtimes.path().join(version).join("bin");
            fs::create_dir_all(&bin).unwrap();
            let tool = bin.join("fake-runtime");
            fs::write(&tool, format!("#!/bin/sh\necho {version}\n")).unwrap();
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let matrix = common::matrix(&format!(
            r#"
script = ['test "$(fake-runtime)" = "$MATRIX_TOOL"']
[[axes]]
name = "tool"
kind = "runtime"
bin_path = "{}/{{value}}/bin"
values = ["1.0", "2.0"]
"#,
            runtimes.path().display()
        ));

        let outcome = run_all(&matrix, project.path(), 2, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.passed_count(), 2, "{:?}", outcome.results);
    }
}

#[cfg(test)]
mod run_all_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_cell_does_not_stop_siblings() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(
            r#"
script = [
    "true",
    "true",
    'if [ "$MATRIX_PYTHON" = 3.7 ] && [ "$SET" = C ]; then exit 1; fi',
    "touch {m}/cell_$MATRIX_CELL_INDEX",
]
after_success = "touch {m}/hook"
{}"#,
            common::TWELVE_CELL_AXES
        ));

        let outcome = run_all(&matrix, project.path(), 4, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 12);
        assert_eq!(outcome.passed_count(), 11);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.aggregate, Outcome::Fail);
        assert!(matches!(outcome.post_success, HookReport::Skipped));

        let failed = outcome.results.iter().find(|r| r.is_failure()).unwrap();
        assert_eq!(failed.cell().index, 6);
        assert_eq!(failed.cell().values(), vec!["3.7", "SET=C"]);
        let failure = failed.failure().unwrap();
        assert_eq!(failure.phase, Phase::Script);
        assert_eq!(failure.index, 3);

        let names = file_names(markers.path());
        assert_eq!(names.len(), 11);
        assert!(!names.contains(&"cell_6".to_string()));
        assert!(!names.contains(&"hook".to_string()));
    }

    #[tokio::test]
    async fn test_results_sorted_by_cell_index() {
        let project = setup_test_project();
        // Earlier cells sleep longer so they finish last.
        let matrix = common::matrix(&format!(
            r#"
script = ['sleep "0.$(( 3 - MATRIX_CELL_INDEX % 4 ))"']
{}"#,
            common::TWELVE_CELL_AXES
        ));

        let outcome = run_all(&matrix, project.path(), 12, CancellationToken::new())
            .await
            .unwrap();

        let indices: Vec<usize> = outcome.results.iter().map(|r| r.cell().index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert_eq!(outcome.aggregate, Outcome::Pass);
    }

    #[tokio::test]
    async fn test_post_success_runs_once_when_all_pass() {
        let project = setup_test_project();
        let markers = marker_dir();
        let hook_log = markers.path().join("hook.log");
        let matrix = common::matrix(&format!(
            r#"
script = ["true"]
after_success = "echo ran >> {}"
{}"#,
            sh_quote(&hook_log),
            common::TWELVE_CELL_AXES
        ));

        let outcome = run_all(&matrix, project.path(), 4, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass);
        assert!(matches!(outcome.post_success, HookReport::Passed { .. }));
        assert_eq!(fs::read_to_string(&hook_log).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_post_success_failure_is_reported() {
        let project = setup_test_project();
        let matrix = common::matrix(
            r#"
script = ["true"]
after_success = "exit 2"
"#,
        );

        let outcome = run_all(&matrix, project.path(), 1, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass);
        match &outcome.post_success {
            HookReport::Failed { failure } => {
                assert_eq!(failure.phase, Phase::AfterSuccess);
                assert_eq!(failure.exit_code, Some(2));
            }
            other => panic!("unexpected hook report: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_hook_configured() {
        let project = setup_test_project();
        let matrix = common::matrix(r#"script = ["true"]"#);

        let outcome = run_all(&matrix, project.path(), 1, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert!(matches!(outcome.post_success, HookReport::NotConfigured));
    }

    #[tokio::test]
    async fn test_cancelled_build_fails_and_skips_hook() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(
            r#"
script = ["true"]
after_success = "touch {m}/hook"
{}"#,
            common::TWELVE_CELL_AXES
        ));
        let token = CancellationToken::new();
        token.cancel();

        let outcome = run_all(&matrix, project.path(), 4, token).await.unwrap();

        assert_eq!(outcome.cancelled_count(), 12);
        assert_eq!(outcome.aggregate, Outcome::Fail);
        assert!(matches!(outcome.post_success, HookReport::Skipped));
        assert!(file_names(markers.path()).is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_hook_is_a_failure() {
        let project = setup_test_project();
        let markers = marker_dir();
        let started = markers.path().join("hook_started");
        let matrix = common::matrix(&format!(
            r#"
script = ["true"]
after_success = "touch {} && sleep 5"
"#,
            sh_quote(&started)
        ));
        let token = CancellationToken::new();
        let canceller = token.clone();
        let watcher = tokio::spawn(async move {
            while !started.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            canceller.cancel();
        });

        let outcome = run_all(&matrix, project.path(), 1, token).await.unwrap();
        watcher.await.unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass);
        assert!(matches!(outcome.post_success, HookReport::Cancelled));
        assert!(outcome.post_success.is_failure());
    }
}

#[cfg(test)]
mod credential_tests {
    use super::*;

    /// `HOME` is always set in the test environment, so it stands in for a
    /// decrypted credential variable.
    const CREDENTIAL_CONFIG: &str = r#"
script = ['test -z "$HOME"', "echo home=$HOME"]
after_success = 'test -z "$HOME"'
[deploy]
provider = "script"
command = "true"
password = { secure = "ciphertext", env = "HOME" }
"#;

    #[test]
    fn test_credential_variable_is_withheld() {
        let matrix = common::matrix(CREDENTIAL_CONFIG);
        assert_eq!(matrix.withheld_env(), vec!["HOME"]);
        assert!(common::matrix(r#"script = ["true"]"#).withheld_env().is_empty());
    }

    #[tokio::test]
    async fn test_cells_and_hook_cannot_read_credential() {
        let project = setup_test_project();
        let matrix = common::matrix(CREDENTIAL_CONFIG);

        let outcome = run_all(&matrix, project.path(), 1, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass, "{:?}", outcome.results);
        assert!(matches!(outcome.post_success, HookReport::Passed { .. }));
        let output = &outcome.results[0].steps()[1].output;
        assert_eq!(output.trim(), "home=");
    }
}

#[cfg(test)]
mod isolation_tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_isolation_keeps_project_clean() {
        let project = setup_test_project();
        let matrix = common::matrix(&format!(
            r#"
script = [
    "test -f README.md",
    "test -f src/app.py",
    "test ! -e .tox",
    "test ! -e generated.txt",
    "echo $MATRIX_CELL_INDEX > generated.txt",
]
{}"#,
            common::TWELVE_CELL_AXES
        ));

        let outcome = run_all(&matrix, project.path(), 4, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass, "{:?}", outcome.results);
        assert!(!project.path().join("generated.txt").exists());
    }

    #[tokio::test]
    async fn test_each_cell_gets_private_tmpdir() {
        let project = setup_test_project();
        let markers = marker_dir();
        let m = sh_quote(markers.path());
        let matrix = common::matrix(&format!(
            r#"
script = ["echo \"$TMPDIR\" > {m}/tmp_$MATRIX_CELL_INDEX"]
{}"#,
            common::TWELVE_CELL_AXES
        ));

        run_all(&matrix, project.path(), 4, CancellationToken::new())
            .await
            .unwrap();

        let tmpdirs: HashSet<String> = file_names(markers.path())
            .iter()
            .map(|name| fs::read_to_string(markers.path().join(name)).unwrap())
            .collect();
        assert_eq!(tmpdirs.len(), 12);
    }

    #[tokio::test]
    async fn test_in_place_isolation_runs_in_project() {
        let project = setup_test_project();
        let matrix = common::matrix(
            r#"
isolation = "in_place"
script = ["touch in_place_$MATRIX_CELL_INDEX"]
[[axes]]
name = "env"
values = ["A=1", "A=2"]
"#,
        );

        let outcome = run_all(&matrix, project.path(), 8, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.aggregate, Outcome::Pass);
        assert!(project.path().join("in_place_0").exists());
        assert!(project.path().join("in_place_1").exists());
    }
}
