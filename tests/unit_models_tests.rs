//! # Models Module Unit Tests / Models 模块单元测试
//!
//! Tests for the result types: failure attribution, aggregation and the
//! build verdict.
//!
//! 测试结果类型：失败归因、结果汇总与构建结论。

use build_matrix::config::Axis;
use build_matrix::core::deploy::{DeployReport, GateDecision};
use build_matrix::infra::command::{CapturedCommand, CommandStatus};
use build_matrix::matrix::{expand, Cell};
use build_matrix::models::{
    BuildOutcome, BuildReport, CellResult, CommandFailure, FailureReason, HookReport, Outcome,
    Phase, StepRecord,
};
use chrono::Utc;
use std::time::Duration;

/// Helper function to create cells / 创建单元的辅助函数
fn cells(count: usize) -> Vec<Cell> {
    let values: Vec<String> = (0..count).map(|i| format!("SET={i}")).collect();
    let values: Vec<&str> = values.iter().map(String::as_str).collect();
    expand(&[Axis::env("env", &values)]).unwrap().collect()
}

fn captured(status: CommandStatus, output: &str) -> CapturedCommand {
    CapturedCommand {
        status,
        output: output.to_string(),
        duration: Duration::from_millis(5),
    }
}

fn passed(cell: Cell) -> CellResult {
    CellResult::Passed {
        cell,
        steps: vec![],
        duration: Duration::from_secs(1),
    }
}

fn failed(cell: Cell, reason: FailureReason) -> CellResult {
    CellResult::Failed {
        cell,
        steps: vec![],
        failure: CommandFailure {
            phase: Phase::Script,
            index: 1,
            command: "make test".to_string(),
            reason,
            exit_code: Some(1),
            output: "boom".to_string(),
        },
        duration: Duration::from_secs(1),
    }
}

fn report(results: Vec<CellResult>, post_success: HookReport, deploy: DeployReport) -> BuildReport {
    let aggregate = Outcome::from_results(&results);
    BuildReport {
        started_at: Utc::now(),
        branch: Some("master".to_string()),
        outcome: BuildOutcome {
            results,
            aggregate,
            post_success,
            duration: Duration::from_secs(3),
        },
        deploy,
    }
}

#[cfg(test)]
mod command_failure_tests {
    use super::*;

    #[test]
    fn test_success_is_not_a_failure() {
        let ok = captured(CommandStatus::Exited(0), "fine");
        assert!(CommandFailure::from_captured(Phase::Script, 1, "true", &ok).is_none());
    }

    #[test]
    fn test_cancellation_is_not_a_failure() {
        let cancelled = captured(CommandStatus::Cancelled, "");
        assert!(CommandFailure::from_captured(Phase::Script, 1, "sleep 9", &cancelled).is_none());
    }

    #[test]
    fn test_non_zero_exit() {
        let status = captured(CommandStatus::Exited(2), "E501 line too long");
        let failure = CommandFailure::from_captured(Phase::Script, 2, "flake8", &status).unwrap();
        assert_eq!(failure.phase, Phase::Script);
        assert_eq!(failure.index, 2);
        assert_eq!(failure.command, "flake8");
        assert_eq!(failure.reason, FailureReason::NonZeroExit);
        assert_eq!(failure.exit_code, Some(2));
        assert_eq!(failure.output, "E501 line too long");
    }

    #[test]
    fn test_timeout_and_signal() {
        let timeout = captured(CommandStatus::TimedOut, "partial");
        let failure = CommandFailure::from_captured(Phase::Install, 1, "pip install", &timeout).unwrap();
        assert_eq!(failure.reason, FailureReason::Timeout);
        assert_eq!(failure.exit_code, None);
        assert_eq!(failure.output, "partial");

        let signal = captured(CommandStatus::Signalled, "");
        let failure = CommandFailure::from_captured(Phase::Script, 1, "crash", &signal).unwrap();
        assert_eq!(failure.reason, FailureReason::Signalled);
    }

    #[test]
    fn test_spawn_failure_keeps_error() {
        let status = captured(CommandStatus::SpawnFailed("No such file".to_string()), "");
        let failure = CommandFailure::from_captured(Phase::Script, 1, "x", &status).unwrap();
        assert_eq!(failure.reason, FailureReason::SpawnFailed);
        assert_eq!(failure.output, "No such file");
    }

    #[test]
    fn test_step_record_copies_capture() {
        let status = captured(CommandStatus::Exited(0), "ok\n");
        let step = StepRecord::new(Phase::Install, 3, "pip install -e .", &status);
        assert_eq!(step.index, 3);
        assert_eq!(step.exit_code, Some(0));
        assert_eq!(step.output, "ok\n");
        assert_eq!(step.duration, Duration::from_millis(5));
    }
}

#[cfg(test)]
mod aggregate_tests {
    use super::*;

    #[test]
    fn test_all_passed_is_pass() {
        let results: Vec<CellResult> = cells(3).into_iter().map(passed).collect();
        assert_eq!(Outcome::from_results(&results), Outcome::Pass);
    }

    #[test]
    fn test_single_failure_fails_aggregate() {
        let mut results: Vec<CellResult> = cells(12).into_iter().map(passed).collect();
        let sixth = results[6].cell().clone();
        results[6] = failed(sixth, FailureReason::NonZeroExit);
        assert_eq!(Outcome::from_results(&results), Outcome::Fail);
    }

    #[test]
    fn test_cancelled_cell_fails_aggregate() {
        let mut cells = cells(2).into_iter();
        let results = vec![
            passed(cells.next().unwrap()),
            CellResult::Cancelled {
                cell: cells.next().unwrap(),
                steps: vec![],
                duration: Duration::ZERO,
            },
        ];
        assert_eq!(Outcome::from_results(&results), Outcome::Fail);
    }

    #[test]
    fn test_counts() {
        let mut cells = cells(4).into_iter();
        let outcome = report(
            vec![
                passed(cells.next().unwrap()),
                passed(cells.next().unwrap()),
                failed(cells.next().unwrap(), FailureReason::Timeout),
                CellResult::Cancelled {
                    cell: cells.next().unwrap(),
                    steps: vec![],
                    duration: Duration::ZERO,
                },
            ],
            HookReport::Skipped,
            DeployReport::NotConfigured,
        )
        .outcome;
        assert_eq!(outcome.passed_count(), 2);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.cancelled_count(), 1);
    }

    #[test]
    fn test_status_strings_and_classes() {
        let mut cells = cells(3).into_iter();
        let ok = passed(cells.next().unwrap());
        let timeout = failed(cells.next().unwrap(), FailureReason::Timeout);
        let error = failed(cells.next().unwrap(), FailureReason::NonZeroExit);

        assert_eq!(ok.status_str("en"), "Passed");
        assert_eq!(ok.status_class(), "status-passed");
        assert_eq!(timeout.status_str("en"), "Timeout");
        assert_eq!(timeout.status_class(), "status-timeout");
        assert_eq!(error.status_str("en"), "Failed");
        assert_eq!(error.status_class(), "status-failed");
        assert!(error.is_failure() && !error.is_pass());
    }
}

#[cfg(test)]
mod build_report_tests {
    use super::*;

    #[test]
    fn test_passing_build_succeeds() {
        let results = cells(2).into_iter().map(passed).collect();
        let report = report(results, HookReport::NotConfigured, DeployReport::NotConfigured);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_failed_cell_fails_build() {
        let mut cells = cells(2).into_iter();
        let results = vec![
            passed(cells.next().unwrap()),
            failed(cells.next().unwrap(), FailureReason::NonZeroExit),
        ];
        let report = report(
            results,
            HookReport::Skipped,
            DeployReport::Skipped {
                decision: GateDecision::BuildFailed,
            },
        );
        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_failed_hook_fails_build() {
        let results = cells(1).into_iter().map(passed).collect();
        let report = report(
            results,
            HookReport::Failed {
                failure: CommandFailure::from_captured(
                    Phase::AfterSuccess,
                    1,
                    "coveralls",
                    &captured(CommandStatus::Exited(1), ""),
                )
                .unwrap(),
            },
            DeployReport::NotConfigured,
        );
        assert!(report.outcome.aggregate.is_pass());
        assert!(!report.is_success());
    }

    #[test]
    fn test_cancelled_hook_fails_build() {
        let results = cells(1).into_iter().map(passed).collect();
        let report = report(results, HookReport::Cancelled, DeployReport::NotConfigured);
        assert!(report.outcome.aggregate.is_pass());
        assert!(report.outcome.post_success.has_run());
        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_failed_deploy_fails_build() {
        let results = cells(1).into_iter().map(passed).collect();
        let report = report(
            results,
            HookReport::NotConfigured,
            DeployReport::Failed {
                provider: "pypi".to_string(),
                message: "upload rejected".to_string(),
                failure: None,
            },
        );
        assert!(!report.is_success());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_skipped_deploy_is_not_a_failure() {
        let results = cells(1).into_iter().map(passed).collect();
        let report = report(
            results,
            HookReport::NotConfigured,
            DeployReport::Skipped {
                decision: GateDecision::BranchMismatch {
                    expected: "master".to_string(),
                    actual: Some("feature-x".to_string()),
                },
            },
        );
        assert!(report.is_success());
    }
}
