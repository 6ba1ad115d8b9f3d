//! # Deployment Module / 部署模块
//!
//! Deployment happens at most once per build, after every cell has
//! finished. It is gated on two conditions: the aggregate outcome is a pass
//! and the current branch is exactly the configured branch (`master` unless
//! overridden). The credential is resolved only once the gate is open and is
//! masked in everything this module reports.
//!
//! 每次构建最多部署一次，且在所有单元完成之后进行。部署受两个条件约束：
//! 整体结果为通过，并且当前分支与配置的分支（默认 `master`）完全一致。
//! 凭据仅在闸门打开后才被解析，并在本模块输出的所有内容中被遮蔽。

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        config::{ConfigError, DeployDescriptor, SecureValue},
        models::{CommandFailure, FailureReason, Outcome, Phase, StepRecord},
    },
    infra::{
        command::{self, CommandStatus, Shell},
        secret::Secret,
        t,
    },
};

/// Whether deployment may proceed, and if not, why.
/// 是否允许部署；若不允许，说明原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Open,
    /// At least one cell did not pass.
    BuildFailed,
    /// The build passed on a branch other than the deploy branch.
    BranchMismatch {
        expected: String,
        actual: Option<String>,
    },
    /// Deployment was turned off for this run (`--no-deploy`).
    Disabled,
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, GateDecision::Open)
    }

    pub fn describe(&self) -> String {
        match self {
            GateDecision::Open => t!("deploy.gate_open").to_string(),
            GateDecision::BuildFailed => t!("deploy.gate_build_failed").to_string(),
            GateDecision::BranchMismatch { expected, actual } => t!(
                "deploy.gate_branch_mismatch",
                expected = expected,
                actual = actual.as_deref().unwrap_or("?")
            )
            .to_string(),
            GateDecision::Disabled => t!("deploy.gate_disabled").to_string(),
        }
    }
}

/// The branch condition of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentGate {
    branch: String,
}

impl DeploymentGate {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }

    pub fn from_descriptor(descriptor: &DeployDescriptor) -> Self {
        Self::new(descriptor.on.branch.clone())
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Opens iff `aggregate` passed and `current_branch` equals the deploy
    /// branch exactly. No prefix, glob or case-insensitive matching.
    ///
    /// 当且仅当 `aggregate` 通过且 `current_branch` 与部署分支完全相等时打开。
    pub fn evaluate(&self, aggregate: Outcome, current_branch: Option<&str>) -> GateDecision {
        if !aggregate.is_pass() {
            return GateDecision::BuildFailed;
        }
        match current_branch {
            Some(branch) if branch == self.branch => GateDecision::Open,
            other => GateDecision::BranchMismatch {
                expected: self.branch.clone(),
                actual: other.map(str::to_string),
            },
        }
    }
}

/// What a deployment does once the gate is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployAction {
    /// Builds distributions with `setup.py` and uploads them with twine.
    Pypi {
        distributions: String,
        /// Already shell-quoted.
        repository: Option<String>,
    },
    /// Runs a user-supplied command.
    Script { command: String },
}

impl DeployAction {
    const DEFAULT_DISTRIBUTIONS: &'static str = "sdist";

    /// Validates `descriptor` and builds the matching action.
    pub fn from_descriptor(descriptor: &DeployDescriptor) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidDeploy {
            reason: reason.to_string(),
        };

        match descriptor.provider.as_str() {
            "pypi" => {
                if descriptor.user.as_deref().is_none_or(|u| u.trim().is_empty()) {
                    return Err(invalid("provider 'pypi' requires `user`"));
                }
                if descriptor.password.is_none() {
                    return Err(invalid("provider 'pypi' requires `password`"));
                }
                if descriptor.command.is_some() {
                    return Err(invalid("`command` is only valid for provider 'script'"));
                }
                let repository = descriptor
                    .repository
                    .as_deref()
                    .map(|url| {
                        shlex::try_quote(url)
                            .map(|q| q.into_owned())
                            .map_err(|_| invalid("`repository` cannot be quoted for the shell"))
                    })
                    .transpose()?;
                let distributions = descriptor
                    .distributions
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| Self::DEFAULT_DISTRIBUTIONS.to_string());
                Ok(DeployAction::Pypi {
                    distributions,
                    repository,
                })
            }
            "script" => {
                let command = descriptor
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| invalid("provider 'script' requires a non-empty `command`"))?;
                if descriptor.distributions.is_some() || descriptor.repository.is_some() {
                    return Err(invalid(
                        "`distributions` and `repository` are only valid for provider 'pypi'",
                    ));
                }
                Ok(DeployAction::Script { command })
            }
            other => Err(ConfigError::UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            DeployAction::Pypi { .. } => "pypi",
            DeployAction::Script { .. } => "script",
        }
    }

    /// The commands performing the deployment, in order.
    pub fn commands(&self) -> Vec<String> {
        match self {
            DeployAction::Pypi {
                distributions,
                repository,
            } => {
                let mut upload = "python -m twine upload --skip-existing".to_string();
                if let Some(url) = repository {
                    upload.push_str(" --repository-url ");
                    upload.push_str(url);
                }
                upload.push_str(" dist/*");
                vec![format!("python setup.py {distributions}"), upload]
            }
            DeployAction::Script { command } => vec![command.clone()],
        }
    }

    /// Variables handed to the deployment commands. The credential travels
    /// only through here.
    pub fn environment(&self, user: Option<&str>, secret: Option<&Secret>) -> Vec<(String, String)> {
        let (user_var, password_var) = match self {
            DeployAction::Pypi { .. } => ("TWINE_USERNAME", "TWINE_PASSWORD"),
            DeployAction::Script { .. } => ("DEPLOY_USER", "DEPLOY_PASSWORD"),
        };
        let mut vars = vec![("DEPLOY_PROVIDER".to_string(), self.provider().to_string())];
        if let Some(user) = user {
            vars.push((user_var.to_string(), user.to_string()));
        }
        if let Some(secret) = secret {
            vars.push((password_var.to_string(), secret.expose().to_string()));
        }
        vars
    }
}

/// Turns an encrypted credential reference into its plaintext.
///
/// 将加密的凭据引用解析为明文。
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, value: &SecureValue) -> Result<Secret>;
}

/// Reads the decrypted credential from the environment variable named by
/// [`SecureValue::env_var`]. Decryption itself happens outside the runner.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, value: &SecureValue) -> Result<Secret> {
        let var = value.env_var();
        let plaintext = std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .with_context(|| t!("deploy.credential_missing", var = var).to_string())?;
        Ok(Secret::new(plaintext))
    }
}

/// Where and how deployment commands run.
#[derive(Debug, Clone)]
pub struct DeployContext<'a> {
    pub project_root: &'a Path,
    pub shell: Shell,
    pub timeout: Option<Duration>,
    pub stop_token: CancellationToken,
}

/// What happened to the deployment.
/// 部署的执行情况。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployReport {
    /// The configuration has no `[deploy]` section.
    NotConfigured,
    Skipped { decision: GateDecision },
    Deployed {
        provider: String,
        steps: Vec<StepRecord>,
        duration: Duration,
    },
    Failed {
        provider: String,
        message: String,
        failure: Option<CommandFailure>,
    },
}

impl DeployReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, DeployReport::Failed { .. })
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, DeployReport::Deployed { .. })
    }
}

/// Deploys iff a `[deploy]` section exists, deployment is `enabled`, the
/// aggregate passed and `current_branch` is exactly the deploy branch.
///
/// Runs at most once per call. The secret is requested from `resolver` only
/// after the gate opened, and every output recorded in the report has it
/// replaced by a placeholder.
///
/// 当且仅当存在 `[deploy]` 配置段、部署已启用、整体结果通过且 `current_branch`
/// 与部署分支完全相等时执行部署。凭据仅在闸门打开后才向 `resolver` 请求，
/// 报告中记录的所有输出都会将其替换为占位符。
pub async fn maybe_deploy(
    descriptor: Option<&DeployDescriptor>,
    aggregate: Outcome,
    current_branch: Option<&str>,
    enabled: bool,
    resolver: &dyn SecretResolver,
    ctx: &DeployContext<'_>,
) -> DeployReport {
    let Some(descriptor) = descriptor else {
        return DeployReport::NotConfigured;
    };

    let gate = DeploymentGate::from_descriptor(descriptor);
    let decision = match gate.evaluate(aggregate, current_branch) {
        GateDecision::Open if !enabled => GateDecision::Disabled,
        decision => decision,
    };
    tracing::info!(?decision, branch = ?current_branch, "deploy gate evaluated");

    if !decision.is_open() {
        println!(
            "\n{}",
            t!("deploy.skipped", reason = decision.describe()).yellow()
        );
        return DeployReport::Skipped { decision };
    }

    let action = match DeployAction::from_descriptor(descriptor) {
        Ok(action) => action,
        Err(e) => {
            return DeployReport::Failed {
                provider: descriptor.provider.clone(),
                message: e.to_string(),
                failure: None,
            };
        }
    };
    let provider = action.provider().to_string();

    let secret = match descriptor.password.as_ref().map(|p| resolver.resolve(p)).transpose() {
        Ok(secret) => secret,
        Err(e) => {
            // The resolver error names the variable, never its value.
            let message = format!("{e:#}");
            println!("{}", t!("deploy.failed", provider = provider, reason = message).red());
            return DeployReport::Failed {
                failure: Some(CommandFailure {
                    phase: Phase::Deploy,
                    index: 0,
                    command: t!("deploy.credential_step").to_string(),
                    reason: FailureReason::Credential,
                    exit_code: None,
                    output: message.clone(),
                }),
                provider,
                message,
            };
        }
    };

    let mask = |text: &str| match &secret {
        Some(secret) => secret.redact(text),
        None => text.to_string(),
    };

    println!("\n{}", t!("deploy.started", provider = provider, branch = gate.branch()).blue());
    let env = action.environment(descriptor.user.as_deref(), secret.as_ref());
    let start_time = Instant::now();
    let mut steps = Vec::new();

    for (i, script) in action.commands().iter().enumerate() {
        let index = i + 1;
        let mut captured = command::run_shell(
            &ctx.shell,
            script,
            ctx.project_root,
            &env,
            &[],
            ctx.timeout,
            Some(&ctx.stop_token),
        )
        .await;
        captured.output = mask(&captured.output);
        if let CommandStatus::SpawnFailed(err) = &captured.status {
            captured.status = CommandStatus::SpawnFailed(mask(err));
        }
        let shown = mask(script);

        if captured.status == CommandStatus::Cancelled {
            let message = t!("deploy.cancelled").to_string();
            println!("{}", message.yellow());
            return DeployReport::Failed {
                provider,
                message,
                failure: None,
            };
        }

        if let Some(failure) = CommandFailure::from_captured(Phase::Deploy, index, &shown, &captured) {
            let message = t!(
                "deploy.command_failed",
                index = index,
                reason = failure.reason.describe()
            )
            .to_string();
            println!("{}", t!("deploy.failed", provider = provider, reason = message).red());
            return DeployReport::Failed {
                provider,
                message,
                failure: Some(failure),
            };
        }
        steps.push(StepRecord::new(Phase::Deploy, index, &shown, &captured));
    }

    println!("{}", t!("deploy.succeeded", provider = provider).green().bold());
    DeployReport::Deployed {
        provider,
        steps,
        duration: start_time.elapsed(),
    }
}
