//! # Configuration Module / 配置模块
//!
//! This module defines the `BuildMatrix.toml` schema: the matrix axes, the
//! per-cell `install` and `script` phases, the post-success hook and the
//! deployment descriptor. Everything is validated when the file is loaded,
//! before a single cell runs.
//!
//! 此模块定义 `BuildMatrix.toml` 的结构：矩阵轴、每个单元的 `install` 与 `script`
//! 阶段、成功后钩子以及部署描述。所有内容在加载时即完成校验，早于任何单元的执行。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::deploy::DeployAction;
use crate::core::matrix::checked_cell_count;
use crate::core::models::Phase;
use crate::infra::command::Shell;

/// The default name for the build matrix configuration file.
/// 构建矩阵配置文件的默认名称。
pub const CONFIG_FILE_NAME: &str = "BuildMatrix.toml";

/// Everything that can be wrong with a configuration file.
/// 配置文件可能出现的所有错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration '{origin}': {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("axis names must not be empty")]
    UnnamedAxis,
    #[error("axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },
    #[error("axis '{axis}' has no values")]
    EmptyAxis { axis: String },
    #[error("axis '{axis}' lists the value '{value}' more than once")]
    DuplicateValue { axis: String, value: String },
    #[error("axis '{axis}': invalid environment assignment '{value}': {reason}")]
    InvalidAssignment {
        axis: String,
        value: String,
        reason: String,
    },
    #[error("axis '{axis}': `{field}` is only valid on runtime axes")]
    MisplacedField { axis: String, field: &'static str },
    #[error("axis '{axis}': `export_as` value '{name}' is not a valid variable name")]
    InvalidVariableName { axis: String, name: String },
    #[error("the script must contain at least one command")]
    EmptyScript,
    #[error("{phase} command #{index} is empty")]
    EmptyCommand { phase: Phase, index: usize },
    #[error("`shell` must name a program")]
    EmptyShell,
    #[error("`command_timeout_secs` must be greater than zero")]
    ZeroTimeout,
    #[error("the axes expand into more cells than can be counted")]
    MatrixTooLarge,
    #[error("unknown deploy provider '{provider}' (expected 'pypi' or 'script')")]
    UnknownProvider { provider: String },
    #[error("invalid deploy configuration: {reason}")]
    InvalidDeploy { reason: String },
}

/// How each cell's working directory is isolated from the others.
/// 每个单元的工作目录如何与其他单元隔离。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// The project is copied into a fresh temporary workspace per cell.
    /// 为每个单元将项目复制到新的临时工作区。
    #[default]
    Copy,
    /// Cells run directly in the project directory, one at a time.
    /// 单元直接在项目目录中逐个运行。
    InPlace,
}

/// The kind of a matrix axis decides how its values reach a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisKind {
    /// A language runtime version, exported as a variable and optionally
    /// selected through a `PATH` entry.
    Runtime,
    /// A set of `NAME=value` environment assignments.
    #[default]
    Env,
}

/// A named dimension of the build matrix with an ordered list of values.
/// 构建矩阵中的一个命名维度，带有有序的取值列表。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Axis {
    pub name: String,
    #[serde(default)]
    pub kind: AxisKind,
    /// Runtime axes only: the variable the value is exported as.
    /// Defaults to `MATRIX_<NAME>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_as: Option<String>,
    /// Runtime axes only: a directory template prepended to `PATH`.
    /// `{value}` is replaced with the axis value and `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_path: Option<String>,
    pub values: Vec<String>,
}

impl Axis {
    pub fn runtime(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: AxisKind::Runtime,
            export_as: None,
            bin_path: None,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn env(name: &str, values: &[&str]) -> Self {
        Self {
            kind: AxisKind::Env,
            ..Self::runtime(name, values)
        }
    }

    /// The variable a runtime axis value is exported as.
    pub fn variable_name(&self) -> String {
        self.export_as.clone().unwrap_or_else(|| {
            let upper: String = self
                .name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                .collect();
            format!("MATRIX_{upper}")
        })
    }

    /// The environment variables a single value of this axis exports.
    ///
    /// 此轴的某个取值所导出的环境变量。
    pub fn bindings(&self, value: &str) -> Result<Vec<(String, String)>, ConfigError> {
        match self.kind {
            AxisKind::Runtime => Ok(vec![(self.variable_name(), value.to_string())]),
            AxisKind::Env => parse_assignments(&self.name, value),
        }
    }

    /// The `PATH` entry selecting the runtime for `value`, if any.
    pub fn path_entry(&self, value: &str) -> Option<String> {
        self.bin_path
            .as_ref()
            .map(|template| shellexpand::tilde(&template.replace("{value}", value)).into_owned())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::UnnamedAxis);
        }
        if self.values.is_empty() {
            return Err(ConfigError::EmptyAxis {
                axis: self.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for value in &self.values {
            if !seen.insert(value.as_str()) {
                return Err(ConfigError::DuplicateValue {
                    axis: self.name.clone(),
                    value: value.clone(),
                });
            }
        }
        match self.kind {
            AxisKind::Runtime => {
                if let Some(name) = &self.export_as {
                    if !is_identifier(name) {
                        return Err(ConfigError::InvalidVariableName {
                            axis: self.name.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
            AxisKind::Env => {
                if self.export_as.is_some() {
                    return Err(ConfigError::MisplacedField {
                        axis: self.name.clone(),
                        field: "export_as",
                    });
                }
                if self.bin_path.is_some() {
                    return Err(ConfigError::MisplacedField {
                        axis: self.name.clone(),
                        field: "bin_path",
                    });
                }
                for value in &self.values {
                    parse_assignments(&self.name, value)?;
                }
            }
        }
        Ok(())
    }
}

/// Splits an environment axis value such as `DJANGO_VERSION=2.0.*` or
/// `A=1 "B=two words"` into `(name, value)` pairs. Values are kept verbatim.
pub fn parse_assignments(axis: &str, value: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAssignment {
        axis: axis.to_string(),
        value: value.to_string(),
        reason,
    };

    let words = shlex::split(value).ok_or_else(|| invalid("unbalanced quotes".to_string()))?;
    if words.is_empty() {
        return Err(invalid("expected at least one NAME=value".to_string()));
    }

    words
        .into_iter()
        .map(|word| {
            let (name, val) = word
                .split_once('=')
                .ok_or_else(|| invalid(format!("'{word}' is not of the form NAME=value")))?;
            if !is_identifier(name) {
                return Err(invalid(format!("'{name}' is not a valid variable name")));
            }
            Ok((name.to_string(), val.to_string()))
        })
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// The encrypted deployment credential. The ciphertext is decrypted by an
/// external mechanism which exposes the plaintext in the environment
/// variable `env`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecureValue {
    pub secure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl SecureValue {
    pub const DEFAULT_ENV: &'static str = "DEPLOY_PASSWORD";

    pub fn env_var(&self) -> &str {
        self.env.as_deref().unwrap_or(Self::DEFAULT_ENV)
    }
}

/// The guard deciding which branch may deploy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeployGuard {
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for DeployGuard {
    fn default() -> Self {
        Self {
            branch: default_branch(),
        }
    }
}

/// The `[deploy]` section.
/// `[deploy]` 配置段。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeployDescriptor {
    /// `pypi` or `script`.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// `pypi` only: distribution formats passed to `setup.py`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributions: Option<String>,
    /// `pypi` only: alternative upload URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// `script` only: the command performing the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecureValue>,
    #[serde(default)]
    pub on: DeployGuard,
}

/// Represents the entire build matrix configuration, loaded from a TOML file.
///
/// 代表从 TOML 文件加载的整个构建矩阵配置。
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BuildMatrix {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,
    /// Program and leading arguments used to run every command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Vec<String>>,
    #[serde(default)]
    pub isolation: Isolation,
    /// Top-level project entries not copied into cell workspaces.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<String>,
    pub script: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_success: Option<String>,
    #[serde(default)]
    pub axes: Vec<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployDescriptor>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

/// Entries never copied into cell workspaces unless configured otherwise.
pub fn default_exclude() -> Vec<String> {
    vec![".tox".to_string(), ".venv".to_string(), "target".to_string()]
}

impl BuildMatrix {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let matrix: BuildMatrix = toml::from_str(content).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        matrix.validate()?;
        Ok(matrix)
    }

    /// Checks every rule a configuration must satisfy before a build starts.
    ///
    /// 检查构建开始前配置必须满足的所有规则。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(words) = &self.shell {
            if Shell::from_words(words).is_none() {
                return Err(ConfigError::EmptyShell);
            }
        }

        if self.command_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }

        let mut names = HashSet::new();
        for axis in &self.axes {
            axis.validate()?;
            if !names.insert(axis.name.as_str()) {
                return Err(ConfigError::DuplicateAxis {
                    axis: axis.name.clone(),
                });
            }
        }

        if checked_cell_count(&self.axes).is_none() {
            return Err(ConfigError::MatrixTooLarge);
        }

        if self.script.is_empty() {
            return Err(ConfigError::EmptyScript);
        }
        check_commands(Phase::Install, &self.install)?;
        check_commands(Phase::Script, &self.script)?;
        if let Some(hook) = &self.after_success {
            check_commands(Phase::AfterSuccess, std::slice::from_ref(hook))?;
        }

        if let Some(deploy) = &self.deploy {
            if deploy.on.branch.trim().is_empty() {
                return Err(ConfigError::InvalidDeploy {
                    reason: "`on.branch` must not be empty".to_string(),
                });
            }
            DeployAction::from_descriptor(deploy)?;
        }
        Ok(())
    }

    /// The shell every command is run with.
    pub fn shell(&self) -> Shell {
        self.shell
            .as_deref()
            .and_then(Shell::from_words)
            .unwrap_or_default()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Variables that cell and hook commands must not inherit: the one
    /// holding the decrypted deployment credential.
    ///
    /// 单元与钩子命令不得继承的变量，即保存已解密部署凭据的变量。
    pub fn withheld_env(&self) -> Vec<String> {
        self.deploy
            .iter()
            .filter_map(|deploy| deploy.password.as_ref())
            .map(|password| password.env_var().to_string())
            .collect()
    }
}

fn check_commands(phase: Phase, commands: &[String]) -> Result<(), ConfigError> {
    match commands.iter().position(|c| c.trim().is_empty()) {
        Some(i) => Err(ConfigError::EmptyCommand { phase, index: i + 1 }),
        None => Ok(()),
    }
}

/// Loads and validates the build matrix from a TOML file.
///
/// 从 TOML 文件加载并校验构建矩阵。
pub fn load_build_matrix(path: &Path) -> Result<BuildMatrix, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    BuildMatrix::parse(&content, &path.display().to_string())
}
