//! # Init Command Module / 初始化命令模块
//!
//! This module implements the `init` command, which creates a new
//! `BuildMatrix.toml` either from a commented template or through an
//! interactive wizard.
//!
//! 此模块实现 `init` 命令，通过带注释的模板或交互式向导创建新的 `BuildMatrix.toml`。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::{fs, path::Path};

use crate::core::config::{
    default_exclude, Axis, BuildMatrix, DeployDescriptor, DeployGuard, SecureValue,
};
use crate::infra::t;

/// The template written by `init --non-interactive`.
pub const DEFAULT_CONFIG: &str = r#"# Build Matrix Configuration / 构建矩阵配置

# Language for runner messages / 运行器消息的语言
language = "en"

# Abort a command that runs longer than this / 命令超时时间（秒）
command_timeout_secs = 1800

# Commands run in every cell before the script / 在脚本之前于每个单元中运行的命令
install = [
    "pip install -q Django==$DJANGO_VERSION",
    "pip install -q -r requirements-test.txt",
]

# Commands run in every cell; the first failure ends the cell
# 每个单元中运行的命令；第一条失败的命令会结束该单元
script = [
    "isort --check-only --diff",
    "flake8",
    "coverage run -m pytest",
]

# Runs once, only when every cell passed / 仅当所有单元通过时运行一次
after_success = "coveralls"

# Runtime versions / 运行时版本
[[axes]]
name = "python"
kind = "runtime"
export_as = "PYTHON_VERSION"
bin_path = "~/.pyenv/versions/{value}/bin"
values = ["3.6", "3.7", "3.8"]

# Environment variable sets / 环境变量组
[[axes]]
name = "env"
kind = "env"
values = [
    "DJANGO_VERSION=1.11.*",
    "DJANGO_VERSION=2.0.*",
    "DJANGO_VERSION=2.1.*",
    "DJANGO_VERSION=2.2.*",
]

# Publishes once, when every cell passed on the deploy branch
# 当所有单元通过且位于部署分支时发布一次
[deploy]
provider = "pypi"
user = "your-pypi-user"
distributions = "sdist bdist_wheel"
password = { secure = "<encrypted>", env = "DEPLOY_PASSWORD" }
on = { branch = "master" }
"#;

/// Executes the init command.
///
/// An existing file is only replaced with `force`, or after confirmation in
/// the interactive wizard.
///
/// 执行 init 命令。仅在指定 `force` 或在交互式向导中确认后才会覆盖已存在的文件。
pub fn execute(output: &Path, force: bool, non_interactive: bool, language: &str) -> Result<()> {
    let theme = ColorfulTheme::default();

    if output.exists() && !force {
        if non_interactive {
            println!("{}", t!("init.file_exists", locale = language, path = output.display()).red());
            println!("{}", t!("init.use_force", locale = language).yellow());
            return Ok(());
        }
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let content = if non_interactive {
        DEFAULT_CONFIG.to_string()
    } else {
        println!("\n{}", t!("init.wizard_welcome", locale = language).cyan().bold());
        println!("{}", t!("init.wizard_description", locale = language));
        let matrix = run_wizard(&theme, language)?;
        toml::to_string_pretty(&matrix)
            .context(t!("init.serialize_failed", locale = language).to_string())?
    };

    write_config(output, &content, language)
}

/// Asks for the parts of a configuration and validates the result.
fn run_wizard(theme: &ColorfulTheme, language: &str) -> Result<BuildMatrix> {
    let languages = ["en", "zh-CN"];
    let lang_index = Select::with_theme(theme)
        .with_prompt(t!("init.language_prompt", locale = language))
        .items(&languages[..])
        .default(if language == "zh-CN" { 1 } else { 0 })
        .interact()?;

    let runtime_name: String = Input::with_theme(theme)
        .with_prompt(t!("init.runtime_name_prompt", locale = language))
        .default("python".to_string())
        .interact_text()?;
    let runtime_values: String = Input::with_theme(theme)
        .with_prompt(t!("init.runtime_values_prompt", locale = language))
        .default("3.6, 3.7, 3.8".to_string())
        .interact_text()?;
    let env_values: String = Input::with_theme(theme)
        .with_prompt(t!("init.env_values_prompt", locale = language))
        .allow_empty(true)
        .interact_text()?;
    let script: String = Input::with_theme(theme)
        .with_prompt(t!("init.script_prompt", locale = language))
        .default("pytest".to_string())
        .interact_text()?;
    let after_success: String = Input::with_theme(theme)
        .with_prompt(t!("init.after_success_prompt", locale = language))
        .allow_empty(true)
        .interact_text()?;

    let mut axes = Vec::new();
    let runtime_values = split_list(&runtime_values, ',');
    if !runtime_values.is_empty() {
        let values: Vec<&str> = runtime_values.iter().map(String::as_str).collect();
        axes.push(Axis::runtime(runtime_name.trim(), &values));
    }
    let env_values = split_list(&env_values, ';');
    if !env_values.is_empty() {
        let values: Vec<&str> = env_values.iter().map(String::as_str).collect();
        axes.push(Axis::env("env", &values));
    }

    let deploy = if Confirm::with_theme(theme)
        .with_prompt(t!("init.deploy_prompt", locale = language))
        .default(false)
        .interact()?
    {
        let user: String = Input::with_theme(theme)
            .with_prompt(t!("init.deploy_user_prompt", locale = language))
            .interact_text()?;
        Some(DeployDescriptor {
            provider: "pypi".to_string(),
            user: Some(user),
            distributions: Some("sdist bdist_wheel".to_string()),
            repository: None,
            command: None,
            password: Some(SecureValue {
                secure: "<encrypted>".to_string(),
                env: None,
            }),
            on: DeployGuard::default(),
        })
    } else {
        None
    };

    let matrix = BuildMatrix {
        language: languages[lang_index].to_string(),
        shell: None,
        isolation: Default::default(),
        exclude: default_exclude(),
        command_timeout_secs: None,
        install: Vec::new(),
        script: split_list(&script, ';'),
        after_success: Some(after_success.trim().to_string()).filter(|s| !s.is_empty()),
        axes,
        deploy,
    };
    matrix
        .validate()
        .context(t!("init.invalid_answers", locale = language).to_string())?;
    Ok(matrix)
}

fn split_list(input: &str, separator: char) -> Vec<String> {
    input
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn write_config(path: &Path, content: &str, language: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", locale = language, path = parent.display()).to_string()
        })?;
    }

    fs::write(path, content)
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success", locale = language, path = path.display()).bold()
    );
    println!("{}", t!("init.next_steps", locale = language));
    Ok(())
}
