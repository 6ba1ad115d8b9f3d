//! # Command Line Interface Module / 命令行接口模块
//!
//! Builds the `build-matrix` command line with clap and dispatches to the
//! `run`, `list` and `init` commands. Help texts are localized, so the
//! language is determined before the parser is built.
//!
//! 使用 clap 构建 `build-matrix` 命令行，并分派到 `run`、`list` 和 `init` 命令。
//! 帮助文本已本地化，因此需要在构建解析器之前确定语言。

pub mod commands;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::{
    core::config::CONFIG_FILE_NAME,
    infra::{logging, t},
    resolve_locale, system_locale,
};
use commands::run::RunOptions;

/// Pre-parses the command line arguments to find an explicit `--lang`.
/// This allows i18n to be initialized before the full CLI is built.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter().enumerate().find_map(|(pos, arg)| {
        if arg == "--lang" {
            args.get(pos + 1).cloned()
        } else {
            arg.strip_prefix("--lang=").map(str::to_string)
        }
    })
}

fn config_arg(locale: &str) -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("cli.arg_config", locale = locale).to_string())
        .value_name("CONFIG")
        .default_value(CONFIG_FILE_NAME)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn build_cli(locale: &str) -> Command {
    Command::new("build-matrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.arg_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("cli.arg_verbose", locale = locale).to_string())
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help(t!("cli.arg_project_dir", locale = locale).to_string())
                        .value_name("PROJECT_DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("cli.arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("branch")
                        .long("branch")
                        .help(t!("cli.arg_branch", locale = locale).to_string())
                        .value_name("BRANCH")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("no-deploy")
                        .long("no-deploy")
                        .help(t!("cli.arg_no_deploy", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("cli.arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_json", locale = locale).to_string())
                        .value_name("JSON")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("list")
                .about(t!("cli.cmd_list_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_list_json", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_output", locale = locale).to_string())
                        .value_name("OUTPUT")
                        .default_value(CONFIG_FILE_NAME)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("cli.arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn path_arg(matches: &ArgMatches, id: &str) -> PathBuf {
    matches.get_one::<PathBuf>(id).cloned().unwrap_or_default()
}

/// Parses the command line and runs the selected command.
///
/// 解析命令行并执行所选命令。
pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let explicit_lang = pre_parse_language();
    let language = match &explicit_lang {
        Some(lang) => resolve_locale(lang),
        None => system_locale(),
    };
    rust_i18n::set_locale(language);

    let matches = build_cli(language).get_matches();
    let verbosity = matches
        .subcommand()
        .map(|(_, sub)| sub.get_count("verbose"))
        .unwrap_or_default()
        .max(matches.get_count("verbose"));
    logging::init_tracing(verbosity);

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let options = RunOptions {
                config: path_arg(run_matches, "config"),
                project_dir: path_arg(run_matches, "project-dir"),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                branch: run_matches.get_one::<String>("branch").cloned(),
                deploy_enabled: !run_matches.get_flag("no-deploy"),
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                json: run_matches.get_one::<PathBuf>("json").cloned(),
                lang: explicit_lang,
            };
            commands::run::execute(options).await
        }
        Some(("list", list_matches)) => commands::list::execute(
            &path_arg(list_matches, "config"),
            list_matches.get_flag("json"),
            explicit_lang.as_deref(),
        ),
        Some(("init", init_matches)) => {
            if explicit_lang.is_none() {
                println!("{}", t!("init.language_detected", lang = language));
            }
            commands::init::execute(
                &path_arg(init_matches, "output"),
                init_matches.get_flag("force"),
                init_matches.get_flag("non-interactive"),
                language,
            )
        }
        // `subcommand_required` makes clap print help and exit before this.
        _ => Ok(()),
    }
}
