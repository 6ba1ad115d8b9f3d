//! # Command Execution Module / 命令执行模块
//!
//! Runs opaque shell command strings and captures their combined output.
//! The runner never interprets a command; it only looks at how the process
//! ended.
//!
//! 执行不透明的 shell 命令字符串并捕获其合并输出。
//! 运行器从不解析命令内容，只关注进程如何结束。

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::infra::t;

/// How long output readers may keep draining after the process ended.
/// Background grandchildren can hold the pipes open indefinitely.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// The program and leading arguments a command string is handed to.
/// 用于执行命令字符串的程序及其前置参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for Shell {
    fn default() -> Self {
        if cfg!(windows) {
            Self {
                program: "cmd".to_string(),
                args: vec!["/C".to_string()],
            }
        } else {
            Self {
                program: "sh".to_string(),
                args: vec!["-c".to_string()],
            }
        }
    }
}

impl Shell {
    /// Builds a shell from `["program", "arg", ...]`; `None` if no program is named.
    pub fn from_words(words: &[String]) -> Option<Self> {
        let (program, args) = words.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// A process running `script` through this shell.
    pub fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(script);
        cmd
    }
}

/// How a command ended.
/// 命令的结束方式。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Exited(i32),
    /// Terminated by a signal, no exit code.
    Signalled,
    TimedOut,
    Cancelled,
    SpawnFailed(String),
}

impl CommandStatus {
    pub fn success(&self) -> bool {
        matches!(self, CommandStatus::Exited(0))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

/// The result of running one command.
#[derive(Debug, Clone)]
pub struct CapturedCommand {
    pub status: CommandStatus,
    /// Combined stdout and stderr, line by line in arrival order.
    pub output: String,
    pub duration: Duration,
}

enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Spawns a command, captures its stdout and stderr.
/// The output streams are read concurrently and combined into a single string.
/// The process is killed if `timeout` elapses or `stop_token` is cancelled.
///
/// 派生一个命令，捕获其 stdout 和 stderr。
/// 输出流被并发读取并合并到一个字符串中。
/// 若超过 `timeout` 或 `stop_token` 被取消，进程将被终止。
pub async fn spawn_and_capture(
    mut cmd: Command,
    timeout: Option<Duration>,
    stop_token: Option<&CancellationToken>,
) -> CapturedCommand {
    let start = Instant::now();
    let mut child = match cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return CapturedCommand {
                status: CommandStatus::SpawnFailed(e.to_string()),
                output: String::new(),
                duration: start.elapsed(),
            };
        }
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        if let Err(e) = child.kill().await {
            tracing::warn!(error = %e, "failed to kill child after capture setup failed");
        }
        return CapturedCommand {
            status: CommandStatus::SpawnFailed(t!("command.capture_failed").to_string()),
            output: String::new(),
            duration: start.elapsed(),
        };
    };

    // Both streams append to one buffer so the output keeps arrival order.
    // 两个流写入同一个缓冲区，以保持输出的到达顺序。
    let output = Arc::new(tokio::sync::Mutex::new(String::new()));
    let reader_output = Arc::clone(&output);
    // Lines are split on raw bytes; invalid UTF-8 is replaced, never fatal.
    // Both pipes are drained to EOF so the child never sees a closed pipe.
    let mut reader = tokio::spawn(async move {
        let stdout = SplitStream::new(BufReader::new(stdout).split(b'\n'));
        let stderr = SplitStream::new(BufReader::new(stderr).split(b'\n'));
        let mut merged = stdout.merge(stderr);
        while let Some(item) = merged.next().await {
            match item {
                Ok(bytes) => {
                    let mut output = reader_output.lock().await;
                    output.push_str(&String::from_utf8_lossy(&bytes));
                    output.push('\n');
                }
                Err(e) => {
                    tracing::debug!(error = %e, "failed to read command output");
                    break;
                }
            }
        }
    });

    let cancelled = async {
        match stop_token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    let waited = tokio::select! {
        biased;
        res = child.wait() => Ok(res),
        _ = cancelled => Err(Interrupt::Cancelled),
        _ = deadline => Err(Interrupt::TimedOut),
    };

    let status = match waited {
        Ok(Ok(exit)) => exit
            .code()
            .map(CommandStatus::Exited)
            .unwrap_or(CommandStatus::Signalled),
        Ok(Err(e)) => CommandStatus::SpawnFailed(e.to_string()),
        Err(interrupt) => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "failed to kill interrupted command");
            }
            match interrupt {
                Interrupt::Cancelled => CommandStatus::Cancelled,
                Interrupt::TimedOut => CommandStatus::TimedOut,
            }
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut reader).await.is_err() {
        tracing::debug!("output pipes still open after exit, abandoning reader");
        reader.abort();
    }

    let output = output.lock().await.clone();
    CapturedCommand {
        status,
        output,
        duration: start.elapsed(),
    }
}

/// Runs `script` through `shell` in `cwd` with `env` added to the inherited
/// environment. Variables named in `withheld` are removed from what the
/// command inherits.
///
/// 在 `cwd` 中通过 `shell` 运行 `script`，并在继承的环境变量之上追加 `env`；
/// `withheld` 中列出的变量不会被继承。
pub async fn run_shell(
    shell: &Shell,
    script: &str,
    cwd: &Path,
    env: &[(String, String)],
    withheld: &[String],
    timeout: Option<Duration>,
    stop_token: Option<&CancellationToken>,
) -> CapturedCommand {
    let mut cmd = shell.command(script);
    cmd.current_dir(cwd);
    for name in withheld {
        cmd.env_remove(name);
    }
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    tracing::debug!(command = script, cwd = %cwd.display(), "spawning command");
    let captured = spawn_and_capture(cmd, timeout, stop_token).await;
    tracing::debug!(
        command = script,
        status = ?captured.status,
        elapsed_ms = captured.duration.as_millis() as u64,
        "command finished"
    );
    captured
}
