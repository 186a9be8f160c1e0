//! # Command Execution Module / 命令执行模块
//!
//! Spawns external processes (`docker`, `ssh`, `scp`, `tar`, ...), echoes
//! their output line by line while it is produced, and keeps a combined copy
//! so a failure can show the operator what happened.
//!
//! 派生外部进程（`docker`、`ssh`、`scp`、`tar` 等），在输出产生时逐行回显，
//! 并保留合并后的副本，以便失败时向操作者展示发生了什么。

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::core::error::CiError;

/// How a command is run by an execution backend.
/// 执行后端运行命令的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Raise [`CiError::CommandFailed`] on a nonzero exit.
    /// 非零退出时抛出 [`CiError::CommandFailed`]。
    pub check: bool,
    /// Echo output to the console while it is produced.
    /// 在输出产生时将其回显到控制台。
    pub echo: bool,
    /// Wrap the command in an explicit POSIX shell on targets that need it.
    /// 在需要的目标上用显式的 POSIX shell 包装命令。
    pub posix_shell: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::checked()
    }
}

impl RunOptions {
    pub const fn checked() -> Self {
        Self {
            check: true,
            echo: true,
            posix_shell: false,
        }
    }

    pub const fn unchecked(self) -> Self {
        Self {
            check: false,
            ..self
        }
    }

    pub const fn quiet(self) -> Self {
        Self {
            echo: false,
            ..self
        }
    }

    pub const fn posix_shell(self) -> Self {
        Self {
            posix_shell: true,
            ..self
        }
    }
}

/// Exit status and combined output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub status: ExitStatus,
    pub output: String,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Turns an unsuccessful outcome into [`CiError::CommandFailed`].
    pub fn check(self, command: &str) -> Result<Self, CiError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CiError::CommandFailed {
                command: command.to_string(),
                status: self.status.to_string(),
                output: self.output,
            })
        }
    }
}

/// Renders an argument vector the way a POSIX shell would accept it.
pub fn display_command<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| {
            shlex::try_quote(arg.as_ref())
                .map(|quoted| quoted.into_owned())
                .unwrap_or_else(|_| format!("{:?}", arg.as_ref()))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `argv` in `cwd` on the local machine.
///
/// Fails only if the process cannot be spawned; the exit status is inspected
/// by the caller (see [`CommandOutcome::check`]).
///
/// 在本地 `cwd` 中运行 `argv`。仅在进程无法派生时失败；退出状态由调用方检查。
pub async fn run_local<S: AsRef<str>>(argv: &[S], cwd: &Path, echo: bool) -> Result<CommandOutcome> {
    let Some((program, args)) = argv.split_first() else {
        bail!("Empty command.");
    };
    let rendered = display_command(argv);
    debug!(command = %rendered, cwd = %cwd.display(), "spawning");

    let mut cmd = Command::new(program.as_ref());
    cmd.args(args.iter().map(AsRef::as_ref))
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let (status, output) = spawn_and_capture(cmd, echo).await;
    let status = status.with_context(|| format!("Failed to run `{rendered}`"))?;
    debug!(command = %rendered, %status, "finished");
    Ok(CommandOutcome { status, output })
}

/// Spawns a command and captures its stdout and stderr line by line.
/// The streams are read concurrently into one combined string; with `echo`
/// every line is also printed as soon as it arrives.
///
/// 派生一个命令并逐行捕获其 stdout 和 stderr。两个输出流被并发读取并合并到一个字符串中；
/// 启用 `echo` 时，每一行到达后会立即打印。
pub async fn spawn_and_capture(
    mut cmd: Command,
    echo: bool,
) -> (std::io::Result<ExitStatus>, String) {
    let mut child = match cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn() {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new()),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return (
            Err(std::io::Error::other("Failed to capture process output")),
            String::new(),
        );
    };

    let output = Arc::new(tokio::sync::Mutex::new(String::new()));
    let stdout_handle = tokio::spawn(pump_lines(stdout, Arc::clone(&output), echo, false));
    let stderr_handle = tokio::spawn(pump_lines(stderr, Arc::clone(&output), echo, true));

    let status = child.wait().await;

    // Both readers must finish before the output is complete.
    if let Err(e) = stdout_handle.await {
        eprintln!("Failed to join stdout task: {}", e);
    }
    if let Err(e) = stderr_handle.await {
        eprintln!("Failed to join stderr task: {}", e);
    }

    let output = output.lock().await.clone();
    (status, output)
}

async fn pump_lines<R>(
    stream: R,
    output: Arc<tokio::sync::Mutex<String>>,
    echo: bool,
    is_stderr: bool,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if echo {
            if is_stderr {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
        let mut output = output.lock().await;
        output.push_str(&line);
        output.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_command_quotes_only_when_needed() {
        assert_eq!(
            display_command(&["docker", "cp", "a b"]),
            "docker cp 'a b'"
        );
    }
}
