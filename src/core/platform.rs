//! # Target Platforms / 目标平台
//!
//! A remote host is driven through a [`TargetPlatform`], which knows how to
//! turn the controller's POSIX-style paths into native paths and how to build
//! the command line the remote shell executes. The platform is chosen once per
//! run from the host table.
//!
//! 远程主机通过 [`TargetPlatform`] 驱动：它负责把控制端的 POSIX 风格路径转换为
//! 原生路径，并构造远程 shell 执行的命令行。平台在每次运行时根据主机表选择一次。

use std::borrow::Cow;
use std::fmt;

use crate::core::config::{HostEntry, PlatformKind};
use crate::core::error::CiError;

pub trait TargetPlatform: fmt::Debug + Send + Sync {
    /// Short name used in messages.
    fn name(&self) -> &'static str;

    /// Translates a POSIX-style path into the target's native syntax.
    fn native_path(&self, path: &str) -> Result<String, CiError>;

    /// Builds the remote command line that runs `argv` inside `cwd`.
    ///
    /// `force_posix_shell` asks for the command to be wrapped in an explicit
    /// POSIX shell on targets whose native shell is not one.
    fn shell_command(
        &self,
        cwd: &str,
        argv: &[String],
        force_posix_shell: bool,
    ) -> Result<String, CiError>;
}

/// Selects the platform implementation of a host entry.
pub fn for_host(host: &HostEntry) -> Box<dyn TargetPlatform> {
    match host.platform {
        PlatformKind::Posix => Box::new(PosixPlatform),
        PlatformKind::Windows => Box::new(WindowsPlatform {
            posix_shell: host.posix_shell.clone(),
        }),
    }
}

/// Linux, macOS and every other target with a POSIX login shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixPlatform;

impl TargetPlatform for PosixPlatform {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn native_path(&self, path: &str) -> Result<String, CiError> {
        Ok(path.to_string())
    }

    fn shell_command(
        &self,
        cwd: &str,
        argv: &[String],
        _force_posix_shell: bool,
    ) -> Result<String, CiError> {
        posix_command_line(cwd, argv)
    }
}

/// Windows targets running OpenSSH with `cmd.exe` as the default shell.
#[derive(Debug, Clone, Default)]
pub struct WindowsPlatform {
    /// Native path of a POSIX shell, e.g. `c:\tools\msys64\usr\bin\bash`.
    pub posix_shell: Option<String>,
}

impl TargetPlatform for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    /// `/c/Users/test` becomes `c:\Users\test`. The first segment must be a
    /// single drive letter and at least one segment must follow it.
    fn native_path(&self, path: &str) -> Result<String, CiError> {
        let fail = |reason| CiError::PathTranslation {
            path: path.to_string(),
            platform: "windows",
            reason,
        };

        let rest = path.strip_prefix('/').ok_or_else(|| fail("path is not absolute"))?;
        let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
        let drive = segments
            .next()
            .ok_or_else(|| fail("missing drive segment"))?;
        let mut letters = drive.chars();
        let letter = match (letters.next(), letters.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => letter.to_ascii_lowercase(),
            _ => return Err(fail("first segment is not a drive letter")),
        };
        let tail: Vec<&str> = segments.collect();
        if tail.is_empty() {
            return Err(fail("path has no segment below the drive"));
        }
        Ok(format!("{letter}:\\{}", tail.join("\\")))
    }

    fn shell_command(
        &self,
        cwd: &str,
        argv: &[String],
        force_posix_shell: bool,
    ) -> Result<String, CiError> {
        if force_posix_shell {
            let shell = self
                .posix_shell
                .as_deref()
                .ok_or(CiError::NoPosixShell { platform: "windows" })?;
            let inner = posix_command_line(cwd, argv)?;
            return Ok(windows_command_line([shell, "--login", "-c", inner.as_str()]));
        }

        let native_cwd = self.native_path(cwd)?;
        let drive = &native_cwd[..2];
        let mut parts: Vec<&str> = vec![drive, "&&", "cd", native_cwd.as_str(), "&&"];
        parts.extend(argv.iter().map(String::as_str));
        Ok(windows_command_line(parts))
    }
}

/// `cd -- <cwd> && <argv...>` with every word quoted for a POSIX shell.
pub fn posix_command_line(cwd: &str, argv: &[String]) -> Result<String, CiError> {
    let mut line = format!("cd -- {} &&", posix_quote(cwd)?);
    for arg in argv {
        line.push(' ');
        line.push_str(&posix_quote(arg)?);
    }
    Ok(line)
}

fn posix_quote(arg: &str) -> Result<Cow<'_, str>, CiError> {
    shlex::try_quote(arg).map_err(|_| CiError::Unquotable {
        arg: arg.to_string(),
    })
}

/// Joins arguments into a single Windows command line, quoting them the way
/// the MS C runtime splits them back apart.
pub fn windows_command_line<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for arg in args {
        let arg = arg.as_ref();
        if !line.is_empty() {
            line.push(' ');
        }
        let needs_quotes = arg.is_empty() || arg.contains([' ', '\t']);
        if needs_quotes {
            line.push('"');
        }
        let mut backslashes = 0usize;
        for c in arg.chars() {
            match c {
                '\\' => backslashes += 1,
                '"' => {
                    line.push_str(&"\\".repeat(backslashes * 2 + 1));
                    line.push('"');
                    backslashes = 0;
                }
                _ => {
                    line.push_str(&"\\".repeat(backslashes));
                    backslashes = 0;
                    line.push(c);
                }
            }
        }
        if needs_quotes {
            // Backslashes before the closing quote are doubled.
            line.push_str(&"\\".repeat(backslashes * 2));
            line.push('"');
        } else {
            line.push_str(&"\\".repeat(backslashes));
        }
    }
    line
}
