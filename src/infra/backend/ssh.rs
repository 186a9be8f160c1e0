//! Remote execution over OpenSSH.
//!
//! A run opens one multiplexed master connection (`ssh -M -S <socket>`); every
//! command and every `scp` transfer of that run reuses it, and the master is
//! closed when the run ends. Directory trees travel as gzip'd tarballs.
//!
//! 通过 OpenSSH 远程执行。每次运行建立一个多路复用的主连接；该运行中的所有命令和
//! `scp` 传输都复用它，运行结束时关闭主连接。目录树以 gzip 压缩的 tar 包传输。

use anyhow::{Context, Result};
use colored::*;
use rand::Rng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::core::config::{HostEntry, MatrixConfig};
use crate::core::error::CiError;
use crate::core::models::{ExecutionTarget, TestConfig};
use crate::core::platform::{self, TargetPlatform};
use crate::infra::backend::{BackendProvider, ExecutionBackend, join_remote};
use crate::infra::command::{self, CommandOutcome, RunOptions, display_command};
use crate::infra::t;

#[derive(Debug)]
pub struct SshBackend {
    target: ExecutionTarget,
    platform: Box<dyn TargetPlatform>,
    temp_dir: String,
    workspace_prefix: String,
    keep_workspace: bool,
    /// Holds the control socket while the session is open.
    session: Option<TempDir>,
}

impl SshBackend {
    pub fn new(host: &HostEntry, workspace_prefix: &str, keep_workspace: bool) -> Self {
        Self {
            target: host.target(),
            platform: platform::for_host(host),
            temp_dir: host.temp_dir.clone(),
            workspace_prefix: workspace_prefix.to_string(),
            keep_workspace,
            session: None,
        }
    }

    pub fn target(&self) -> &ExecutionTarget {
        &self.target
    }

    /// Control socket of the multiplexed master, while a session is open.
    pub fn control_path(&self) -> Option<PathBuf> {
        self.session.as_ref().map(|dir| dir.path().join("control"))
    }

    /// Options shared by `ssh` and `scp`.
    fn common_options(&self) -> Vec<String> {
        let mut options = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(control_path) = self.control_path() {
            options.push("-o".to_string());
            options.push(format!("ControlPath={}", control_path.display()));
        }
        if let Some(user) = &self.target.user {
            options.push("-o".to_string());
            options.push(format!("User={user}"));
        }
        options
    }

    /// `ssh <options> -p <port> <extra> <host>`; the remote command follows.
    pub fn ssh_argv(&self, extra: &[&str]) -> Vec<String> {
        let mut argv = vec!["ssh".to_string()];
        argv.extend(self.common_options());
        argv.push("-p".to_string());
        argv.push(self.target.port.to_string());
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        argv.push(self.target.hostname.clone());
        argv
    }

    /// The full local argv that runs `argv` inside `cwd` on the host.
    pub fn remote_argv(&self, argv: &[String], cwd: &str, posix_shell: bool) -> Result<Vec<String>> {
        let line = self.platform.shell_command(cwd, argv, posix_shell)?;
        debug!(host = %self.target.hostport(), platform = self.platform.name(), %line, "remote command");
        let mut ssh_argv = self.ssh_argv(&["-T"]);
        ssh_argv.push(line);
        Ok(ssh_argv)
    }

    /// `host:<native path>` as `scp` expects it.
    pub fn scp_remote(&self, remote: &str) -> Result<String> {
        let native = self.platform.native_path(remote)?;
        Ok(format!("{}:{}", self.target.hostname, native))
    }

    pub fn scp_argv(&self, from: String, to: String) -> Vec<String> {
        let mut argv = vec!["scp".to_string()];
        argv.extend(self.common_options());
        argv.extend(["-q".to_string(), "-P".to_string(), self.target.port.to_string()]);
        argv.push(from);
        argv.push(to);
        argv
    }

    /// A fresh working directory below the host's temp dir.
    pub fn workspace_path(&self, suffix: u32) -> String {
        join_remote(
            &self.temp_dir,
            &format!("{}-{}", self.workspace_prefix, suffix),
        )
    }

    async fn scp(&self, from: String, to: String) -> Result<()> {
        let argv = self.scp_argv(from, to);
        let outcome = command::run_local(&argv, &std::env::temp_dir(), false).await?;
        outcome.check(&display_command(&argv))?;
        Ok(())
    }

    /// Runs a quiet helper command (`rm`, `mkdir`, `tar`) through the POSIX shell.
    async fn run_posix(&mut self, argv: &[&str], cwd: &str, check: bool) -> Result<CommandOutcome> {
        let argv: Vec<String> = argv.iter().map(|arg| arg.to_string()).collect();
        let mut options = RunOptions::checked().quiet().posix_shell();
        if !check {
            options = options.unchecked();
        }
        let cwd = cwd.to_string();
        self.run_command(&argv, &cwd, options).await
    }

    fn close_master(&self) -> Option<Vec<String>> {
        self.session.as_ref()?;
        let argv = self.ssh_argv(&["-O", "exit"]);
        Some(argv)
    }
}

impl ExecutionBackend for SshBackend {
    fn label(&self) -> String {
        self.target.hostport()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        println!(
            "{}",
            t!("remote.connecting", host = self.target.hostport()).blue()
        );
        let control_dir = tempfile::Builder::new()
            .prefix("ci-matrix-ssh-")
            .tempdir()
            .context("Failed to create a directory for the SSH control socket")?;
        self.session = Some(control_dir);

        // The backgrounded master inherits stdio, so it must not hold our pipes.
        let argv = self.ssh_argv(&["-M", "-N", "-f"]);
        debug!(command = %display_command(&argv), "opening ssh master");
        let status = tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to run `{}`", display_command(&argv)))?;
        if !status.success() {
            self.session = None;
            return Err(CiError::CommandFailed {
                command: display_command(&argv),
                status: status.to_string(),
                output: String::new(),
            })
            .with_context(|| {
                t!("remote.connect_failed", host = self.target.hostport()).to_string()
            });
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(argv) = self.close_master() else {
            return Ok(());
        };
        let outcome = command::run_local(&argv, &std::env::temp_dir(), false).await;
        self.session = None;
        outcome?.check(&display_command(&argv))?;
        Ok(())
    }

    async fn prepare_workspace(&mut self) -> Result<String> {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        let workdir = self.workspace_path(suffix);
        println!(
            "{}",
            t!("remote.creating_workdir", path = &workdir).blue()
        );
        self.make_fresh_dir(&workdir).await?;
        Ok(workdir)
    }

    async fn cleanup_workspace(&mut self, workdir: &str) -> Result<()> {
        if self.keep_workspace {
            println!("{}", t!("remote.keeping_workdir", path = workdir).yellow());
            return Ok(());
        }
        let temp_dir = self.temp_dir.clone();
        match self.run_posix(&["rm", "-rf", workdir], &temp_dir, false).await {
            Ok(outcome) if outcome.success() => {}
            Ok(outcome) => {
                warn!(workdir, output = %outcome.output, "could not remove remote working directory");
            }
            Err(e) => {
                warn!(workdir, error = %format!("{e:#}"), "could not remove remote working directory");
            }
        }
        Ok(())
    }

    async fn run_command(
        &mut self,
        argv: &[String],
        cwd: &str,
        options: RunOptions,
    ) -> Result<CommandOutcome> {
        let ssh_argv = self.remote_argv(argv, cwd, options.posix_shell)?;
        let outcome = command::run_local(&ssh_argv, &std::env::temp_dir(), options.echo).await?;
        if options.check {
            Ok(outcome.check(&display_command(argv))?)
        } else {
            Ok(outcome)
        }
    }

    fn command_path(&self, path: &str) -> Result<String> {
        Ok(self.platform.native_path(path)?)
    }

    async fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        let to = self.scp_remote(remote)?;
        self.scp(local.to_string_lossy().into_owned(), to).await
    }

    async fn download_file(&mut self, remote: &str, local: &Path) -> Result<()> {
        let from = self.scp_remote(remote)?;
        self.scp(from, local.to_string_lossy().into_owned()).await
    }

    async fn make_fresh_dir(&mut self, remote: &str) -> Result<()> {
        let temp_dir = self.temp_dir.clone();
        self.run_posix(&["rm", "-rf", remote], &temp_dir, true).await?;
        self.run_posix(&["mkdir", "-p", remote], &temp_dir, true).await?;
        Ok(())
    }

    async fn push_dir(&mut self, local: &Path, remote: &str) -> Result<()> {
        let archive = tempfile::Builder::new()
            .prefix("ci-matrix-")
            .suffix(".tgz")
            .tempfile()
            .context("Failed to create a temporary archive")?
            .into_temp_path();
        let archive_arg = archive.to_string_lossy().into_owned();
        let local_arg = local.to_string_lossy().into_owned();

        let pack = pack_local_argv(&archive_arg, &local_arg);
        command::run_local(&pack, local, false)
            .await?
            .check(&display_command(&pack))?;

        let remote_archive = format!("{}.tgz", remote.trim_end_matches('/'));
        self.upload_file(&archive, &remote_archive).await?;
        self.make_fresh_dir(remote).await?;
        let unpack = unpack_remote_argv(&remote_archive);
        let unpack: Vec<&str> = unpack.iter().map(String::as_str).collect();
        self.run_posix(&unpack, remote, true).await?;
        let temp_dir = self.temp_dir.clone();
        self.run_posix(&["rm", "-f", remote_archive.as_str()], &temp_dir, false)
            .await?;
        Ok(())
    }

    async fn pull_dir(&mut self, remote: &str, local: &Path) -> Result<()> {
        let (parent, name) = split_remote_dir(remote)?;
        let archive_name = format!("{name}.tgz");

        let pack = pack_remote_argv(&archive_name, name);
        self.run_command(&pack, parent, RunOptions::checked().quiet())
            .await?;

        let archive = tempfile::Builder::new()
            .prefix("ci-matrix-")
            .suffix(".tgz")
            .tempfile()
            .context("Failed to create a temporary archive")?
            .into_temp_path();
        self.download_file(&join_remote(parent, &archive_name), &archive)
            .await?;

        std::fs::create_dir_all(local)
            .with_context(|| format!("Failed to create directory: {}", local.display()))?;
        let archive_arg = archive.to_string_lossy().into_owned();
        let unpack = unpack_local_argv(&archive_arg);
        command::run_local(&unpack, local, false)
            .await?
            .check(&display_command(&unpack))?;
        Ok(())
    }
}

/// Packs the contents of the local directory `dir` into `archive`.
pub fn pack_local_argv(archive: &str, dir: &str) -> Vec<String> {
    strings(&["tar", "-c", "-z", "-f", archive, "-C", dir, "."])
}

/// Unpacks an uploaded archive into the current (remote) directory.
pub fn unpack_remote_argv(archive: &str) -> Vec<String> {
    strings(&["tar", "-x", "-z", "-f", archive])
}

/// Packs the remote directory `name`, run from its parent.
pub fn pack_remote_argv(archive: &str, name: &str) -> Vec<String> {
    strings(&["tar", "-c", "-z", "-f", archive, name])
}

/// Unpacks a downloaded archive, dropping its top-level directory.
pub fn unpack_local_argv(archive: &str) -> Vec<String> {
    strings(&["tar", "-x", "-z", "--strip-components=1", "-f", archive])
}

/// Splits `/a/b/name` into `("/a/b", "name")`.
pub fn split_remote_dir(remote: &str) -> Result<(&str, &str)> {
    let remote = remote.trim_end_matches('/');
    remote
        .rsplit_once('/')
        .filter(|(parent, name)| !parent.is_empty() && !name.is_empty())
        .with_context(|| format!("Cannot download `{remote}`: not a directory below a parent"))
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

impl Drop for SshBackend {
    fn drop(&mut self) {
        // A run that bailed out before `disconnect` would otherwise leak the master.
        if let Some(argv) = self.close_master() {
            let _ = std::process::Command::new(&argv[0])
                .args(&argv[1..])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }
}

/// Maps every cell to the host of its OS.
#[derive(Debug, Clone)]
pub struct SshProvider {
    hosts: BTreeMap<String, HostEntry>,
    workspace_prefix: String,
    keep_workspace: bool,
}

impl SshProvider {
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            workspace_prefix: format!("{}-test", config.install_dir_name),
            keep_workspace: config.keep_remote_dir,
        }
    }
}

impl BackendProvider for SshProvider {
    type Backend = SshBackend;

    fn open(&mut self, config: &TestConfig) -> Result<SshBackend> {
        let os = config.os.as_deref().unwrap_or("local");
        let host = self.hosts.get(os).ok_or_else(|| CiError::UnknownHost {
            os: os.to_string(),
        })?;
        Ok(SshBackend::new(
            host,
            &self.workspace_prefix,
            self.keep_workspace,
        ))
    }
}
