//! # Execution Backends / 执行后端
//!
//! An [`ExecutionBackend`] runs commands and moves files on the machine that
//! builds the image. The driver only talks to this trait, so the same run
//! sequence works on the controller itself ([`local::LocalBackend`]) and on a
//! host reached over SSH ([`ssh::SshBackend`]).
//!
//! Backend paths are plain strings: native paths for the local backend,
//! POSIX-style paths for remote hosts (translated by the host's
//! [`TargetPlatform`](crate::core::platform::TargetPlatform) where needed).
//!
//! [`ExecutionBackend`] 在构建镜像的机器上运行命令并传输文件。驱动只依赖此 trait，
//! 因此同一运行流程既可用于控制端本机，也可用于通过 SSH 访问的主机。

pub mod local;
pub mod ssh;

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::models::TestConfig;
use crate::infra::command::{CommandOutcome, RunOptions};

pub use local::{LocalBackend, LocalProvider};
pub use ssh::{SshBackend, SshProvider};

/// Default name of the directory that receives the reports copied out of the
/// container, inside the working directory.
pub const RESULTS_SCRATCH_DIR: &str = "results";

/// Joins a child name onto a backend path.
pub fn join_remote(base: &str, name: &str) -> String {
    if base.ends_with('/') || base.ends_with('\\') {
        format!("{base}{name}")
    } else if base.contains('\\') && !base.contains('/') {
        format!("{base}\\{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[allow(async_fn_in_trait)]
pub trait ExecutionBackend {
    /// Where commands run, for messages.
    fn label(&self) -> String;

    /// Opens the session. Called once per run before any other operation.
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Closes the session. Best effort; called once at the end of every run.
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns the working directory of this run, creating it if needed.
    async fn prepare_workspace(&mut self) -> Result<String>;

    /// Removes what [`prepare_workspace`](Self::prepare_workspace) created.
    async fn cleanup_workspace(&mut self, _workdir: &str) -> Result<()> {
        Ok(())
    }

    /// Returns the directory the reports are copied into before they are
    /// pulled. It must not lie inside a build context that is sent again later.
    async fn scratch_dir(&mut self, workdir: &str) -> Result<String> {
        Ok(join_remote(workdir, RESULTS_SCRATCH_DIR))
    }

    /// Spells a backend path the way it must appear as a command argument.
    fn command_path(&self, path: &str) -> Result<String> {
        Ok(path.to_string())
    }

    /// Runs `argv` inside `cwd`.
    ///
    /// With `options.check` a nonzero exit is an error carrying the captured
    /// output; without it the outcome is returned as is.
    async fn run_command(
        &mut self,
        argv: &[String],
        cwd: &str,
        options: RunOptions,
    ) -> Result<CommandOutcome>;

    /// Copies a local file to the backend.
    async fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Copies a backend file to the local machine.
    async fn download_file(&mut self, remote: &str, local: &Path) -> Result<()>;

    /// Removes `remote` if it exists and creates it again, empty.
    async fn make_fresh_dir(&mut self, remote: &str) -> Result<()>;

    /// Makes the contents of the local directory `local` available under
    /// `remote`, replacing whatever was there.
    async fn push_dir(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Copies the contents of the backend directory `remote` into `local`.
    async fn pull_dir(&mut self, remote: &str, local: &Path) -> Result<()>;

    /// Reads a backend file as UTF-8.
    async fn read_to_string(&mut self, remote: &str) -> Result<String> {
        let scratch = tempfile::NamedTempFile::new().context("Failed to create a temporary file")?;
        self.download_file(remote, scratch.path()).await?;
        fs::read_to_string(scratch.path())
            .with_context(|| format!("Failed to read {remote} downloaded from {}", self.label()))
    }
}

/// Opens a fresh backend for every matrix cell.
pub trait BackendProvider {
    type Backend: ExecutionBackend;

    /// Creates the (not yet connected) backend a cell runs on. Fails with a
    /// configuration error if the cell cannot be mapped to a backend.
    fn open(&mut self, config: &TestConfig) -> Result<Self::Backend>;
}
