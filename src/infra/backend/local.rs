//! Local execution: commands run as child processes of the controller and
//! "transfers" are plain file copies.
//!
//! The build context is the CI directory itself, so the reports are copied
//! out of the container into a temporary directory elsewhere and never end up
//! in the context of a later `docker build`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use crate::core::models::TestConfig;
use crate::infra::backend::{BackendProvider, ExecutionBackend};
use crate::infra::command::{self, CommandOutcome, RunOptions};
use crate::infra::fs::{copy_dir_contents, recreate_dir, same_location};

#[derive(Debug)]
pub struct LocalBackend {
    /// Build context directory (the CI directory holding the Dockerfile).
    workspace: PathBuf,
    /// Receives the extracted reports; removed with the workspace.
    scratch: Option<TempDir>,
}

impl LocalBackend {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            scratch: None,
        }
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if same_location(from, to) {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

impl ExecutionBackend for LocalBackend {
    fn label(&self) -> String {
        "localhost".to_string()
    }

    async fn prepare_workspace(&mut self) -> Result<String> {
        fs::create_dir_all(&self.workspace).with_context(|| {
            format!("Failed to create directory: {}", self.workspace.display())
        })?;
        Ok(self.workspace.to_string_lossy().into_owned())
    }

    async fn cleanup_workspace(&mut self, _workdir: &str) -> Result<()> {
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().display().to_string();
            scratch
                .close()
                .with_context(|| format!("Failed to remove directory: {path}"))?;
        }
        Ok(())
    }

    async fn scratch_dir(&mut self, _workdir: &str) -> Result<String> {
        let scratch = match self.scratch.take() {
            Some(scratch) => scratch,
            None => tempfile::Builder::new()
                .prefix("ci-matrix-results-")
                .tempdir()
                .context("Failed to create a directory for the extracted reports")?,
        };
        let path = scratch.path().to_string_lossy().into_owned();
        debug!(%path, "report scratch directory");
        self.scratch = Some(scratch);
        Ok(path)
    }

    async fn run_command(
        &mut self,
        argv: &[String],
        cwd: &str,
        options: RunOptions,
    ) -> Result<CommandOutcome> {
        let outcome = command::run_local(argv, Path::new(cwd), options.echo).await?;
        if options.check {
            Ok(outcome.check(&command::display_command(argv))?)
        } else {
            Ok(outcome)
        }
    }

    async fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        copy_file(local, Path::new(remote))
    }

    async fn download_file(&mut self, remote: &str, local: &Path) -> Result<()> {
        copy_file(Path::new(remote), local)
    }

    async fn make_fresh_dir(&mut self, remote: &str) -> Result<()> {
        recreate_dir(Path::new(remote))
    }

    async fn push_dir(&mut self, local: &Path, remote: &str) -> Result<()> {
        let remote = Path::new(remote);
        if same_location(local, remote) {
            return Ok(());
        }
        recreate_dir(remote)?;
        copy_dir_contents(local, remote)
    }

    async fn pull_dir(&mut self, remote: &str, local: &Path) -> Result<()> {
        copy_dir_contents(Path::new(remote), local)
    }

    async fn read_to_string(&mut self, remote: &str) -> Result<String> {
        fs::read_to_string(remote).with_context(|| format!("Failed to read {remote}"))
    }
}

/// Runs every cell on the controller, with the CI directory as build context.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    workspace: PathBuf,
}

impl LocalProvider {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

impl BackendProvider for LocalProvider {
    type Backend = LocalBackend;

    fn open(&mut self, _config: &TestConfig) -> Result<LocalBackend> {
        Ok(LocalBackend::new(self.workspace.clone()))
    }
}
