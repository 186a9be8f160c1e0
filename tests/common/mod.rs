// Shared test helpers for integration tests
#![allow(dead_code)]

use anyhow::Result;
use ci_matrix::core::config::{AxisCatalog, MatrixConfig, RunSettings};
use ci_matrix::core::error::CiError;
use ci_matrix::core::models::TestConfig;
use ci_matrix::infra::backend::{BackendProvider, ExecutionBackend, LocalBackend};
use ci_matrix::infra::command::{CommandOutcome, RunOptions, display_command};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use tempfile::{TempDir, tempdir};

pub const PLACEHOLDER: &str = "ScalaTest Results";

/// A project checkout with a `ci/` directory:
///
/// ```text
/// project/
///   build.sbt, src/Main.scala, .git/HEAD, target/stale.class,
///   project/target/cache.bin, ci/Dockerfile
/// ```
pub struct TestProject {
    pub dir: TempDir,
    pub root: PathBuf,
    pub ci_dir: PathBuf,
}

pub fn setup_project() -> TestProject {
    let dir = tempdir().expect("Failed to create temporary directory");
    let root = dir.path().join("project");
    let ci_dir = root.join("ci");

    for sub in ["src", ".git", "target", "project/target", "ci"] {
        fs::create_dir_all(root.join(sub)).expect("Failed to create project directory");
    }
    fs::write(root.join("build.sbt"), "name := \"demo\"\n").unwrap();
    fs::write(root.join("src/Main.scala"), "object Main\n").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/master\n").unwrap();
    fs::write(root.join("target/stale.class"), "stale").unwrap();
    fs::write(root.join("project/build.properties"), "sbt.version=1.10.0\n").unwrap();
    fs::write(root.join("project/target/cache.bin"), "cache").unwrap();
    fs::write(
        ci_dir.join("Dockerfile"),
        "FROM archlinux:latest-cached\nARG ISABELLE_VERSION\nARG JAVA_VERSION\n",
    )
    .unwrap();

    TestProject { dir, root, ci_dir }
}

impl TestProject {
    /// Settings of the default configuration file placed in `ci/`.
    pub fn settings(&self) -> RunSettings {
        let config = MatrixConfig {
            viewer: None,
            ..MatrixConfig::default()
        };
        config
            .settings(&self.ci_dir, false)
            .expect("Failed to resolve settings")
    }

    pub fn results_root(&self) -> PathBuf {
        self.root.join("target/test-results")
    }
}

pub fn catalog(isabelle: &[&str], java: &[u32]) -> AxisCatalog {
    AxisCatalog {
        isabelle: isabelle.iter().map(|v| v.to_string()).collect(),
        java: java.to_vec(),
        os: vec!["linux".to_string()],
    }
}

pub fn config(isabelle: &str, java: u32) -> TestConfig {
    TestConfig {
        isabelle: isabelle.to_string(),
        java,
        os: None,
    }
}

#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

/// Behaviour shared by every backend a [`FakeProvider`] opens.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Return code written into the report, by Isabelle version (default 0).
    pub return_codes: HashMap<String, i32>,
    /// Commands starting with this prefix exit with 1, for the given Isabelle version.
    pub failing: Option<(String, String)>,
    /// Leave the placeholder out of the generated report.
    pub no_placeholder: bool,
}

/// Pretends to be a docker host: file operations go to the local file
/// system, `docker` commands are logged and simulated.
pub struct FakeBackend {
    inner: LocalBackend,
    config: TestConfig,
    script: Script,
    log: Arc<Mutex<Vec<String>>>,
    scratches: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeBackend {
    fn simulate(&self, argv: &[String], cwd: &Path) -> std::io::Result<i32> {
        let line = argv.join(" ");
        if let Some((isabelle, prefix)) = &self.script.failing {
            if *isabelle == self.config.isabelle && line.starts_with(prefix.as_str()) {
                return Ok(1);
            }
        }
        let words: Vec<&str> = argv.iter().map(String::as_str).collect();
        match words.as_slice() {
            ["docker", "image", "inspect", ..] => Ok(1),
            ["docker", "build", ..] => Ok(0),
            ["docker", "cp", source, dest] => {
                self.materialize(source, &cwd.join(dest))?;
                Ok(0)
            }
            _ => Ok(0),
        }
    }

    fn materialize(&self, source: &str, dest: &Path) -> std::io::Result<()> {
        if source.ends_with("test-reports-html") {
            let html = dest.join("test-reports-html");
            fs::create_dir_all(&html)?;
            let title = if self.script.no_placeholder {
                "Results"
            } else {
                PLACEHOLDER
            };
            fs::write(
                html.join("index.html"),
                format!("<html><head><title>{title}</title></head><body><h1>{title}</h1></body></html>\n"),
            )?;
            let code = self
                .script
                .return_codes
                .get(&self.config.isabelle)
                .copied()
                .unwrap_or(0);
            fs::write(html.join("return-code.txt"), format!("{code}\n"))?;
        } else {
            let xml = dest.join("test-reports");
            fs::create_dir_all(&xml)?;
            fs::write(xml.join("TEST-Demo.xml"), "<testsuite/>\n")?;
        }
        Ok(())
    }
}

impl ExecutionBackend for FakeBackend {
    fn label(&self) -> String {
        "fake".to_string()
    }

    async fn prepare_workspace(&mut self) -> Result<String> {
        self.inner.prepare_workspace().await
    }

    async fn cleanup_workspace(&mut self, workdir: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("cleanup {workdir}"));
        self.inner.cleanup_workspace(workdir).await
    }

    async fn scratch_dir(&mut self, workdir: &str) -> Result<String> {
        let scratch = self.inner.scratch_dir(workdir).await?;
        self.scratches.lock().unwrap().push(PathBuf::from(&scratch));
        Ok(scratch)
    }

    async fn run_command(
        &mut self,
        argv: &[String],
        cwd: &str,
        options: RunOptions,
    ) -> Result<CommandOutcome> {
        self.log.lock().unwrap().push(argv.join(" "));
        if argv.get(1).map(String::as_str) == Some("build") {
            fs::write(Path::new(cwd).join(".image"), format!("sha256:{}\n", self.config.dirname()))?;
        }
        let code = self.simulate(argv, Path::new(cwd))?;
        let outcome = CommandOutcome {
            status: exit_status(code),
            output: format!("simulated exit {code}\n"),
        };
        if options.check {
            Ok(outcome.check(&display_command(argv))?)
        } else {
            Ok(outcome)
        }
    }

    async fn upload_file(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.inner.upload_file(local, remote).await
    }

    async fn download_file(&mut self, remote: &str, local: &Path) -> Result<()> {
        self.inner.download_file(remote, local).await
    }

    async fn make_fresh_dir(&mut self, remote: &str) -> Result<()> {
        self.inner.make_fresh_dir(remote).await
    }

    async fn push_dir(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.inner.push_dir(local, remote).await
    }

    async fn pull_dir(&mut self, remote: &str, local: &Path) -> Result<()> {
        self.inner.pull_dir(remote, local).await
    }
}

pub struct FakeProvider {
    pub workspace: PathBuf,
    pub script: Script,
    pub log: Arc<Mutex<Vec<String>>>,
    /// Every scratch directory handed out, in order.
    pub scratches: Arc<Mutex<Vec<PathBuf>>>,
    pub opened: Vec<TestConfig>,
}

impl FakeProvider {
    pub fn new(workspace: &Path) -> Self {
        Self::with_script(workspace, Script::default())
    }

    pub fn with_script(workspace: &Path, script: Script) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            script,
            log: Arc::new(Mutex::new(Vec::new())),
            scratches: Arc::new(Mutex::new(Vec::new())),
            opened: Vec::new(),
        }
    }

    /// The logged `docker` commands.
    pub fn commands(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.starts_with("docker "))
            .cloned()
            .collect()
    }

    /// Every logged line, workspace cleanups included.
    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        self.scratches.lock().unwrap().clone()
    }
}

impl BackendProvider for FakeProvider {
    type Backend = FakeBackend;

    fn open(&mut self, config: &TestConfig) -> Result<FakeBackend> {
        if config.os.as_deref() == Some("plan9") {
            return Err(CiError::UnknownHost {
                os: "plan9".to_string(),
            }
            .into());
        }
        self.opened.push(config.clone());
        Ok(FakeBackend {
            inner: LocalBackend::new(self.workspace.clone()),
            config: config.clone(),
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            scratches: Arc::clone(&self.scratches),
        })
    }
}

/// Creates `<root>/<name>/test-reports-html/index.html`.
pub fn create_report(results_root: &Path, name: &str) -> PathBuf {
    let html = results_root.join(name).join("test-reports-html");
    fs::create_dir_all(&html).unwrap();
    let index = html.join("index.html");
    fs::write(&index, "<html></html>").unwrap();
    index
}
