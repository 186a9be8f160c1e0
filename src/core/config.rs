//! # Configuration Module / 配置模块
//!
//! The matrix configuration is loaded from a TOML file (`CiMatrix.toml` by
//! default). Every field has a default, so a file only needs the keys it
//! changes. Relative paths are resolved against the directory that holds the
//! configuration file.
//!
//! 矩阵配置从 TOML 文件（默认为 `CiMatrix.toml`）加载。每个字段都有默认值，
//! 因此文件只需包含需要修改的键。相对路径基于配置文件所在目录解析。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::CiError;
use crate::core::models::ExecutionTarget;
use crate::infra::t;

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "CiMatrix.toml";

/// The permissible values of every matrix axis.
/// 每个矩阵维度的可选值。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxisCatalog {
    /// Isabelle release lines / Isabelle 发行版本
    pub isabelle: Vec<String>,
    /// Java major versions / Java 主版本号
    pub java: Vec<u32>,
    /// Operating systems with a remote host / 拥有远程主机的操作系统
    pub os: Vec<String>,
}

impl Default for AxisCatalog {
    fn default() -> Self {
        Self {
            isabelle: [
                "2025-2", "2025-1", "2025", "2024", "2023", "2022", "2021-1", "2021", "2020",
                "2019",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            java: vec![11, 17, 21, 25],
            os: vec!["linux".to_string(), "windows".to_string()],
        }
    }
}

/// Shell and path conventions of a remote host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    Posix,
    Windows,
}

/// One entry of the OS → host table.
/// OS → 主机映射表中的一项。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostEntry {
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub platform: PlatformKind,
    /// POSIX-style path of the directory that receives per-run working directories.
    /// 用于存放每次运行工作目录的 POSIX 风格路径。
    pub temp_dir: String,
    /// Native path of a POSIX shell on a Windows host (e.g. MSYS2 bash).
    /// Windows 主机上 POSIX shell 的原生路径（例如 MSYS2 bash）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posix_shell: Option<String>,
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

impl HostEntry {
    pub fn target(&self) -> ExecutionTarget {
        ExecutionTarget {
            hostname: self.hostname.clone(),
            port: self.port,
            user: self.user.clone(),
        }
    }
}

/// The whole configuration file.
/// 完整的配置文件。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Language for console messages (e.g., "en", "zh-CN").
    /// 控制台消息的语言（例如 "en"、"zh-CN"）。
    pub language: Option<String>,
    /// Root of the source tree that is mirrored into the build context.
    pub source_dir: PathBuf,
    /// Directory holding the Dockerfile; also the local build context.
    pub ci_dir: PathBuf,
    /// Root directory of the per-cell result directories and the index page.
    pub results_dir: PathBuf,
    /// Name of the staging directory inside the build context.
    pub staging_dir_name: String,
    /// Paths relative to `source_dir` that are not mirrored.
    pub exclude: Vec<String>,
    /// Installation directory of the project inside the image (`/home/user/<name>`).
    pub install_dir_name: String,
    /// Reserved name of the disposable container.
    pub container_name: String,
    /// Literal title in the generated `index.html` that gets replaced.
    pub placeholder_title: String,
    /// Base image to pin as `<image>-cached` before building, if any.
    pub base_image: Option<String>,
    /// Command used to display a report; the report path is appended.
    pub viewer: Option<String>,
    /// Keep the remote working directory after a remote run.
    pub keep_remote_dir: bool,
    pub axes: AxisCatalog,
    pub hosts: BTreeMap<String, HostEntry>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        let mut hosts = BTreeMap::new();
        hosts.insert(
            "linux".to_string(),
            HostEntry {
                hostname: default_hostname(),
                port: default_port(),
                user: None,
                platform: PlatformKind::Posix,
                temp_dir: "/tmp".to_string(),
                posix_shell: None,
            },
        );
        hosts.insert(
            "windows".to_string(),
            HostEntry {
                hostname: default_hostname(),
                port: 2222,
                user: Some("ci".to_string()),
                platform: PlatformKind::Windows,
                temp_dir: "/c/Windows/Temp".to_string(),
                posix_shell: Some(r"c:\tools\msys64\usr\bin\bash".to_string()),
            },
        );

        Self {
            language: None,
            source_dir: PathBuf::from(".."),
            ci_dir: PathBuf::from("."),
            results_dir: PathBuf::from("../target/test-results"),
            staging_dir_name: "all-files".to_string(),
            exclude: [
                ".git",
                ".idea",
                ".run",
                "ci",
                "target",
                "project/target",
                "project/project/target",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            install_dir_name: "scala-isabelle".to_string(),
            container_name: "temp_container".to_string(),
            placeholder_title: "ScalaTest Results".to_string(),
            base_image: Some("archlinux:latest".to_string()),
            viewer: Some("firefox".to_string()),
            keep_remote_dir: false,
            axes: AxisCatalog::default(),
            hosts,
        }
    }
}

impl MatrixConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse the matrix configuration")
    }

    /// Loads the configuration file and returns it together with the directory
    /// relative paths are resolved against.
    ///
    /// 加载配置文件，并返回配置以及用于解析相对路径的目录。
    pub fn load(path: &Path) -> Result<(Self, PathBuf)> {
        let config_path = fs::canonicalize(path)
            .with_context(|| t!("config.read_failed", path = path.display()).to_string())?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| t!("config.read_failed", path = config_path.display()).to_string())?;
        let config = Self::from_toml(&content)
            .with_context(|| t!("config.parse_failed", path = config_path.display()).to_string())?;
        let base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok((config, base_dir))
    }

    /// Looks up the host entry of an OS.
    pub fn host_for(&self, os: &str) -> Result<&HostEntry, CiError> {
        self.hosts.get(os).ok_or_else(|| CiError::UnknownHost {
            os: os.to_string(),
        })
    }

    /// Resolves every path against `base_dir` and freezes the per-run settings.
    pub fn settings(&self, base_dir: &Path, show_results: bool) -> Result<RunSettings> {
        let source_dir = resolve_path(base_dir, &self.source_dir)?;
        let ci_dir = resolve_path(base_dir, &self.ci_dir)?;
        let results_root = resolve_path(base_dir, &self.results_dir)?;
        Ok(RunSettings {
            staging_dir: ci_dir.join(&self.staging_dir_name),
            dockerfile: ci_dir.join("Dockerfile"),
            source_dir,
            ci_dir,
            results_root,
            exclude: self.exclude.clone(),
            install_dir_name: self.install_dir_name.clone(),
            container_name: self.container_name.clone(),
            placeholder_title: self.placeholder_title.clone(),
            base_image: self.base_image.clone(),
            viewer: self.viewer.clone(),
            keep_remote_dir: self.keep_remote_dir,
            show_results,
        })
    }
}

/// Expands `~` and environment variables, then joins relative paths onto `base_dir`.
fn resolve_path(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    let expanded = PathBuf::from(expanded.as_ref());
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    };
    Ok(normalize(&joined))
}

/// Removes `.` and `..` components lexically, without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Everything a driver invocation needs besides the cell itself. Passed
/// explicitly into every run instead of living in globals.
///
/// 驱动调用除单元本身外所需的全部设置。显式传入每次运行，而不是存放在全局变量中。
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub source_dir: PathBuf,
    pub ci_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub dockerfile: PathBuf,
    pub results_root: PathBuf,
    pub exclude: Vec<String>,
    pub install_dir_name: String,
    pub container_name: String,
    pub placeholder_title: String,
    pub base_image: Option<String>,
    pub viewer: Option<String>,
    pub keep_remote_dir: bool,
    pub show_results: bool,
}

impl RunSettings {
    /// Name of the staging directory inside a backend working directory.
    pub fn staging_dir_name(&self) -> String {
        self.staging_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "all-files".to_string())
    }

    /// The configured exclusions plus the CI directory itself when it lies
    /// below the source tree, whatever it is called.
    pub fn staging_exclusions(&self) -> Vec<String> {
        let mut exclude = self.exclude.clone();
        let ci_relative = self
            .ci_dir
            .strip_prefix(&self.source_dir)
            .ok()
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(|relative| {
                relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            });
        if let Some(relative) = ci_relative {
            if !exclude.contains(&relative) {
                exclude.push(relative);
            }
        }
        exclude
    }

    /// In-container path of one of the report directories.
    pub fn container_artifact(&self, artifact: &str) -> String {
        format!(
            "{}:/home/user/{}/target/{}",
            self.container_name, self.install_dir_name, artifact
        )
    }
}
